use anyhow::Result;
use tantivy::collector::TopDocs;
use tantivy::query::{BooleanQuery, Occur, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Value};
use tantivy::tokenizer::TextAnalyzer;
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::debug;

use bookqa_core::types::Chunk;

use crate::tantivy_utils::{analyze, build_analyzer, build_schema, register_tokenizer, CHUNK_ID_FIELD, TEXT_FIELD};

/// BM25 scorer over one immutable chunk set, backed by an in-RAM tantivy index.
pub struct LexicalIndex {
	reader: IndexReader,
	analyzer: TextAnalyzer,
	chunk_id_field: Field,
	text_field: Field,
	num_chunks: usize,
}

impl LexicalIndex {
	pub fn build(chunks: &[Chunk]) -> Result<Self> {
		let schema = build_schema();
		let index = Index::create_in_ram(schema.clone());
		register_tokenizer(&index);
		let chunk_id_field = schema.get_field(CHUNK_ID_FIELD)?;
		let text_field = schema.get_field(TEXT_FIELD)?;

		let mut index_writer: IndexWriter = index.writer_with_num_threads(1, 50_000_000)?;
		for c in chunks {
			index_writer.add_document(doc!(
				chunk_id_field => c.id as u64,
				text_field => c.text.as_str(),
			))?;
		}
		index_writer.commit()?;

		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		debug!(chunks = chunks.len(), "lexical index built");
		Ok(Self { reader, analyzer: build_analyzer(), chunk_id_field, text_field, num_chunks: chunks.len() })
	}

	pub fn num_chunks(&self) -> usize { self.num_chunks }

	/// BM25 score of every chunk for the disjunction of `tokens`, indexed by
	/// chunk id. Repeated tokens contribute again; non-matching chunks score 0.
	pub fn score(&self, tokens: &[String]) -> Result<Vec<f32>> {
		let mut scores = vec![0.0f32; self.num_chunks];
		if self.num_chunks == 0 { return Ok(scores); }

		let mut analyzer = self.analyzer.clone();
		let clauses: Vec<(Occur, Box<dyn Query>)> = tokens
			.iter()
			.flat_map(|t| analyze(&mut analyzer, t))
			.map(|term| {
				let q = TermQuery::new(Term::from_field_text(self.text_field, &term), IndexRecordOption::WithFreqs);
				(Occur::Should, Box::new(q) as Box<dyn Query>)
			})
			.collect();
		if clauses.is_empty() { return Ok(scores); }

		let searcher = self.reader.searcher();
		let query = BooleanQuery::new(clauses);
		let top_docs = searcher.search(&query, &TopDocs::with_limit(self.num_chunks))?;
		for (score, addr) in top_docs {
			let doc: TantivyDocument = searcher.doc(addr)?;
			let id = doc
				.get_first(self.chunk_id_field)
				.and_then(|v| v.as_u64())
				.ok_or_else(|| anyhow::anyhow!("document without {CHUNK_ID_FIELD}"))?;
			if let Some(slot) = scores.get_mut(id as usize) { *slot = score; }
		}
		Ok(scores)
	}
}
