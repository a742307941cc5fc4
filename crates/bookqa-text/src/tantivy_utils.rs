use tantivy::schema::{IndexRecordOption, Schema, TextFieldIndexing, TextOptions, INDEXED, STORED};
use tantivy::tokenizer::{Language, LowerCaser, SimpleTokenizer, Stemmer, StopWordFilter, TextAnalyzer, TokenStream};
use tantivy::Index;

pub const CHUNK_ID_FIELD: &str = "chunk_id";
pub const TEXT_FIELD: &str = "text";
pub const ANALYZER: &str = "bookqa_en";

pub fn build_schema() -> Schema {
	let mut schema_builder = Schema::builder();
	schema_builder.add_u64_field(CHUNK_ID_FIELD, INDEXED | STORED);
	let text_field_indexing = TextFieldIndexing::default().set_tokenizer(ANALYZER).set_index_option(IndexRecordOption::WithFreqs);
	let text_options = TextOptions::default().set_indexing_options(text_field_indexing);
	schema_builder.add_text_field(TEXT_FIELD, text_options);
	schema_builder.build()
}

pub fn build_analyzer() -> TextAnalyzer {
	let stop_words = [
		"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
	];
	TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(stop_words.into_iter().map(|s| s.to_string())))
		.filter(Stemmer::new(Language::English))
		.build()
}

pub fn register_tokenizer(index: &Index) {
	index.tokenizers().register(ANALYZER, build_analyzer());
}

/// Run `text` through the index analyzer and collect the surviving terms.
pub fn analyze(analyzer: &mut TextAnalyzer, text: &str) -> Vec<String> {
	let mut terms = Vec::new();
	let mut stream = analyzer.token_stream(text);
	while stream.advance() {
		terms.push(stream.token().text.clone());
	}
	terms
}
