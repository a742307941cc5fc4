use tracing::info;

use bookqa_core::error::Result;
use bookqa_core::traits::AnswerGenerator;
use bookqa_core::types::CorpusMetadata;

use crate::ranker::{HybridRanker, RankedChunk};

const MAX_ENTITIES: usize = 15;

/// Prompt context: numbered chunks with their fused scores, then the
/// corpus-wide dates, key phrases and named entities.
pub fn build_context(results: &[RankedChunk], metadata: &CorpusMetadata) -> String {
    let mut context = results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("Chunk {} (score: {:.2}): {}", i + 1, r.scores.fused, r.chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n");
    context.push_str(&format!("\n\nDates mentioned: {}", metadata.dates.join(", ")));
    context.push_str(&format!("\n\nKey phrases: {}", metadata.key_phrases.join(", ")));
    let entities: Vec<&str> = metadata.entities.iter().take(MAX_ENTITIES).map(String::as_str).collect();
    context.push_str(&format!("\n\nNamed entities: {}", entities.join(", ")));
    context
}

pub async fn answer(ranker: &HybridRanker, generator: &dyn AnswerGenerator, question: &str, top_k: usize) -> Result<String> {
    let results = ranker.search(question, top_k).await?;
    let context = build_context(&results, ranker.corpus().metadata());
    info!(question, chunks = results.len(), context_len = context.len(), "generating answer");
    generator.generate(question, &context).await
}
