use bookqa_core::chunker::chunks_from_parts;
use bookqa_text::LexicalIndex;

fn corpus() -> LexicalIndex {
    let chunks = chunks_from_parts(vec![
        "the cat sat on the mat".into(),
        "dogs are loyal companions".into(),
        "cats and dogs are common pets".into(),
    ]);
    LexicalIndex::build(&chunks).expect("build")
}

fn q(tokens: &[&str]) -> Vec<String> {
    tokens.iter().map(|s| s.to_string()).collect()
}

#[test]
fn shorter_matching_chunk_scores_higher() {
    let index = corpus();
    let scores = index.score(&q(&["cat"])).expect("score");
    assert_eq!(scores.len(), 3);
    assert!(scores[0] > scores[2], "{scores:?}");
    assert!(scores[2] > 0.0);
    assert_eq!(scores[1], 0.0);
}

#[test]
fn stemming_matches_plural_forms() {
    let index = corpus();
    let scores = index.score(&q(&["Dog"])).expect("score");
    assert!(scores[1] > 0.0 && scores[2] > 0.0);
    assert_eq!(scores[0], 0.0);
}

#[test]
fn repeated_tokens_add_weight() {
    let index = corpus();
    let once = index.score(&q(&["cat", "dog"])).expect("score");
    let twice = index.score(&q(&["cat", "cat", "dog"])).expect("score");
    assert!(twice[0] > once[0]);
    assert!((twice[1] - once[1]).abs() < 1e-6);
}

#[test]
fn scoring_is_deterministic() {
    let index = corpus();
    let a = index.score(&q(&["pets", "loyal"])).expect("score");
    let b = corpus().score(&q(&["pets", "loyal"])).expect("score");
    assert_eq!(a, b);
}

#[test]
fn stop_words_and_empty_inputs_score_zero() {
    let index = corpus();
    assert_eq!(index.score(&q(&["the", "and"])).expect("score"), vec![0.0; 3]);
    assert_eq!(index.score(&[]).expect("score"), vec![0.0; 3]);

    let empty = LexicalIndex::build(&[]).expect("build");
    assert!(empty.score(&q(&["cat"])).expect("score").is_empty());
}
