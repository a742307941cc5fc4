//! bookqa-text
//!
//! BM25 lexical scoring over corpus chunks, built on tantivy.
pub mod tantivy_utils;
pub mod lexical;

pub use lexical::LexicalIndex;
