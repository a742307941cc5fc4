pub mod chunker;
pub mod config;
pub mod error;
pub mod extract;
pub mod nlp;
pub mod traits;
pub mod types;

pub use error::{Error, ProviderError, ProviderErrorKind, Result};
