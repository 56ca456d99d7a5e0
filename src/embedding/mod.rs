//! Embedding provider abstraction
//!
//! Query-time recall needs exactly one operation: turn the query text into a
//! float vector. The concrete provider is a network service speaking the
//! Ollama embeddings API; it sits behind an object-safe async trait so the
//! engine and the tests never care which implementation they hold.

mod provider;

pub use provider::{EmbeddingError, EmbeddingProvider, OllamaProvider};
