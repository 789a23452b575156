pub mod api;
pub mod config;
pub mod matcher;
pub mod provider;

// Re-export vision types for convenience
pub use facegate_vision::{decode, face, pipeline, Embedding, Pipeline, Representation};
pub use provider::EmbeddingProvider;
