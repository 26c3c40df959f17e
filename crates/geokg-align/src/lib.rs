//! GeoKG Align - Entity alignment onto controlled vocabularies
//!
//! Snaps fuzzy entity names produced by a language model onto the canonical
//! names of an authority's lexicon using embedding cosine similarity.

pub mod alignment;
pub mod embedding;

pub use alignment::{
    align, align_graph, default_artifact_dir, AlignmentHandler, AlignmentMatch, AlignmentReport,
    DEFAULT_THRESHOLD,
};
pub use embedding::{
    create_embedding_client, EmbeddingClient, HashingEmbedding, OllamaEmbedding, OpenAiEmbedding,
};
