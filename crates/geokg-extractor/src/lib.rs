//! GeoKG Extractor - Triplet extraction from model output
//!
//! The language-model call itself happens elsewhere; this crate maps the raw
//! response of a given prompt version onto typed relationship triplets.

pub mod parser;
pub mod prompt;

pub use parser::{parse, parse_with_report, DroppedTriplet};
pub use prompt::PromptHandler;
