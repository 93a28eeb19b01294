//! Ontograph exchange format (Turtle).
//!
//! This crate sits at the **interop boundary** of the editor:
//!
//! - [`SerializationEngine::serialize`] turns local graph content into an
//!   [`ExchangeDocument`] (OWL classes, datatype properties, object
//!   properties, notes) that renders to Turtle.
//! - [`SerializationEngine::deserialize`] parses Turtle with **Sophia** and
//!   rebuilds graph content, reporting subjects it cannot represent.
//! - [`AttributeCodec`] is the single table mapping element attributes to
//!   predicates; both directions go through it.
//!
//! Overlay content never crosses this boundary.

pub mod codec;
pub mod document;
pub mod ids;
pub mod parse;
pub mod serialize;
mod turtle;

pub use codec::{ns, AttributeCodec, PredicateMapping, ValueShape};
pub use document::{ExchangeDocument, Literal, Term, Triple};
pub use ids::ExternalIds;
pub use parse::{Deserialized, SerializationSkip};
pub use serialize::SerializationEngine;

#[derive(Debug, thiserror::Error)]
pub enum RdfError {
    #[error("failed to parse Turtle: {0}")]
    Parse(String),

    #[error("unsupported RDF term form: {0}")]
    Term(String),
}
