//! Schema graph models and shared constants for erdscope.
//!
//! This crate defines the canonical data model shared by the metadata
//! adapters, the schema graph builder, and the diagram compilers.

pub mod models;
pub mod schema;

pub use models::*;
