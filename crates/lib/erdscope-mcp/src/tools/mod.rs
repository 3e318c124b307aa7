//! MCP tool modules.
//!
//! Tools are grouped by domain: connection lifecycle, schema introspection
//! and diagram generation, and contextual help.

pub mod connection;
pub mod context;
pub mod schema;
