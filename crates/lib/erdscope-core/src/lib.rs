//! Core engine for erdscope.
//!
//! Owns the process-wide store connection, introspects relational catalogs
//! through [`adapter::MetadataAdapter`], assembles a deterministic
//! [`graph::SchemaGraph`], compiles it into PlantUML or Mermaid, and hands the
//! result to a renderer. [`control::ErdControlPlane`] sequences the pieces for
//! the MCP layer.

pub mod adapter;
pub mod connection;
pub mod control;
pub mod diagram;
pub mod graph;
pub mod render;
