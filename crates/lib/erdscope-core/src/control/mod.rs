use std::{error::Error, fmt, sync::Arc};

use crate::connection::{
    ConnectAck,
    ConnectionError,
    ConnectionManager,
    ConnectionStatus,
    DisconnectAck,
    NotConnectedError,
};
use crate::diagram::UnsupportedGrammarError;
use crate::graph::{BuildError, BuildOptions, SchemaGraph, SchemaGraphBuilder};
use crate::render::{RenderDispatch, RenderError};

pub mod erd;
pub mod explore;
pub mod relationships;

pub use erd::ErdReport;
pub use explore::{EntityReport, ForeignKeyReport, SchemaReport};
pub use relationships::{RelationSummary, RelationshipReport};

#[derive(Debug)]
pub enum ControlError {
    NotConnected(NotConnectedError),
    Connection(ConnectionError),
    Build(BuildError),
    UnsupportedGrammar(UnsupportedGrammarError),
    Render(RenderError),
    UnknownEntity { scope: String, entity: String },
}

impl ControlError {
    /// Stable machine-readable error kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotConnected(_) => "not_connected",
            Self::Connection(ConnectionError::Busy) => "busy",
            Self::Connection(_) => "connection_failed",
            Self::Build(BuildError::EnumerationFailed { .. }) => "enumeration_failed",
            Self::Build(BuildError::Cancelled { .. }) => "cancelled",
            Self::UnsupportedGrammar(_) => "unsupported_grammar",
            Self::Render(_) => "render_failed",
            Self::UnknownEntity { .. } => "unknown_entity",
        }
    }

    /// The offending identifier, when there is one.
    #[must_use]
    pub fn identifier(&self) -> Option<String> {
        match self {
            Self::NotConnected(_) | Self::Build(BuildError::Cancelled { .. }) => None,
            Self::Connection(err) => match err {
                ConnectionError::UnsupportedStore(kind) => Some(kind.clone()),
                ConnectionError::InvalidDescriptor { store_kind, .. } => {
                    Some(store_kind.to_string())
                }
                ConnectionError::Busy | ConnectionError::Timeout(_) | ConnectionError::Failed(_) => {
                    None
                }
            },
            Self::Build(err) => err
                .scope()
                .filter(|scope| !scope.is_empty())
                .map(str::to_string),
            Self::UnsupportedGrammar(err) => Some(err.requested.clone()),
            Self::Render(err) => Some(err.target()),
            Self::UnknownEntity { entity, .. } => Some(entity.clone()),
        }
    }
}

impl fmt::Display for ControlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConnected(err) => write!(f, "{err}"),
            Self::Connection(err) => write!(f, "{err}"),
            Self::Build(err) => write!(f, "{err}"),
            Self::UnsupportedGrammar(err) => write!(f, "{err}"),
            Self::Render(err) => write!(f, "{err}"),
            Self::UnknownEntity { scope, entity } if scope.is_empty() => {
                write!(f, "table '{entity}' not found")
            }
            Self::UnknownEntity { scope, entity } => {
                write!(f, "table '{entity}' not found in schema '{scope}'")
            }
        }
    }
}

impl Error for ControlError {}

impl From<NotConnectedError> for ControlError {
    fn from(err: NotConnectedError) -> Self {
        Self::NotConnected(err)
    }
}

impl From<ConnectionError> for ControlError {
    fn from(err: ConnectionError) -> Self {
        Self::Connection(err)
    }
}

impl From<BuildError> for ControlError {
    fn from(err: BuildError) -> Self {
        Self::Build(err)
    }
}

impl From<UnsupportedGrammarError> for ControlError {
    fn from(err: UnsupportedGrammarError) -> Self {
        Self::UnsupportedGrammar(err)
    }
}

impl From<RenderError> for ControlError {
    fn from(err: RenderError) -> Self {
        Self::Render(err)
    }
}

/// Sequences connection, introspection, compilation, and rendering.
#[derive(Clone)]
pub struct ErdControlPlane {
    connections: Arc<ConnectionManager>,
    render: Arc<RenderDispatch>,
    build_options: BuildOptions,
}

impl ErdControlPlane {
    pub fn new(connections: Arc<ConnectionManager>, render: Arc<RenderDispatch>) -> Self {
        Self {
            connections,
            render,
            build_options: BuildOptions::default(),
        }
    }

    #[must_use]
    pub fn with_build_options(mut self, build_options: BuildOptions) -> Self {
        self.build_options = build_options;
        self
    }

    pub fn connections(&self) -> &ConnectionManager {
        &self.connections
    }

    pub fn render_dispatch(&self) -> &RenderDispatch {
        &self.render
    }

    /// Opens a connection, replacing the current one.
    ///
    /// # Errors
    /// Returns `ControlError::Connection` when the connection cannot be
    /// established or the manager is busy.
    pub async fn connect(
        &self,
        descriptor: &str,
        store_kind: &str,
    ) -> Result<ConnectAck, ControlError> {
        Ok(self.connections.connect(descriptor, store_kind).await?)
    }

    pub async fn disconnect(&self) -> DisconnectAck {
        self.connections.disconnect().await
    }

    pub fn status(&self) -> ConnectionStatus {
        self.connections.status()
    }

    /// Builds a fresh graph while holding the connection gate. The gate is
    /// released when this returns.
    pub(crate) async fn build_graph(&self, schema_name: &str) -> Result<SchemaGraph, ControlError> {
        let session = self.connections.require_connection().await?;
        let builder = SchemaGraphBuilder::new(self.build_options.clone());
        let graph = builder.build(session.adapter(), schema_name).await?;
        Ok(graph)
    }
}
