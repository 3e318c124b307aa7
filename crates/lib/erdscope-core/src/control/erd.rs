use erdscope_model::Diagnostic;
use serde::Serialize;
use tracing::info;

use crate::diagram::{DiagramGrammar, compile_with};
use crate::render::{ArtifactRef, OutputFormat, artifact_stem};

use super::{ControlError, ErdControlPlane};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErdReport {
    pub status: String,
    pub artifact_reference: String,
    pub artifact: ArtifactRef,
    pub format: OutputFormat,
    pub grammar: DiagramGrammar,
    pub entity_count: usize,
    pub relation_count: usize,
    pub dangling_count: usize,
    pub complete: bool,
    pub diagnostics: Vec<Diagnostic>,
}

impl ErdControlPlane {
    /// Introspects `schema_name`, compiles the graph, and renders it as
    /// `output_format`.
    ///
    /// The format is checked before any introspection, and the connection
    /// gate is released before the renderer is contacted.
    ///
    /// # Errors
    /// Returns `ControlError::UnsupportedGrammar` for unknown formats,
    /// `ControlError::NotConnected` before a successful connect, and
    /// `ControlError::Build` or `ControlError::Render` when those stages fail.
    pub async fn generate_erd(
        &self,
        schema_name: &str,
        output_format: &str,
    ) -> Result<ErdReport, ControlError> {
        let format: OutputFormat = output_format.parse()?;
        let graph = self.build_graph(schema_name).await?;

        let description = compile_with(&graph, format.grammar());
        let stem = artifact_stem(graph.scope());
        let artifact = self.render.render(&description, format, &stem).await?;

        info!(
            schema = %graph.scope(),
            format = %format,
            location = %artifact.location,
            "erd generated"
        );

        Ok(ErdReport {
            status: "ERD generated successfully.".to_string(),
            artifact_reference: artifact.location.clone(),
            artifact,
            format,
            grammar: description.grammar,
            entity_count: graph.entities().len(),
            relation_count: graph.relations().len(),
            dangling_count: graph.dangling_count(),
            complete: graph.complete(),
            diagnostics: graph.diagnostics().to_vec(),
        })
    }
}
