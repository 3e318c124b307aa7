use erdscope_model::{Attribute, Diagnostic, IndexDescriptor};
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use tracing::info;

use crate::connection::StoreKind;
use crate::graph::SchemaGraph;

use super::{ControlError, ErdControlPlane};

/// One column pair of an outgoing foreign key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
    pub column: String,
    pub referred_table: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referred_schema: Option<String>,
    pub referred_column: String,
    pub dangling: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityReport {
    pub columns: Vec<Attribute>,
    pub foreign_keys: Vec<ForeignKeyReport>,
    pub indexes: Vec<IndexDescriptor>,
}

/// Result of `explore_schema`. Entities serialize as a JSON object keyed by
/// name, in graph order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    pub schema_name: String,
    pub store_kind: StoreKind,
    pub complete: bool,
    #[serde(serialize_with = "entities_as_map")]
    pub entities: Vec<(String, EntityReport)>,
    pub diagnostics: Vec<Diagnostic>,
}

impl SchemaReport {
    #[must_use]
    pub fn from_graph(graph: &SchemaGraph) -> Self {
        let entities = graph
            .entities()
            .iter()
            .map(|entity| {
                let foreign_keys = graph
                    .relations_from(&entity.name)
                    .flat_map(|relation| {
                        relation.columns.iter().map(move |pair| ForeignKeyReport {
                            constraint: relation.name.clone(),
                            column: pair.column.clone(),
                            referred_table: relation.target.clone(),
                            referred_schema: relation.target_schema.clone(),
                            referred_column: pair.referred_column.clone(),
                            dangling: relation.dangling,
                        })
                    })
                    .collect();
                let report = EntityReport {
                    columns: entity.attributes.clone(),
                    foreign_keys,
                    indexes: entity.indexes.clone(),
                };
                (entity.name.clone(), report)
            })
            .collect();

        Self {
            schema_name: graph.scope().to_string(),
            store_kind: graph.store_kind(),
            complete: graph.complete(),
            entities,
            diagnostics: graph.diagnostics().to_vec(),
        }
    }

    #[must_use]
    pub fn entity(&self, name: &str) -> Option<&EntityReport> {
        self.entities
            .iter()
            .find(|(entity, _)| entity == name)
            .map(|(_, report)| report)
    }

    #[must_use]
    pub fn entity_names(&self) -> Vec<&str> {
        self.entities.iter().map(|(name, _)| name.as_str()).collect()
    }
}

fn entities_as_map<S: Serializer>(
    entities: &[(String, EntityReport)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(entities.len()))?;
    for (name, report) in entities {
        map.serialize_entry(name, report)?;
    }
    map.end()
}

impl ErdControlPlane {
    /// Introspects `schema_name` (empty for the store default) and reports
    /// every entity with its columns, foreign keys, and indexes.
    ///
    /// # Errors
    /// Returns `ControlError::NotConnected` before a successful connect and
    /// `ControlError::Build` when enumeration fails or the build is cancelled.
    pub async fn explore_schema(&self, schema_name: &str) -> Result<SchemaReport, ControlError> {
        let graph = self.build_graph(schema_name).await?;
        let report = SchemaReport::from_graph(&graph);
        info!(
            schema = %report.schema_name,
            entities = report.entities.len(),
            diagnostics = report.diagnostics.len(),
            "schema explored"
        );
        Ok(report)
    }
}
