use erdscope_model::{ColumnPair, Relation};
use serde::Serialize;

use super::{ControlError, ErdControlPlane};

/// A relation with both endpoints spelled out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraint: Option<String>,
    pub source: String,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_schema: Option<String>,
    pub columns: Vec<ColumnPair>,
}

impl From<&Relation> for RelationSummary {
    fn from(relation: &Relation) -> Self {
        Self {
            constraint: relation.name.clone(),
            source: relation.source.clone(),
            target: relation.target.clone(),
            target_schema: relation.target_schema.clone(),
            columns: relation.columns.clone(),
        }
    }
}

/// Relations touching one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationshipReport {
    pub schema_name: String,
    pub entity: String,
    /// Foreign keys of this table whose target is in scope.
    pub outgoing: Vec<RelationSummary>,
    /// Foreign keys of other tables that point at this one.
    pub incoming: Vec<RelationSummary>,
    /// Foreign keys of this table whose target is out of scope.
    pub dangling: Vec<RelationSummary>,
}

impl ErdControlPlane {
    /// Reports the relations of `table_name` within `schema_name`.
    ///
    /// # Errors
    /// Returns `ControlError::UnknownEntity` when the table is not part of
    /// the schema, plus the errors of [`ErdControlPlane::explore_schema`].
    pub async fn analyze_relationships(
        &self,
        schema_name: &str,
        table_name: &str,
    ) -> Result<RelationshipReport, ControlError> {
        let graph = self.build_graph(schema_name).await?;
        let table_name = table_name.trim();
        if graph.entity(table_name).is_none() {
            return Err(ControlError::UnknownEntity {
                scope: graph.scope().to_string(),
                entity: table_name.to_string(),
            });
        }

        let (dangling, outgoing): (Vec<&Relation>, Vec<&Relation>) = graph
            .relations_from(table_name)
            .partition(|relation| relation.dangling);
        let incoming = graph.relations_to(table_name).map(RelationSummary::from).collect();

        Ok(RelationshipReport {
            schema_name: graph.scope().to_string(),
            entity: table_name.to_string(),
            outgoing: outgoing.into_iter().map(RelationSummary::from).collect(),
            incoming,
            dangling: dangling.into_iter().map(RelationSummary::from).collect(),
        })
    }
}
