use rmcp::{
    ErrorData,
    handler::server::wrapper::Parameters,
    model::CallToolResult,
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};

use crate::ErdMcp;
use crate::helpers;

/// Parameters for exploring a schema.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ExploreSchemaParams {
    /// Schema (postgres), database (mysql), or attached database (sqlite). Empty for the default.
    #[serde(default)]
    pub schema_name: String,
}

/// Parameters for generating an ERD.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct GenerateErdParams {
    #[serde(default)]
    pub schema_name: String,
    /// One of `svg`, `png`, `txt`, `puml`, `mmd`.
    pub output_format: String,
}

/// Parameters for analyzing one table's relationships.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct AnalyzeRelationshipsParams {
    #[serde(default)]
    pub schema_name: String,
    pub table_name: String,
}

#[tool_router(router = tool_router_schema, vis = "pub")]
impl ErdMcp {
    #[tool(description = "List the tables of a schema with their columns, foreign keys, and indexes.")]
    async fn explore_schema(
        &self,
        Parameters(params): Parameters<ExploreSchemaParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self.control().explore_schema(&params.schema_name).await;
        helpers::respond("explore_schema", result)
    }

    #[tool(description = "Generate an entity-relationship diagram of a schema (svg, png, txt, puml, or mmd) and return where it was written.")]
    async fn generate_erd(
        &self,
        Parameters(params): Parameters<GenerateErdParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .control()
            .generate_erd(&params.schema_name, &params.output_format)
            .await;
        helpers::respond("generate_erd", result)
    }

    #[tool(description = "Show the incoming, outgoing, and out-of-scope foreign keys of one table.")]
    async fn analyze_relationships(
        &self,
        Parameters(params): Parameters<AnalyzeRelationshipsParams>,
    ) -> Result<CallToolResult, ErrorData> {
        let result = self
            .control()
            .analyze_relationships(&params.schema_name, &params.table_name)
            .await;
        helpers::respond("analyze_relationships", result)
    }
}
