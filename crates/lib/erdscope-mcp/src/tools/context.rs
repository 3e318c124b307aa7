use rmcp::{
    ErrorData,
    model::{CallToolResult, Content},
    schemars,
    tool,
    tool_router,
};
use serde::{Deserialize, Serialize};

use crate::ErdMcp;

/// Payload listing the MCP commands.
#[derive(Debug, Clone, Serialize, Deserialize, schemars::JsonSchema)]
pub struct HelpCommands {
    pub commands: Vec<String>,
}

impl Default for HelpCommands {
    fn default() -> Self {
        Self {
            commands: vec![
                "help - List the MCP commands of this server.".to_string(),
                "connect - Open a postgres, mysql, or sqlite connection from a URL.".to_string(),
                "disconnect - Close the current connection.".to_string(),
                "connection_status - Report whether a connection is open or busy.".to_string(),
                "explore_schema - List tables with columns, foreign keys, and indexes."
                    .to_string(),
                "generate_erd - Render an ERD as svg, png, or txt, or write puml/mmd source."
                    .to_string(),
                "analyze_relationships - Show one table's incoming and outgoing foreign keys."
                    .to_string(),
                "formats_help - Describe the output formats and renderer configuration."
                    .to_string(),
                "health - Returns ok.".to_string(),
            ],
        }
    }
}

#[tool_router(router = tool_router_context, vis = "pub")]
impl ErdMcp {
    #[tool(description = "List the MCP commands of this server.")]
    async fn help(&self) -> Result<CallToolResult, ErrorData> {
        Ok(CallToolResult::success(vec![Content::json(HelpCommands::default())?]))
    }

    #[tool(description = "Describe the ERD output formats and how rendering is configured.")]
    async fn formats_help(&self) -> Result<CallToolResult, ErrorData> {
        Ok(CallToolResult::success(vec![Content::text(
r"
1.  `generate_erd` accepts these `output_format` values:
    - svg, png, txt: PlantUML source is sent to the renderer and the result is written.
    - puml (alias plantuml): PlantUML source is written without contacting the renderer.
    - mmd (alias mermaid): Mermaid `erDiagram` source is written without contacting the renderer.
2.  Artifacts are written to `<output dir>/<schema_name>.<format>`; the result's
    `artifact_reference` is the full path. Re-running overwrites the previous artifact.
3.  The renderer is either a PlantUML server (`ERDSCOPE_RENDER_URL`, default
    https://www.plantuml.com/plantuml) or a local command (`ERDSCOPE_RENDER_COMMAND`, run with
    `-pipe -t<format>`). Renderer failures are reported, never retried.
4.  Foreign keys pointing outside the schema are drawn as dotted edges to a placeholder
    labelled `<schema>.<table> (out of scope)`.
"
        )]))
    }
}
