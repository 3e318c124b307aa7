//! MCP server implementation for erdscope.
//!
//! Wires the ERD control plane into rmcp tool handlers. Every server instance
//! shares one control plane, so all sessions see the same connection.

mod helpers;
mod tools;
pub mod server;

pub use helpers::ToolErrorPayload;
pub use tools::connection::ConnectParams;
pub use tools::context::HelpCommands;
pub use tools::schema::{AnalyzeRelationshipsParams, ExploreSchemaParams, GenerateErdParams};

use erdscope_core::control::ErdControlPlane;
use rmcp::{
    ErrorData,
    ServerHandler,
    handler::server::tool::ToolRouter,
    tool,
    tool_handler,
    tool_router,
};
use rmcp::model::{CallToolResult, Content, ServerCapabilities, ServerInfo};

const SERVER_INSTRUCTIONS: &str = r"erdscope introspects a relational database and generates entity-relationship diagrams.

Workflow:
1. Call `connect` with a `connection_descriptor` URL and a `store_kind`
   (`postgres`, `mysql`, or `sqlite`). One connection is held at a time; connecting again replaces it.
2. Call `explore_schema` with a `schema_name` (empty for the store default: `current_schema()`,
   `DATABASE()`, or `main`) to list tables with their columns, foreign keys, and indexes.
3. Call `generate_erd` with `schema_name` and `output_format`:
   - `svg`, `png`, `txt` are rendered by the configured PlantUML renderer.
   - `puml` and `mmd` write PlantUML or Mermaid source directly.
4. Call `analyze_relationships` with `schema_name` and `table_name` for one table's incoming,
   outgoing, and out-of-scope foreign keys.

Notes:
- Foreign keys whose target lies outside the schema are kept and marked `dangling`.
- `diagnostics` lists tables whose columns, foreign keys, or indexes could not be read.
- Failures return `{error, kind, identifier}` with `is_error` set.
- `connection_status`, `disconnect`, `help`, and `health` are always available.";

/// MCP server wrapper around the ERD control plane and tool routers.
#[derive(Clone)]
pub struct ErdMcp {
    tool_router: ToolRouter<Self>,
    control: ErdControlPlane,
}

impl ErdMcp {
    #[must_use]
    pub fn new(control: ErdControlPlane) -> Self {
        let tool_router = Self::tool_router_core()
            + Self::tool_router_connection()
            + Self::tool_router_schema()
            + Self::tool_router_context();
        Self {
            tool_router,
            control,
        }
    }

    pub(crate) const fn control(&self) -> &ErdControlPlane {
        &self.control
    }
}

#[tool_router(router = tool_router_core, vis = "pub")]
impl ErdMcp {
    #[tool(description = "Health check. Returns 'ok'.")]
    async fn health(&self) -> Result<CallToolResult, ErrorData> {
        Ok(CallToolResult::success(vec![Content::text("ok")]))
    }
}

#[tool_handler]
impl ServerHandler for ErdMcp {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(SERVER_INSTRUCTIONS.to_string()),
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
