use erdscope_core::control::ControlError;
use rmcp::ErrorData;
use rmcp::model::{CallToolResult, Content};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Body of a failed tool call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolErrorPayload {
    pub error: String,
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

impl From<&ControlError> for ToolErrorPayload {
    fn from(err: &ControlError) -> Self {
        Self {
            error: err.to_string(),
            kind: err.kind().to_string(),
            identifier: err.identifier(),
        }
    }
}

pub(crate) fn json_result<T: Serialize>(value: T) -> Result<CallToolResult, ErrorData> {
    Ok(CallToolResult::success(vec![Content::json(value)?]))
}

/// Domain failures are tool results with `is_error` set, not protocol errors.
pub(crate) fn error_result(tool: &str, err: &ControlError) -> Result<CallToolResult, ErrorData> {
    let payload = ToolErrorPayload::from(err);
    warn!(tool, kind = %payload.kind, error = %payload.error, "tool failed");
    Ok(CallToolResult::error(vec![Content::json(payload)?]))
}

pub(crate) fn respond<T: Serialize>(
    tool: &str,
    result: Result<T, ControlError>,
) -> Result<CallToolResult, ErrorData> {
    match result {
        Ok(value) => json_result(value),
        Err(err) => error_result(tool, &err),
    }
}
