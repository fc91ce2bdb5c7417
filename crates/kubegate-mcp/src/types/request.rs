//! MCP request parameter types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Parameters of `tools/call`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

impl ToolCallParams {
    /// Split into the tool name and its arguments, defaulting to `{}`.
    pub fn into_parts(self) -> (String, Value) {
        let arguments = match self.arguments {
            Some(Value::Null) | None => Value::Object(Map::new()),
            Some(args) => args,
        };
        (self.name, arguments)
    }
}
