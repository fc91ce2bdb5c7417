//! Tool: echo, the built-in liveness check.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::types::ToolDefinition;

use super::{parse_args, CallContext, FnHandler, Tool};

#[derive(Debug, Default, Deserialize)]
struct EchoParams {
    #[serde(default)]
    text: String,
}

pub fn definition() -> ToolDefinition {
    ToolDefinition {
        name: "echo".to_string(),
        description: Some("Echo back the provided text".to_string()),
        input_schema: Some(json!({
            "type": "object",
            "properties": {
                "text": { "type": "string" }
            },
            "required": ["text"]
        })),
    }
}

pub fn tool() -> Tool {
    Tool::new(
        definition(),
        FnHandler(|_ctx: CallContext, args: Value| async move {
            let params: EchoParams = parse_args(args)?;
            Ok(Value::String(params.text))
        }),
    )
}
