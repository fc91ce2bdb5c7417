//! JSON-RPC envelope parsing and validation.

use serde_json::Value;

use crate::types::{JsonRpcRequest, McpError, RequestId, JSONRPC_VERSION};

/// An envelope that could not be dispatched, with the id to answer under.
#[derive(Debug)]
pub struct Rejection {
    pub id: RequestId,
    pub error: McpError,
}

impl Rejection {
    fn new(id: RequestId, error: McpError) -> Self {
        Self { id, error }
    }
}

/// Parse raw bytes into a request, validating the version and method.
///
/// Malformed JSON is answered with a null id; every later check echoes the
/// request's id when it has one.
pub fn parse_request(raw: &[u8]) -> Result<JsonRpcRequest, Rejection> {
    let value: Value = serde_json::from_slice(raw)
        .map_err(|e| Rejection::new(RequestId::Null, McpError::ParseError(e.to_string())))?;

    let Value::Object(mut envelope) = value else {
        return Err(Rejection::new(
            RequestId::Null,
            McpError::InvalidRequest("Message must be a JSON object".to_string()),
        ));
    };

    let id = match envelope.remove("id") {
        None => None,
        Some(raw_id) => Some(serde_json::from_value::<RequestId>(raw_id).map_err(|_| {
            Rejection::new(
                RequestId::Null,
                McpError::InvalidRequest("id must be a string, number or null".to_string()),
            )
        })?),
    };
    let reply_id = id.clone().unwrap_or(RequestId::Null);

    match envelope.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        other => {
            return Err(Rejection::new(
                reply_id,
                McpError::InvalidRequest(format!(
                    "Expected jsonrpc version \"{JSONRPC_VERSION}\", got {}",
                    other.map_or_else(|| "nothing".to_string(), |v| format!("\"{v}\""))
                )),
            ))
        }
    }

    let method = match envelope.remove("method") {
        Some(Value::String(m)) if !m.is_empty() => m,
        _ => {
            return Err(Rejection::new(
                reply_id,
                McpError::InvalidRequest("Method name must be a non-empty string".to_string()),
            ))
        }
    };

    Ok(JsonRpcRequest {
        jsonrpc: JSONRPC_VERSION.to_string(),
        id,
        method,
        params: envelope.remove("params"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_request_and_notification() {
        let req = parse_request(br#"{"jsonrpc":"2.0","id":7,"method":"tools/list"}"#).unwrap();
        assert_eq!(req.id, Some(RequestId::from(7)));
        assert!(!req.is_notification());

        let note = parse_request(br#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .unwrap();
        assert!(note.is_notification());
    }

    #[test]
    fn string_ids_are_kept() {
        let req = parse_request(br#"{"jsonrpc":"2.0","id":"abc","method":"x"}"#).unwrap();
        assert_eq!(req.id, Some(RequestId::String("abc".into())));
    }

    #[test]
    fn explicit_null_id_is_a_request() {
        let req = parse_request(br#"{"jsonrpc":"2.0","id":null,"method":"tools/list"}"#).unwrap();
        assert_eq!(req.id, Some(RequestId::Null));
        assert!(!req.is_notification());
    }

    #[test]
    fn garbage_is_a_parse_error_without_id() {
        let rej = parse_request(b"{not json").unwrap_err();
        assert_eq!(rej.id, RequestId::Null);
        assert_eq!(rej.error.code(), -32700);
    }

    #[test]
    fn wrong_version_echoes_id() {
        let rej = parse_request(br#"{"jsonrpc":"1.0","id":3,"method":"tools/list"}"#).unwrap_err();
        assert_eq!(rej.id, RequestId::from(3));
        assert_eq!(rej.error.code(), -32600);
    }

    #[test]
    fn missing_method_is_invalid() {
        let rej = parse_request(br#"{"jsonrpc":"2.0","id":"a"}"#).unwrap_err();
        assert_eq!(rej.id, RequestId::String("a".into()));
        assert_eq!(rej.error.code(), -32600);
    }

    #[test]
    fn non_object_is_invalid() {
        let rej = parse_request(b"[1,2]").unwrap_err();
        assert_eq!(rej.error.code(), -32600);
    }
}
