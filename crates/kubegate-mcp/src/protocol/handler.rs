//! Main request dispatcher: receives raw messages, routes them, and
//! drives the one-shot post-handshake hook.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::SettingsSource;
use crate::tools::{echo, CallContext, SharedRegistry};
use crate::types::*;

use super::negotiation::{Session, SessionState};
use super::validator::parse_request;

type InitFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type InitHook = Box<dyn FnOnce(InitContext) -> InitFuture + Send>;

/// Handed to the post-handshake hook.
#[derive(Clone)]
pub struct InitContext {
    /// Long-lived token, cancelled only at server shutdown.
    pub shutdown: CancellationToken,
    /// The live registry; tools registered here replace same-named ones.
    pub registry: SharedRegistry,
}

/// A message to send back, and whether writing it completes the handshake.
#[derive(Debug)]
pub struct Reply {
    pub message: Value,
    pub completes_handshake: bool,
}

impl Reply {
    fn new(message: Value) -> Self {
        Self {
            message,
            completes_handshake: false,
        }
    }

    fn error(id: RequestId, error: &McpError) -> Self {
        Self::new(to_message(error.to_json_rpc_error(id)))
    }
}

/// The protocol handler that dispatches incoming JSON-RPC messages.
pub struct ProtocolHandler {
    registry: SharedRegistry,
    settings: Arc<SettingsSource>,
    session: Mutex<Session>,
    init_hook: Mutex<Option<InitHook>>,
}

impl ProtocolHandler {
    /// Create a handler over `registry`. The built-in `echo` tool is
    /// installed here, so tools registered afterwards may replace it.
    pub fn new(registry: SharedRegistry, settings: Arc<SettingsSource>) -> Self {
        registry.register(echo::tool());
        Self {
            registry,
            settings,
            session: Mutex::new(Session::default()),
            init_hook: Mutex::new(None),
        }
    }

    /// Register the hook that runs once, in the background, after the first
    /// successful `initialize` response has been written.
    pub fn on_initialized<F, Fut>(self, hook: F) -> Self
    where
        F: FnOnce(InitContext) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        *self.init_hook.lock() = Some(Box::new(move |ctx: InitContext| -> InitFuture {
            Box::pin(hook(ctx))
        }));
        self
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn state(&self) -> SessionState {
        self.session.lock().state
    }

    /// Handle one raw message. Returns `None` for notifications.
    pub async fn handle_message(&self, raw: &[u8], shutdown: &CancellationToken) -> Option<Reply> {
        let request = match parse_request(raw) {
            Ok(request) => request,
            Err(rejection) => {
                tracing::warn!("Rejected message: {}", rejection.error);
                return Some(Reply::error(rejection.id, &rejection.error));
            }
        };

        let Some(id) = request.id.clone() else {
            self.handle_notification(&request);
            return None;
        };

        tracing::debug!("Dispatching {} (id {id})", request.method);
        let result = self.dispatch_request(request.method.as_str(), request.params, shutdown).await;

        Some(match result {
            Ok(value) => Reply {
                message: to_message(JsonRpcResponse::new(id, value)),
                completes_handshake: request.method == "initialize",
            },
            Err(e) => {
                tracing::debug!("{} failed: {e}", request.method);
                Reply::error(id, &e)
            }
        })
    }

    /// Called once the reply to a successful `initialize` has been flushed.
    /// Fires the post-handshake hook on its own task, at most once.
    pub fn complete_handshake(&self, shutdown: &CancellationToken) {
        self.session.lock().mark_ready();

        let Some(hook) = self.init_hook.lock().take() else {
            return;
        };
        tracing::info!("Running deferred initialization");
        let ctx = InitContext {
            shutdown: shutdown.clone(),
            registry: self.registry.clone(),
        };
        tokio::spawn(hook(ctx));
    }

    async fn dispatch_request(
        &self,
        method: &str,
        params: Option<Value>,
        shutdown: &CancellationToken,
    ) -> McpResult<Value> {
        match method {
            "initialize" => self.handle_initialize(params),
            "tools/list" => self.handle_tools_list(),
            "tools/call" => self.handle_tools_call(params, shutdown).await,
            _ => Err(McpError::MethodNotFound(method.to_string())),
        }
    }

    fn handle_notification(&self, notification: &JsonRpcRequest) {
        match notification.method.as_str() {
            "notifications/initialized" | "initialized" => {
                tracing::info!("Client reported initialized");
            }
            other => tracing::debug!("Ignoring notification: {other}"),
        }
    }

    fn handle_initialize(&self, params: Option<Value>) -> McpResult<Value> {
        let init_params: InitializeParams = match params {
            None | Some(Value::Null) => InitializeParams::default(),
            Some(value) => serde_json::from_value(value)
                .map_err(|e| McpError::InvalidParams(e.to_string()))?,
        };

        let result = self.session.lock().negotiate(init_params);
        serialize_result(result)
    }

    fn handle_tools_list(&self) -> McpResult<Value> {
        serialize_result(ToolListResult {
            tools: self.registry.list(),
        })
    }

    async fn handle_tools_call(
        &self,
        params: Option<Value>,
        shutdown: &CancellationToken,
    ) -> McpResult<Value> {
        let call_params: ToolCallParams = params
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| McpError::InvalidParams(e.to_string()))?
            .ok_or_else(|| McpError::InvalidParams("Tool call params required".to_string()))?;

        let timeout = self.settings.current().call_timeout;
        let ctx = CallContext::new(shutdown.clone(), timeout);
        let (name, arguments) = call_params.into_parts();

        let started = Instant::now();
        let result = self.registry.call(&ctx, &name, arguments).await;
        tracing::info!(
            "Tool {} finished in {}ms (error: {})",
            name,
            started.elapsed().as_millis(),
            result.is_error
        );

        serialize_result(result)
    }
}

fn serialize_result<T: Serialize>(result: T) -> McpResult<Value> {
    serde_json::to_value(result).map_err(|e| McpError::ServerError(e.to_string()))
}

fn to_message<T: Serialize>(envelope: T) -> Value {
    serde_json::to_value(envelope).unwrap_or_else(|e| {
        serde_json::json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": null,
            "error": { "code": error_codes::SERVER_ERROR, "message": e.to_string() },
        })
    })
}
