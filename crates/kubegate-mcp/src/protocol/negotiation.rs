//! Connection state and the `initialize` handshake.

use crate::types::{Implementation, InitializeParams, InitializeResult, MCP_VERSION};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingInitialize,
    Ready,
}

/// What the server knows about the connected client.
#[derive(Debug, Clone)]
pub struct Session {
    pub state: SessionState,
    pub client: Option<Implementation>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            state: SessionState::AwaitingInitialize,
            client: None,
        }
    }
}

impl Session {
    pub fn negotiate(&mut self, params: InitializeParams) -> InitializeResult {
        if let Some(version) = params.protocol_version.as_deref() {
            if version != MCP_VERSION {
                tracing::warn!(
                    "Client requested protocol version {version}, server supports {MCP_VERSION}. Proceeding with server version."
                );
            }
        }

        match &params.client_info {
            Some(client) => tracing::info!("Initialized with client: {} v{}", client.name, client.version),
            None => tracing::info!("Initialized with anonymous client"),
        }
        self.client = params.client_info;

        InitializeResult::default_result()
    }

    /// Returns true on the first transition into `Ready`.
    pub fn mark_ready(&mut self) -> bool {
        let first = self.state == SessionState::AwaitingInitialize;
        self.state = SessionState::Ready;
        if first {
            tracing::info!("MCP handshake complete");
        }
        first
    }
}
