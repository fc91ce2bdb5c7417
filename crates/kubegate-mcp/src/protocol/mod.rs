//! MCP protocol handling: envelope validation, the handshake, and dispatch.

pub mod handler;
pub mod negotiation;
pub mod validator;

pub use handler::{InitContext, ProtocolHandler, Reply};
pub use negotiation::SessionState;
