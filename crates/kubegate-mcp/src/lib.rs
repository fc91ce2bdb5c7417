//! kubegate MCP server: guarded cluster operations for LLM agents over
//! stdio JSON-RPC.
//!
//! Messages flow from [`transport`] through the [`protocol`] dispatcher into
//! the [`tools`] registry; mutating tools consult the [`guard`].

pub mod config;
pub mod guard;
pub mod protocol;
pub mod tools;
pub mod transport;
pub mod types;

pub use config::{resolve_fixture_path, Settings, SettingsSource};
pub use guard::Guard;
pub use protocol::ProtocolHandler;
pub use tools::SharedRegistry;
pub use transport::StdioTransport;
