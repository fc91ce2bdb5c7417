//! Transport layer for MCP communication.

pub mod framing;
pub mod stdio;

pub use framing::{Framing, FramedReader, FramedWriter};
pub use stdio::StdioTransport;
