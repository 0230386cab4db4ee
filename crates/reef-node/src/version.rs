//! Version information for reef-node.

/// Crate version from Cargo.toml.
pub const NODE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Wire protocol version announced in the handshake response.
pub const PROTOCOL_VERSION: u32 = 1;
