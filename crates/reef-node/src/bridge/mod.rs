//! Coordinator bridge for reef-node.
//!
//! This module provides the wire protocol, codec and transports used between a
//! worker node and the coordinator.
//!
//! # Architecture
//!
//! - **protocol**: Message types (InboundMessage, OutboundMessage, ContentType)
//! - **codec**: Frame <-> message conversion (MessageCodec, JsonCodec)
//! - **transport**: Ordered frame channels (WebSocket, length-delimited stream, in-memory)
//! - **session**: Transport + codec, the typed channel the engine drives

pub mod codec;
pub mod protocol;
pub mod session;
pub mod transport;
