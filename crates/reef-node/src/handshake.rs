//! Connection handshake.
//!
//! Flow:
//! 1. Wait for `BeginHandshake` (everything else is discarded)
//! 2. Send `HandshakeResponse` with protocol version and label
//! 3. Wait for `IdentityAssigned` (everything else is discarded), store the identity
//!
//! No retries happen here; a failed handshake ends the session.

use std::fmt;

use crate::bridge::protocol::{InboundMessage, OutboundMessage};
use crate::bridge::session::Session;
use crate::bridge::transport::Transport;
use crate::error::{EngineError, ProtocolViolation};
use crate::version::PROTOCOL_VERSION;

/// Identifier the coordinator assigned to this node for the connection's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerIdentity(String);

impl WorkerIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub async fn perform<T: Transport>(
    session: &mut Session<T>,
    label: &str,
) -> Result<WorkerIdentity, EngineError> {
    loop {
        match session.recv().await? {
            InboundMessage::BeginHandshake => {
                tracing::debug!("Received handshake initializer");
                break;
            }
            other => {
                tracing::debug!(kind = other.kind(), "Discarding message before handshake");
            }
        }
    }

    session
        .send(&OutboundMessage::HandshakeResponse {
            protocol_version: PROTOCOL_VERSION,
            label: label.to_string(),
        })
        .await?;

    let identity = loop {
        match session.recv().await? {
            InboundMessage::IdentityAssigned { identity } => break identity,
            other => {
                tracing::debug!(
                    kind = other.kind(),
                    "Discarding message while awaiting identity"
                );
            }
        }
    };

    if identity.is_empty() {
        return Err(ProtocolViolation::MissingIdentity.into());
    }

    tracing::info!(identity = %identity, "Handshake complete");
    Ok(WorkerIdentity(identity))
}
