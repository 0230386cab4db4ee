//! Message codec for coordinator communication.
//!
//! The engine only talks to the codec through [`MessageCodec`]; the default
//! [`JsonCodec`] serializes each message as one JSON document per frame.

use tokio_util::bytes::Bytes;

use super::protocol::{InboundMessage, OutboundMessage};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("failed to decode inbound frame: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode {kind} message: {source}")]
    Encode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// Turns frames into typed messages and back.
pub trait MessageCodec: Send + Sync {
    fn decode(&self, frame: &[u8]) -> Result<InboundMessage, CodecError>;

    fn encode(&self, message: &OutboundMessage) -> Result<Bytes, CodecError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl MessageCodec for JsonCodec {
    fn decode(&self, frame: &[u8]) -> Result<InboundMessage, CodecError> {
        serde_json::from_slice(frame).map_err(CodecError::Decode)
    }

    fn encode(&self, message: &OutboundMessage) -> Result<Bytes, CodecError> {
        let json = serde_json::to_vec(message).map_err(|source| CodecError::Encode {
            kind: message.kind(),
            source,
        })?;
        let json_len = json.len();
        tracing::trace!(
            kind = message.kind(),
            json_size_bytes = json_len,
            "Encoding frame"
        );
        if json_len > 1_000_000 {
            tracing::info!(
                kind = message.kind(),
                json_size_bytes = json_len,
                json_size_kb = json_len / 1024,
                "Large frame being encoded"
            );
        }
        Ok(Bytes::from(json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::protocol::{JobResult, StartJob};

    #[test]
    fn decodes_start_job() {
        let frame = serde_json::json!({
            "kind": "start_job",
            "job_id": "j1",
            "dataset_ref": "d1",
            "program_image": "AQID",
            "initial_progress": 0.5,
        });
        let decoded = JsonCodec.decode(frame.to_string().as_bytes()).unwrap();

        assert_eq!(
            decoded,
            InboundMessage::StartJob(StartJob {
                job_id: "j1".to_string(),
                dataset_ref: "d1".to_string(),
                program_image: vec![1, 2, 3],
                prior_state: None,
                initial_progress: 0.5,
            })
        );
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = JsonCodec.decode(br#"{"kind":"reboot"}"#).unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn rejects_garbage() {
        assert!(JsonCodec.decode(&[0xB0, 0x00, 0x01]).is_err());
    }

    #[test]
    fn encodes_job_result() {
        let message = OutboundMessage::JobResult(JobResult::failure("j1", "aborted"));
        let bytes = JsonCodec.encode(&message).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(value["kind"], "job_result");
        assert_eq!(value["success"], false);
        assert_eq!(value["content_type"], "plain_text");
    }
}
