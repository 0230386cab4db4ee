//! Wire protocol types for coordinator-node communication.
//!
//! - **Inbound** (coordinator → node): handshake initiation, identity assignment,
//!   job start/abort commands, keepalive pings
//! - **Outbound** (node → coordinator): handshake response, periodic state syncs,
//!   terminal job results

use serde::{Deserialize, Serialize};

/// Content type of a job's result payload.
///
/// The raw numeric tags 0..=3 are what the execution module reports; anything
/// outside that range is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ContentType {
    Int64 = 0,
    RawBytes = 1,
    PlainText = 2,
    JsonText = 3,
}

impl ContentType {
    pub const ALL: [ContentType; 4] = [
        ContentType::Int64,
        ContentType::RawBytes,
        ContentType::PlainText,
        ContentType::JsonText,
    ];

    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for ContentType {
    type Error = u8;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        Self::ALL.get(usize::from(tag)).copied().ok_or(tag)
    }
}

/// Payload of a start command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartJob {
    pub job_id: String,
    pub dataset_ref: String,
    #[serde(with = "base64_bytes")]
    pub program_image: Vec<u8>,
    /// Interpreter snapshot from a previous checkpoint of the same job.
    #[serde(default, skip_serializing_if = "Option::is_none", with = "base64_opt")]
    pub prior_state: Option<Vec<u8>>,
    #[serde(default)]
    pub initial_progress: f32,
}

/// Messages from coordinator to node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InboundMessage {
    /// Keepalive; carries no meaning for the node.
    Ping,

    BeginHandshake,

    IdentityAssigned {
        identity: String,
    },

    StartJob(StartJob),

    AbortJob {
        job_id: String,
    },
}

impl InboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::BeginHandshake => "begin_handshake",
            Self::IdentityAssigned { .. } => "identity_assigned",
            Self::StartJob(_) => "start_job",
            Self::AbortJob { .. } => "abort_job",
        }
    }
}

/// Checkpoint of a running job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateSync {
    pub job_id: String,
    pub progress: f32,
    /// Gzip-compressed interpreter snapshot. Empty on the final checkpoint.
    #[serde(with = "base64_bytes")]
    pub compressed_state: Vec<u8>,
    pub log_lines: Vec<String>,
}

/// Output produced by a finished job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutput {
    pub content_type: ContentType,
    pub bytes: Vec<u8>,
}

/// Terminal outcome of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub job_id: String,
    pub success: bool,
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    pub content_type: ContentType,
}

impl JobResult {
    pub fn success(job_id: impl Into<String>, output: JobOutput) -> Self {
        Self {
            job_id: job_id.into(),
            success: true,
            payload: output.bytes,
            content_type: output.content_type,
        }
    }

    /// Failed result: the error text, UTF-8 encoded, tagged as plain text.
    pub fn failure(job_id: impl Into<String>, error: impl std::fmt::Display) -> Self {
        Self {
            job_id: job_id.into(),
            success: false,
            payload: error.to_string().into_bytes(),
            content_type: ContentType::PlainText,
        }
    }
}

/// Messages from node to coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundMessage {
    HandshakeResponse { protocol_version: u32, label: String },

    StateSync(StateSync),

    JobResult(JobResult),
}

impl OutboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HandshakeResponse { .. } => "handshake_response",
            Self::StateSync(_) => "state_sync",
            Self::JobResult(_) => "job_result",
        }
    }
}

mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(bytes: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&STANDARD.encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

mod base64_opt {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Option<Vec<u8>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match bytes {
            Some(bytes) => serializer.serialize_some(&STANDARD.encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Vec<u8>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer)?
            .map(|encoded| STANDARD.decode(encoded).map_err(serde::de::Error::custom))
            .transpose()
    }
}
