//! reef-node: worker node protocol engine for the reef job-execution network.
//!
//! A node connects to the coordinator, performs the handshake, then runs at
//! most one job at a time: the job's program is stepped in bounded slices by a
//! host-provided [`ExecutionModule`], with periodic compressed checkpoints so
//! the coordinator can resume it elsewhere.

mod buffer;
mod version;

pub mod bridge;
pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod executor;
pub mod handshake;
pub mod job;
pub mod node;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use bridge::codec::{CodecError, JsonCodec, MessageCodec};
pub use bridge::protocol::{
    ContentType, InboundMessage, JobOutput, JobResult, OutboundMessage, StateSync,
};
pub use bridge::transport::{
    FramedTransport, MemoryPeer, MemoryTransport, Transport, TransportError, WsTransport,
    memory_pair,
};
pub use buffer::LogBuffer;
pub use config::EngineConfig;
pub use dataset::{DatasetError, DatasetStore, HttpDatasetStore, StaticDatasetStore};
pub use engine::Engine;
pub use error::{EngineError, JobFailure, ProtocolViolation};
pub use executor::{
    ExecutionError, ExecutionModule, ExecutorFactory, JobSender, RawOutput, StepOutcome,
};
pub use handshake::WorkerIdentity;
pub use job::JobDescriptor;
pub use node::run_node;
pub use telemetry::init_tracing;
pub use version::{NODE_VERSION, PROTOCOL_VERSION};
