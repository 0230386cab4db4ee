//! Typed message session: a [`Transport`] paired with a [`MessageCodec`].

use super::codec::{JsonCodec, MessageCodec};
use super::protocol::{InboundMessage, OutboundMessage};
use super::transport::Transport;
use crate::error::EngineError;

pub struct Session<T> {
    transport: T,
    codec: Box<dyn MessageCodec>,
}

impl<T: Transport> Session<T> {
    pub fn new(transport: T) -> Self {
        Self::with_codec(transport, Box::new(JsonCodec))
    }

    pub fn with_codec(transport: T, codec: Box<dyn MessageCodec>) -> Self {
        Self { transport, codec }
    }

    pub(crate) fn set_codec(&mut self, codec: Box<dyn MessageCodec>) {
        self.codec = codec;
    }

    /// Wait for the next inbound message.
    pub async fn recv(&mut self) -> Result<InboundMessage, EngineError> {
        let frame = self.transport.recv().await?;
        let message = self.codec.decode(&frame)?;
        tracing::trace!(kind = message.kind(), "Received message");
        Ok(message)
    }

    /// Take the next queued inbound message without waiting.
    pub fn try_recv(&mut self) -> Result<Option<InboundMessage>, EngineError> {
        match self.transport.try_recv()? {
            Some(frame) => {
                let message = self.codec.decode(&frame)?;
                tracing::trace!(kind = message.kind(), "Received message");
                Ok(Some(message))
            }
            None => Ok(None),
        }
    }

    pub async fn send(&mut self, message: &OutboundMessage) -> Result<(), EngineError> {
        let frame = self.codec.encode(message)?;
        tracing::trace!(kind = message.kind(), "Sending message");
        self.transport.send(frame).await?;
        Ok(())
    }

    pub async fn close(&mut self) {
        self.transport.close().await;
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}
