//! Transport sessions to the coordinator.
//!
//! Implementations:
//! - **WsTransport**: one binary WebSocket message per frame (the production path)
//! - **FramedTransport**: 4-byte length-prefixed frames over any byte stream
//! - **MemoryTransport**: in-process channel pair, for embedding and tests
//!
//! Every implementation feeds inbound frames into an ordered queue from a reader
//! task, so the engine can drain them without blocking.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::bytes::Bytes;
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connection closed")]
    Closed,

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// A persistent, ordered, bidirectional frame channel.
#[async_trait]
pub trait Transport: Send {
    /// Wait for the next inbound frame.
    async fn recv(&mut self) -> Result<Bytes, TransportError>;

    /// Take the next queued inbound frame, if one has arrived.
    fn try_recv(&mut self) -> Result<Option<Bytes>, TransportError>;

    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError>;

    /// Close the connection. Subsequent sends fail with [`TransportError::Closed`].
    async fn close(&mut self);
}

struct InboundQueue {
    rx: mpsc::UnboundedReceiver<Bytes>,
}

impl InboundQueue {
    fn new(rx: mpsc::UnboundedReceiver<Bytes>) -> Self {
        Self { rx }
    }

    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        self.rx.recv().await.ok_or(TransportError::Closed)
    }

    fn try_recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        match self.rx.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Closed),
        }
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsTransport {
    sink: SplitSink<WsStream, Message>,
    inbound: InboundQueue,
    reader: JoinHandle<()>,
    closed: bool,
}

impl WsTransport {
    pub async fn connect(url: &Url) -> Result<Self, TransportError> {
        tracing::info!(url = %url, "Connecting to coordinator");
        let (ws_stream, _response) = connect_async(url.as_str()).await?;
        tracing::info!("WebSocket connected");

        let (sink, stream) = ws_stream.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(ws_reader_task(stream, tx));

        Ok(Self {
            sink,
            inbound: InboundQueue::new(rx),
            reader,
            closed: false,
        })
    }
}

async fn ws_reader_task(mut stream: SplitStream<WsStream>, tx: mpsc::UnboundedSender<Bytes>) {
    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Binary(data)) => {
                if data.is_empty() {
                    tracing::debug!("Dropping empty binary frame");
                    continue;
                }
                if tx.send(Bytes::from(data)).is_err() {
                    break;
                }
            }
            Ok(Message::Text(text)) => {
                tracing::warn!(len = text.len(), "Ignoring text frame from coordinator");
            }
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {
                // Ping replies are handled by tungstenite.
            }
            Ok(Message::Close(frame)) => {
                tracing::info!(?frame, "Coordinator closed WebSocket");
                break;
            }
            Err(e) => {
                tracing::error!(error = %e, "WebSocket receive error");
                break;
            }
        }
    }
    tracing::trace!("WebSocket reader exiting");
}

#[async_trait]
impl Transport for WsTransport {
    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        self.inbound.recv().await
    }

    fn try_recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        self.inbound.try_recv()
    }

    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.sink.send(Message::Binary(frame.to_vec())).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.sink.close().await {
            tracing::debug!(error = %e, "WebSocket close handshake failed");
        }
        self.reader.abort();
    }
}

fn length_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .length_field_length(4)
        .new_codec()
}

/// Length-prefixed framing over any byte stream (TCP, pipes, duplex).
pub struct FramedTransport<S> {
    writer: FramedWrite<WriteHalf<S>, LengthDelimitedCodec>,
    inbound: InboundQueue,
    reader: JoinHandle<()>,
    closed: bool,
}

impl<S> FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: S) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(framed_reader_task(
            FramedRead::new(read_half, length_codec()),
            tx,
        ));

        Self {
            writer: FramedWrite::new(write_half, length_codec()),
            inbound: InboundQueue::new(rx),
            reader,
            closed: false,
        }
    }
}

async fn framed_reader_task<S>(
    mut reader: FramedRead<ReadHalf<S>, LengthDelimitedCodec>,
    tx: mpsc::UnboundedSender<Bytes>,
) where
    S: AsyncRead + Send + 'static,
{
    loop {
        match reader.next().await {
            Some(Ok(frame)) => {
                if tx.send(frame.freeze()).is_err() {
                    break;
                }
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "Frame reader error");
                break;
            }
            None => {
                tracing::trace!("Frame stream closed");
                break;
            }
        }
    }
}

#[async_trait]
impl<S> Transport for FramedTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        self.inbound.recv().await
    }

    fn try_recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        self.inbound.try_recv()
    }

    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.writer.send(frame).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = SinkExt::<Bytes>::close(&mut self.writer).await {
            tracing::debug!(error = %e, "Failed to shut down frame writer");
        }
        self.reader.abort();
    }
}

/// In-process transport. The [`MemoryPeer`] plays the coordinator.
pub struct MemoryTransport {
    outbound: Option<mpsc::UnboundedSender<Bytes>>,
    inbound: InboundQueue,
}

/// Coordinator side of a [`memory_pair`].
pub struct MemoryPeer {
    tx: mpsc::UnboundedSender<Bytes>,
    rx: mpsc::UnboundedReceiver<Bytes>,
}

pub fn memory_pair() -> (MemoryTransport, MemoryPeer) {
    let (to_node_tx, to_node_rx) = mpsc::unbounded_channel();
    let (from_node_tx, from_node_rx) = mpsc::unbounded_channel();

    let transport = MemoryTransport {
        outbound: Some(from_node_tx),
        inbound: InboundQueue::new(to_node_rx),
    };
    let peer = MemoryPeer {
        tx: to_node_tx,
        rx: from_node_rx,
    };
    (transport, peer)
}

impl MemoryPeer {
    /// Queue a frame for the node. Returns false if the node side is gone.
    pub fn send(&self, frame: impl Into<Bytes>) -> bool {
        self.tx.send(frame.into()).is_ok()
    }

    /// Wait for the next frame sent by the node; `None` once it closed.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn recv(&mut self) -> Result<Bytes, TransportError> {
        self.inbound.recv().await
    }

    fn try_recv(&mut self) -> Result<Option<Bytes>, TransportError> {
        self.inbound.try_recv()
    }

    async fn send(&mut self, frame: Bytes) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::Closed)?;
        outbound.send(frame).map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self) {
        self.outbound = None;
        self.inbound.rx.close();
    }
}
