//! Byte-level transports under the command and broadcast channels.
//!
//! The session only needs two capabilities: a strictly alternating
//! request/reply exchange, and a stream of `(topic, payload)` frames. The
//! ZeroMQ implementations connect a REQ socket to the broker and a SUB
//! socket (empty-prefix subscription) to the fan-out proxy.

use crate::error::{ClientError, Result};
use std::future::Future;
use zeromq::{ReqSocket, Socket, SocketRecv, SocketSend, SubSocket, ZmqMessage};

/// Synchronous request/reply transport. One exchange at a time.
pub trait CommandTransport: Send {
    /// Send one request and wait for its reply.
    fn round_trip(&mut self, request: Vec<u8>) -> impl Future<Output = Result<Vec<u8>>> + Send;

    /// Drop any exchange left half-finished and start clean. Called after a
    /// round trip was abandoned, so a late reply cannot be paired with the
    /// next request.
    fn reset(&mut self) -> impl Future<Output = Result<()>> + Send {
        async { Ok(()) }
    }
}

/// Source of broadcast frames for the listener task.
pub trait BroadcastSource: Send + 'static {
    fn next_frame(&mut self) -> impl Future<Output = Result<BroadcastFrame>> + Send;
}

/// A two-part broadcast: subscription topic and encoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastFrame {
    pub topic: Vec<u8>,
    pub payload: Vec<u8>,
}

// ---------------------------------------------------------------------------
// ZeroMQ
// ---------------------------------------------------------------------------

/// REQ socket connected to the broker.
pub struct ZmqCommand {
    endpoint: String,
    socket: ReqSocket,
}

impl ZmqCommand {
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let socket = connect_req(endpoint).await?;
        Ok(Self {
            endpoint: endpoint.to_string(),
            socket,
        })
    }
}

async fn connect_req(endpoint: &str) -> Result<ReqSocket> {
    let mut socket = ReqSocket::new();
    socket
        .connect(endpoint)
        .await
        .map_err(|e| ClientError::transport(format!("connect to broker {endpoint}: {e}")))?;
    tracing::debug!(endpoint, "command socket connected");
    Ok(socket)
}

impl CommandTransport for ZmqCommand {
    async fn round_trip(&mut self, request: Vec<u8>) -> Result<Vec<u8>> {
        self.socket
            .send(ZmqMessage::from(request))
            .await
            .map_err(|e| ClientError::transport(format!("send failed: {e}")))?;
        let reply = self
            .socket
            .recv()
            .await
            .map_err(|e| ClientError::transport(format!("receive failed: {e}")))?;
        reply
            .into_vec()
            .pop()
            .map(|frame| frame.to_vec())
            .ok_or_else(|| ClientError::transport("empty reply"))
    }

    /// A REQ socket that sent without receiving still owes a read, and the
    /// broker's late answer would land on it. Replace the socket outright.
    async fn reset(&mut self) -> Result<()> {
        let fresh = connect_req(&self.endpoint).await?;
        // Old socket is dropped (and closed) here.
        self.socket = fresh;
        Ok(())
    }
}

/// SUB socket connected to the fan-out proxy, subscribed to every topic.
pub struct ZmqSubscriber {
    socket: SubSocket,
}

impl ZmqSubscriber {
    pub async fn connect(endpoint: &str) -> Result<Self> {
        let mut socket = SubSocket::new();
        socket
            .connect(endpoint)
            .await
            .map_err(|e| ClientError::transport(format!("connect to proxy {endpoint}: {e}")))?;
        socket.subscribe("").await?;
        tracing::debug!(endpoint, "broadcast socket subscribed");
        Ok(Self { socket })
    }
}

impl BroadcastSource for ZmqSubscriber {
    async fn next_frame(&mut self) -> Result<BroadcastFrame> {
        let message = self.socket.recv().await?;
        split_frames(message.into_vec().into_iter().map(|f| f.to_vec()).collect())
    }
}

/// First frame is the topic, last frame is the payload.
pub(crate) fn split_frames(mut frames: Vec<Vec<u8>>) -> Result<BroadcastFrame> {
    if frames.len() < 2 {
        return Err(ClientError::transport(format!(
            "expected topic and payload frames, got {}",
            frames.len()
        )));
    }
    let payload = frames.pop().unwrap_or_default();
    let topic = frames.swap_remove(0);
    Ok(BroadcastFrame { topic, payload })
}
