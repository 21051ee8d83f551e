//! In-memory transports for unit tests.

use crate::envelope::Envelope;
use crate::error::{ClientError, Result};
use crate::transport::{BroadcastFrame, BroadcastSource, CommandTransport};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

type Responder = Box<dyn FnMut(Vec<u8>) -> Vec<u8> + Send>;

/// Command transport that answers each request with a closure.
pub struct ScriptedTransport {
    responder: Option<Responder>,
}

impl ScriptedTransport {
    /// Answer decoded requests; every request is also recorded.
    pub fn new(
        mut respond: impl FnMut(&Envelope) -> Envelope + Send + 'static,
    ) -> (Self, Arc<Mutex<Vec<Envelope>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let transport = Self::raw(move |bytes| {
            let request = Envelope::decode(&bytes).unwrap();
            let reply = respond(&request);
            log.lock().unwrap().push(request);
            reply.encode().unwrap()
        });
        (transport, seen)
    }

    /// Answer raw request bytes with raw reply bytes.
    pub fn raw(respond: impl FnMut(Vec<u8>) -> Vec<u8> + Send + 'static) -> Self {
        Self {
            responder: Some(Box::new(respond)),
        }
    }

    /// Never answers.
    pub fn stalled() -> Self {
        Self { responder: None }
    }
}

impl CommandTransport for ScriptedTransport {
    async fn round_trip(&mut self, request: Vec<u8>) -> Result<Vec<u8>> {
        match self.responder.as_mut() {
            Some(respond) => Ok(respond(request)),
            None => std::future::pending().await,
        }
    }
}

/// Behaves like a REQ socket whose peer is slow to answer the first request:
/// each reply is queued when its request is sent and read back in order, so
/// an abandoned exchange leaves its reply for whoever reads next. `reset`
/// discards the backlog.
pub struct BackloggedTransport {
    respond: Box<dyn FnMut(&Envelope) -> Envelope + Send>,
    backlog: VecDeque<Vec<u8>>,
    first_delay: Option<Duration>,
    resets: Arc<AtomicUsize>,
}

impl BackloggedTransport {
    pub fn new(
        first_delay: Duration,
        respond: impl FnMut(&Envelope) -> Envelope + Send + 'static,
    ) -> (Self, Arc<AtomicUsize>) {
        let resets = Arc::new(AtomicUsize::new(0));
        let transport = Self {
            respond: Box::new(respond),
            backlog: VecDeque::new(),
            first_delay: Some(first_delay),
            resets: resets.clone(),
        };
        (transport, resets)
    }
}

impl CommandTransport for BackloggedTransport {
    async fn round_trip(&mut self, request: Vec<u8>) -> Result<Vec<u8>> {
        let request = Envelope::decode(&request)?;
        let reply = (self.respond)(&request).encode()?;
        self.backlog.push_back(reply);
        if let Some(delay) = self.first_delay.take() {
            tokio::time::sleep(delay).await;
        }
        self.backlog
            .pop_front()
            .ok_or_else(|| ClientError::transport("nothing to read"))
    }

    async fn reset(&mut self) -> Result<()> {
        self.backlog.clear();
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Broadcast source fed from a channel. Parks forever once the sender is gone.
pub struct ChannelSource {
    rx: mpsc::UnboundedReceiver<Result<BroadcastFrame>>,
}

impl ChannelSource {
    pub fn new() -> (mpsc::UnboundedSender<Result<BroadcastFrame>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }
}

impl BroadcastSource for ChannelSource {
    async fn next_frame(&mut self) -> Result<BroadcastFrame> {
        match self.rx.recv().await {
            Some(frame) => frame,
            None => std::future::pending().await,
        }
    }
}

pub fn frame(topic: &str, envelope: &Envelope) -> Result<BroadcastFrame> {
    Ok(BroadcastFrame {
        topic: topic.as_bytes().to_vec(),
        payload: envelope.encode()?,
    })
}

pub fn receive_error() -> Result<BroadcastFrame> {
    Err(ClientError::transport("connection reset"))
}
