use anyhow::{Context, Result};
use pubchat::ClientConfig;
use pubchat::loopback::LoopbackBroker;
use pubchat::transport::BroadcastFrame;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot};
use zeromq::{PubSocket, RepSocket, Socket, SocketRecv, SocketSend, ZmqMessage};

enum Event {
    Request(zeromq::ZmqResult<ZmqMessage>),
    Fanout(Result<BroadcastFrame, broadcast::error::RecvError>),
}

/// A broker and fan-out proxy on random local ports, backed by an
/// in-memory [`LoopbackBroker`].
pub struct TestBroker {
    pub broker: LoopbackBroker,
    pub command_endpoint: String,
    pub broadcast_endpoint: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestBroker {
    pub async fn spawn() -> Result<Self> {
        let broker = LoopbackBroker::new();

        let mut rep = RepSocket::new();
        let command_endpoint = rep
            .bind("tcp://127.0.0.1:0")
            .await
            .context("failed to bind command socket")?
            .to_string();
        let mut publisher = PubSocket::new();
        let broadcast_endpoint = publisher
            .bind("tcp://127.0.0.1:0")
            .await
            .context("failed to bind broadcast socket")?
            .to_string();

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let mut fanout = broker.fanout();
        let handler = broker.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    request = rep.recv() => Event::Request(request),
                    frame = fanout.recv() => Event::Fanout(frame),
                    _ = &mut shutdown_rx => break,
                };
                match event {
                    Event::Request(Ok(request)) => {
                        let body = request.into_vec().pop().map(|f| f.to_vec()).unwrap_or_default();
                        match handler.handle(&body) {
                            Ok(reply) => {
                                if let Err(e) = rep.send(ZmqMessage::from(reply)).await {
                                    tracing::warn!(err = %e, "test broker reply failed");
                                }
                            }
                            Err(e) => tracing::warn!(err = %e, "test broker could not encode reply"),
                        }
                    }
                    Event::Request(Err(e)) => {
                        tracing::warn!(err = %e, "test broker receive failed");
                    }
                    Event::Fanout(Ok(frame)) => {
                        let mut message = ZmqMessage::from(frame.topic);
                        message.push_back(frame.payload.into());
                        if let Err(e) = publisher.send(message).await {
                            tracing::warn!(err = %e, "test broker publish failed");
                        }
                    }
                    Event::Fanout(Err(broadcast::error::RecvError::Lagged(n))) => {
                        tracing::warn!(skipped = n, "test broker fan-out lagged");
                    }
                    Event::Fanout(Err(broadcast::error::RecvError::Closed)) => break,
                }
            }
        });

        tracing::debug!(%command_endpoint, %broadcast_endpoint, "test broker listening");
        Ok(Self {
            broker,
            command_endpoint,
            broadcast_endpoint,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Client settings pointing at this broker, with a request timeout so a
    /// wedged test fails instead of hanging.
    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            broker_endpoint: self.command_endpoint.clone(),
            proxy_endpoint: self.broadcast_endpoint.clone(),
            request_timeout: Some(Duration::from_secs(5)),
            receive_backoff: Duration::from_millis(10),
        }
    }
}

impl Drop for TestBroker {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}
