use crate::clock::LogicalClock;
use crate::envelope::{self, Envelope};
use crate::error::{ClientError, Result};
use crate::protocol::CLOCK_KEY;
use crate::transport::CommandTransport;
use crate::value::Value;
use std::future::Future;
use std::time::Duration;

/// Request/response channel to the broker.
///
/// `request` takes `&mut self`, so a second request cannot be issued while
/// one is in flight on the same channel.
pub struct CommandChannel<T> {
    transport: T,
    clock: LogicalClock,
    timeout: Option<Duration>,
    /// Set when an exchange was abandoned or failed midway. The transport
    /// is reset before the next request goes out.
    stale: bool,
}

impl<T: CommandTransport> CommandChannel<T> {
    pub fn new(transport: T, clock: LogicalClock) -> Self {
        Self {
            transport,
            clock,
            timeout: None,
            stale: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.set_timeout(timeout);
        self
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Tick the clock, send `data` under `service`, wait for the reply and
    /// merge the reply's clock. Returns the reply's `data`.
    ///
    /// The clock value is attached under `clock` only when `data` is a map;
    /// any other payload goes out unannotated.
    ///
    /// A timed-out or failed exchange leaves the transport owing a reply. It
    /// is reset before the next request, and if that reset fails the next
    /// request fails with a transport error instead of reading a stale reply.
    pub async fn request(&mut self, service: &str, mut data: Value) -> Result<Value> {
        if self.stale {
            self.reset().await?;
        }

        let clock = self.clock.tick();
        if let Value::Map(map) = &mut data {
            map.insert(CLOCK_KEY.to_string(), Value::from(clock));
        }

        let request = envelope::encode(service, &data)?;
        // Marked up front: if the exchange is cut short, the flag stays.
        self.stale = true;
        let reply = bounded(self.timeout, self.transport.round_trip(request)).await?;
        self.stale = false;

        let reply = Envelope::decode(&reply)?;
        if let Some(peer) = reply.clock() {
            self.clock.merge_wire(peer);
        }
        tracing::debug!(service, clock, reply = %reply.service, "request completed");
        Ok(reply.data)
    }

    async fn reset(&mut self) -> Result<()> {
        bounded(self.timeout, self.transport.reset())
            .await
            .inspect_err(|e| tracing::warn!(err = %e, "failed to reset command transport"))?;
        self.stale = false;
        tracing::debug!("command transport reset");
        Ok(())
    }
}

async fn bounded<F, V>(limit: Option<Duration>, fut: F) -> Result<V>
where
    F: Future<Output = Result<V>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ClientError::transport(format!("no reply within {limit:?}")))?,
        None => fut.await,
    }
}
