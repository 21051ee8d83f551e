use crate::broadcast::{Broadcast, Listener};
use crate::clock::LogicalClock;
use crate::command::CommandChannel;
use crate::config::{ClientConfig, DEFAULT_RECEIVE_BACKOFF};
use crate::error::{ClientError, Result};
use crate::protocol::{FAILURE_STATUS, Operation, STATUS_KEY, TIMESTAMP_KEY};
use crate::time::now_ms;
use crate::transport::{BroadcastSource, CommandTransport, ZmqCommand, ZmqSubscriber};
use crate::value::Value;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// A logged-in (or about to be) chat participant.
///
/// Owns the command channel, the logical clock and the channel cache.
/// Every operation takes `&mut self`, which keeps the command channel
/// strictly request-then-response. The clock and the username are shared
/// with the broadcast listener once [`Session::listen`] has been called.
pub struct Session<T> {
    command: CommandChannel<T>,
    clock: LogicalClock,
    identity: watch::Sender<Option<String>>,
    channels: Vec<String>,
    listener: Option<Listener>,
    receive_backoff: Duration,
}

impl Session<ZmqCommand> {
    /// Connect the command socket to the broker and the subscription socket
    /// to the proxy. The subscriber is returned unstarted; pass it to
    /// [`Session::listen`].
    pub async fn connect(config: &ClientConfig) -> Result<(Self, ZmqSubscriber)> {
        let command = ZmqCommand::connect(&config.broker_endpoint).await?;
        let subscriber = ZmqSubscriber::connect(&config.proxy_endpoint).await?;
        tracing::info!(
            broker = %config.broker_endpoint,
            proxy = %config.proxy_endpoint,
            "connected"
        );
        let session = Session::new(command)
            .with_timeout(config.request_timeout)
            .with_receive_backoff(config.receive_backoff);
        Ok((session, subscriber))
    }
}

impl<T: CommandTransport> Session<T> {
    pub fn new(transport: T) -> Self {
        let clock = LogicalClock::new();
        Self {
            command: CommandChannel::new(transport, clock.clone()),
            clock,
            identity: watch::Sender::new(None),
            channels: Vec::new(),
            listener: None,
            receive_backoff: DEFAULT_RECEIVE_BACKOFF,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command.set_timeout(timeout);
        self
    }

    pub fn with_receive_backoff(mut self, backoff: Duration) -> Self {
        self.receive_backoff = backoff;
        self
    }

    /// Start the broadcast listener. Rendered broadcasts arrive on the
    /// returned receiver. A previously started listener is stopped first.
    pub fn listen<S: BroadcastSource>(&mut self, source: S) -> mpsc::UnboundedReceiver<Broadcast> {
        if let Some(old) = self.listener.take() {
            old.cancel();
        }
        let (listener, rx) = Listener::spawn(
            source,
            self.clock.clone(),
            self.identity.subscribe(),
            self.receive_backoff,
        );
        self.listener = Some(listener);
        rx
    }

    pub fn is_listening(&self) -> bool {
        self.listener.as_ref().is_some_and(Listener::is_running)
    }

    pub fn username(&self) -> Option<String> {
        self.identity.borrow().clone()
    }

    /// Current logical clock value.
    pub fn clock(&self) -> u64 {
        self.clock.value()
    }

    /// Channel names from the last successful listing, plus any created since.
    pub fn known_channels(&self) -> &[String] {
        &self.channels
    }

    // -- Operations --

    /// Log in as `user`. On success the session adopts the name, replacing
    /// any earlier login.
    pub async fn login(&mut self, user: &str) -> Result<()> {
        let data = Value::from_iter([
            ("user", Value::from(user)),
            (TIMESTAMP_KEY, Value::from(now_ms())),
        ]);
        let reply = self.call(Operation::Login, data).await?;
        check_status(Operation::Login, &reply)?;
        self.identity.send_replace(Some(user.to_string()));
        tracing::info!(user, "logged in");
        Ok(())
    }

    pub async fn list_users(&mut self) -> Result<Vec<String>> {
        let reply = self.call(Operation::ListUsers, timestamp_only()).await?;
        check_status(Operation::ListUsers, &reply)?;
        Ok(reply.string_list("users"))
    }

    /// List channels and replace the cache with the result.
    pub async fn list_channels(&mut self) -> Result<Vec<String>> {
        let reply = self.call(Operation::ListChannels, timestamp_only()).await?;
        check_status(Operation::ListChannels, &reply)?;
        let channels = reply.string_list("channels");
        self.channels.clone_from(&channels);
        Ok(channels)
    }

    /// Create a channel and add it to the cache.
    pub async fn create_channel(&mut self, name: &str) -> Result<()> {
        let data = Value::from_iter([
            ("channel", Value::from(name)),
            (TIMESTAMP_KEY, Value::from(now_ms())),
        ]);
        let reply = self.call(Operation::CreateChannel, data).await?;
        check_status(Operation::CreateChannel, &reply)?;
        if !self.channels.iter().any(|c| c == name) {
            self.channels.push(name.to_string());
        }
        tracing::info!(channel = name, "channel created");
        Ok(())
    }

    pub async fn publish(&mut self, channel: &str, message: &str) -> Result<()> {
        let data = Value::from_iter([
            ("user", Value::from(self.username().unwrap_or_default())),
            ("channel", Value::from(channel)),
            ("message", Value::from(message)),
            (TIMESTAMP_KEY, Value::from(now_ms())),
        ]);
        let reply = self.call(Operation::Publish, data).await?;
        check_status(Operation::Publish, &reply)
    }

    pub async fn send_private(&mut self, dst: &str, message: &str) -> Result<()> {
        let data = Value::from_iter([
            ("src", Value::from(self.username().unwrap_or_default())),
            ("dst", Value::from(dst)),
            ("message", Value::from(message)),
            (TIMESTAMP_KEY, Value::from(now_ms())),
        ]);
        let reply = self.call(Operation::PrivateMessage, data).await?;
        check_status(Operation::PrivateMessage, &reply)
    }

    /// Stop the listener, if any, and drop the connection.
    pub async fn close(mut self) {
        if let Some(listener) = self.listener.take() {
            listener.shutdown().await;
        }
    }

    async fn call(&mut self, op: Operation, data: Value) -> Result<Value> {
        self.command.request(op.service(), data).await.inspect_err(|e| {
            tracing::debug!(%op, err = %e, "request failed");
        })
    }
}

impl<T> Drop for Session<T> {
    fn drop(&mut self) {
        if let Some(listener) = &self.listener {
            listener.cancel();
        }
    }
}

fn timestamp_only() -> Value {
    Value::from_iter([(TIMESTAMP_KEY, Value::from(now_ms()))])
}

/// Apply the broker's status convention to a reply.
///
/// The reply must be a map. It is a rejection exactly when `status` is the
/// failure sentinel; the reason is read from the operation's failure key.
pub fn check_status(op: Operation, reply: &Value) -> Result<()> {
    if !reply.is_map() {
        return Err(ClientError::Protocol {
            op,
            detail: "response data is not a map".to_string(),
        });
    }
    if reply.str_field(STATUS_KEY) == FAILURE_STATUS {
        return Err(ClientError::Rejected {
            op,
            reason: reply.str_field(op.failure_key()).to_string(),
        });
    }
    Ok(())
}
