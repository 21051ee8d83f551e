//! In-process stand-in for the broker and the fan-out proxy.
//!
//! Speaks the same envelopes and reply conventions as the real broker so
//! sessions, the bot and integration harnesses can run without any sockets.
//! It keeps users and channels in memory and fans publications and private
//! messages out to every subscriber.

use crate::clock::LogicalClock;
use crate::envelope::Envelope;
use crate::error::{ClientError, Result};
use crate::protocol::{
    CLOCK_KEY, FAILURE_STATUS, PUBLISH_OK_STATUS, STATUS_KEY, SUCCESS_STATUS, TIMESTAMP_KEY,
    service,
};
use crate::time::now_ms;
use crate::transport::{BroadcastFrame, BroadcastSource, CommandTransport};
use crate::value::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

const FANOUT_CAPACITY: usize = 1024;

#[derive(Default)]
struct BrokerState {
    users: Vec<String>,
    channels: Vec<String>,
    offline: bool,
}

/// Shared in-memory broker. Clones refer to the same broker.
#[derive(Clone)]
pub struct LoopbackBroker {
    state: Arc<Mutex<BrokerState>>,
    clock: LogicalClock,
    fanout: broadcast::Sender<BroadcastFrame>,
}

impl Default for LoopbackBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackBroker {
    pub fn new() -> Self {
        let (fanout, _) = broadcast::channel(FANOUT_CAPACITY);
        Self {
            state: Arc::default(),
            clock: LogicalClock::new(),
            fanout,
        }
    }

    /// A command transport bound to this broker.
    pub fn command(&self) -> LoopbackCommand {
        LoopbackCommand {
            broker: self.clone(),
        }
    }

    /// A new subscriber. Only broadcasts sent after this call are seen.
    pub fn subscribe(&self) -> LoopbackSubscriber {
        LoopbackSubscriber {
            rx: self.fanout.subscribe(),
        }
    }

    /// Raw fan-out feed, for forwarding onto a real PUB socket.
    pub fn fanout(&self) -> broadcast::Receiver<BroadcastFrame> {
        self.fanout.subscribe()
    }

    pub fn channels(&self) -> Vec<String> {
        self.lock().channels.clone()
    }

    pub fn users(&self) -> Vec<String> {
        self.lock().users.clone()
    }

    pub fn add_channel(&self, name: &str) {
        let mut state = self.lock();
        if !state.channels.iter().any(|c| c == name) {
            state.channels.push(name.to_string());
        }
    }

    /// Remove a channel behind the clients' backs.
    pub fn delete_channel(&self, name: &str) {
        self.lock().channels.retain(|c| c != name);
    }

    /// While offline, every command exchange fails at the transport level.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Push an arbitrary frame to every subscriber.
    pub fn broadcast_raw(&self, topic: &str, payload: Vec<u8>) {
        let _ = self.fanout.send(BroadcastFrame {
            topic: topic.as_bytes().to_vec(),
            payload,
        });
    }

    /// Handle one encoded request and return the encoded reply.
    pub fn handle(&self, request: &[u8]) -> Result<Vec<u8>> {
        let reply = match Envelope::decode(request) {
            Ok(request) => self.dispatch(request),
            Err(e) => self.failure(service::ERROR, "description", &e.to_string()),
        };
        reply.encode()
    }

    fn dispatch(&self, request: Envelope) -> Envelope {
        if let Some(peer) = request.clock() {
            self.clock.merge_wire(peer);
        }
        let data = &request.data;
        match request.service.as_str() {
            service::LOGIN => {
                let user = data.str_field("user").trim();
                if user.is_empty() {
                    return self.failure(service::LOGIN, "description", "invalid username");
                }
                let mut state = self.lock();
                if !state.users.iter().any(|u| u == user) {
                    state.users.push(user.to_string());
                }
                drop(state);
                self.status(service::LOGIN, SUCCESS_STATUS)
            }
            service::USERS => {
                let users = self.users();
                self.reply(service::USERS, [("users", Value::from(users))])
            }
            service::CHANNELS => {
                let channels = self.channels();
                self.reply(service::CHANNELS, [("channels", Value::from(channels))])
            }
            service::CHANNEL => {
                let name = data.str_field("channel").trim();
                if name.is_empty() {
                    return self.failure(service::CHANNEL, "description", "invalid channel name");
                }
                let mut state = self.lock();
                if state.channels.iter().any(|c| c == name) {
                    return self.failure(service::CHANNEL, "description", "channel already exists");
                }
                state.channels.push(name.to_string());
                drop(state);
                self.status(service::CHANNEL, SUCCESS_STATUS)
            }
            service::PUBLISH => {
                let channel = data.str_field("channel");
                if !self.lock().channels.iter().any(|c| c == channel) {
                    return self.failure(service::PUBLISH, "message", "channel does not exist");
                }
                self.fan_out(
                    channel,
                    service::PUBLICATION,
                    [
                        ("user", Value::from(data.str_field("user"))),
                        ("channel", Value::from(channel)),
                        ("message", Value::from(data.str_field("message"))),
                    ],
                );
                self.status(service::PUBLISH, PUBLISH_OK_STATUS)
            }
            service::MESSAGE => {
                let dst = data.str_field("dst");
                if !self.lock().users.iter().any(|u| u == dst) {
                    return self.failure(service::MESSAGE, "message", "destination user does not exist");
                }
                self.fan_out(
                    dst,
                    service::PRIVATE_MESSAGE,
                    [
                        ("src", Value::from(data.str_field("src"))),
                        ("dst", Value::from(dst)),
                        ("message", Value::from(data.str_field("message"))),
                    ],
                );
                self.status(service::MESSAGE, PUBLISH_OK_STATUS)
            }
            other => self.failure(other, "description", "service not found"),
        }
    }

    fn fan_out<const N: usize>(&self, topic: &str, service: &str, fields: [(&str, Value); N]) {
        let envelope = self.reply(service, fields);
        match envelope.encode() {
            Ok(payload) => self.broadcast_raw(topic, payload),
            Err(e) => tracing::warn!(err = %e, "failed to encode broadcast"),
        }
    }

    fn reply<const N: usize>(&self, service: &str, fields: [(&str, Value); N]) -> Envelope {
        let mut data: Value = fields.into_iter().collect();
        if let Value::Map(map) = &mut data {
            map.insert(TIMESTAMP_KEY.to_string(), Value::from(now_ms()));
            map.insert(CLOCK_KEY.to_string(), Value::from(self.clock.tick()));
        }
        Envelope::new(service, data)
    }

    fn status(&self, service: &str, status: &str) -> Envelope {
        self.reply(service, [(STATUS_KEY, Value::from(status))])
    }

    fn failure(&self, service: &str, key: &str, text: &str) -> Envelope {
        self.reply(
            service,
            [(STATUS_KEY, Value::from(FAILURE_STATUS)), (key, Value::from(text))],
        )
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Command transport talking to a [`LoopbackBroker`].
pub struct LoopbackCommand {
    broker: LoopbackBroker,
}

impl CommandTransport for LoopbackCommand {
    async fn round_trip(&mut self, request: Vec<u8>) -> Result<Vec<u8>> {
        if self.broker.lock().offline {
            return Err(ClientError::transport("broker unreachable"));
        }
        self.broker.handle(&request)
    }
}

/// Broadcast source fed by a [`LoopbackBroker`].
pub struct LoopbackSubscriber {
    rx: broadcast::Receiver<BroadcastFrame>,
}

impl BroadcastSource for LoopbackSubscriber {
    async fn next_frame(&mut self) -> Result<BroadcastFrame> {
        self.rx.recv().await.map_err(ClientError::transport)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::Broadcast;
    use crate::session::Session;
    use std::time::Duration;

    #[tokio::test]
    async fn publication_reaches_a_second_session() {
        let broker = LoopbackBroker::new();

        let mut bob = Session::new(broker.command());
        let mut bob_rx = bob.listen(broker.subscribe());
        bob.login("Bob").await.unwrap();

        let mut alice = Session::new(broker.command());
        alice.login("Alice").await.unwrap();
        assert!(alice.list_channels().await.unwrap().is_empty());
        alice.create_channel("general").await.unwrap();
        alice.publish("general", "hi").await.unwrap();

        let seen = tokio::time::timeout(Duration::from_secs(5), bob_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            seen,
            Broadcast::Publication {
                user: "Alice".to_string(),
                channel: "general".to_string(),
                message: "hi".to_string(),
            }
        );
        assert_eq!(seen.to_string(), "[general] Alice: hi");
    }

    #[tokio::test]
    async fn private_message_only_rendered_for_recipient() {
        let broker = LoopbackBroker::new();
        let mut bob = Session::new(broker.command());
        let mut bob_rx = bob.listen(broker.subscribe());
        bob.login("bob").await.unwrap();
        let mut carol = Session::new(broker.command());
        let mut carol_rx = carol.listen(broker.subscribe());
        carol.login("carol").await.unwrap();

        let mut alice = Session::new(broker.command());
        alice.login("alice").await.unwrap();
        alice.send_private("bob", "just for bob").await.unwrap();
        alice.send_private("carol", "now carol").await.unwrap();

        let for_bob = tokio::time::timeout(Duration::from_secs(5), bob_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(for_bob.to_string(), "[PRIVATE] alice: just for bob");
        // Carol's first rendered line is her own message, not bob's.
        let for_carol = tokio::time::timeout(Duration::from_secs(5), carol_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(for_carol.to_string(), "[PRIVATE] alice: now carol");
    }

    #[tokio::test]
    async fn publish_to_deleted_channel_is_rejected() {
        let broker = LoopbackBroker::new();
        broker.add_channel("general");
        let mut alice = Session::new(broker.command());
        alice.login("alice").await.unwrap();
        broker.delete_channel("general");
        let err = alice.publish("general", "hello?").await.unwrap_err();
        assert!(err.is_rejected());
    }

    #[tokio::test]
    async fn offline_broker_is_transport_error() {
        let broker = LoopbackBroker::new();
        let mut alice = Session::new(broker.command());
        broker.set_offline(true);
        assert!(alice.login("alice").await.unwrap_err().is_transport());
        broker.set_offline(false);
        alice.login("alice").await.unwrap();
    }

    #[tokio::test]
    async fn malformed_request_gets_error_envelope() {
        let broker = LoopbackBroker::new();
        let reply = Envelope::decode(&broker.handle(b"junk").unwrap()).unwrap();
        assert_eq!(reply.service, "error");
        assert_eq!(reply.data.str_field("status"), "erro");
    }

    #[tokio::test]
    async fn unknown_service_is_rejected_by_status() {
        let broker = LoopbackBroker::new();
        let request = Envelope::new("nope", Value::map()).encode().unwrap();
        let reply = Envelope::decode(&broker.handle(&request).unwrap()).unwrap();
        assert_eq!(reply.data.str_field("status"), "erro");
        assert_eq!(reply.data.str_field("description"), "service not found");
    }
}
