//! Broadcast listener: drains the subscription transport, merges clocks and
//! turns `publication` / `private_message` envelopes into [`Broadcast`]s.

use crate::clock::LogicalClock;
use crate::envelope::Envelope;
use crate::protocol::service;
use crate::transport::BroadcastSource;
use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A broadcast worth showing to the local user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Broadcast {
    /// A message published to a channel.
    Publication {
        user: String,
        channel: String,
        message: String,
    },
    /// A private message addressed to the local user.
    PrivateMessage { src: String, message: String },
}

impl fmt::Display for Broadcast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Broadcast::Publication {
                user,
                channel,
                message,
            } => write!(f, "[{channel}] {user}: {message}"),
            Broadcast::PrivateMessage { src, message } => write!(f, "[PRIVATE] {src}: {message}"),
        }
    }
}

/// Interpret a decoded envelope for the user named `me`.
///
/// Private messages for anyone else are dropped here: the proxy delivers
/// every broadcast to every subscriber. Unknown services and non-map
/// payloads yield `None`.
pub fn interpret(envelope: &Envelope, me: Option<&str>) -> Option<Broadcast> {
    let data = &envelope.data;
    if !data.is_map() {
        return None;
    }
    match envelope.service.as_str() {
        service::PUBLICATION => Some(Broadcast::Publication {
            user: data.str_field("user").to_string(),
            channel: data.str_field("channel").to_string(),
            message: data.str_field("message").to_string(),
        }),
        service::PRIVATE_MESSAGE => {
            let dst = data.str_field("dst");
            if me != Some(dst) {
                return None;
            }
            Some(Broadcast::PrivateMessage {
                src: data.str_field("src").to_string(),
                message: data.str_field("message").to_string(),
            })
        }
        _ => None,
    }
}

/// Decode one payload, merge its clock and interpret it.
///
/// Undecodable payloads are logged and dropped.
pub fn handle_payload(payload: &[u8], clock: &LogicalClock, me: Option<&str>) -> Option<Broadcast> {
    let envelope = match Envelope::decode(payload) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(err = %e, "dropping undecodable broadcast");
            return None;
        }
    };
    if let Some(peer) = envelope.clock() {
        clock.merge_wire(peer);
    }
    interpret(&envelope, me)
}

/// Handle to a running listener task.
pub struct Listener {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl Listener {
    /// Spawn the listener loop on the current runtime.
    ///
    /// The loop only ends when cancelled. Receive failures are logged and
    /// retried after `backoff`; decode failures drop the offending frame.
    pub fn spawn<S: BroadcastSource>(
        source: S,
        clock: LogicalClock,
        identity: watch::Receiver<Option<String>>,
        backoff: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<Broadcast>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(source, clock, identity, tx, cancel.clone(), backoff));
        (Self { cancel, task }, rx)
    }

    /// Stop the loop and wait for the task to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::debug!(err = %e, "listener task ended abnormally");
        }
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }
}

async fn run<S: BroadcastSource>(
    mut source: S,
    clock: LogicalClock,
    identity: watch::Receiver<Option<String>>,
    tx: mpsc::UnboundedSender<Broadcast>,
    cancel: CancellationToken,
    backoff: Duration,
) {
    tracing::debug!("broadcast listener started");
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => break,
            frame = source.next_frame() => frame,
        };

        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(err = %e, "broadcast receive failed");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => continue,
                }
            }
        };

        let me = identity.borrow().clone();
        if let Some(broadcast) = handle_payload(&frame.payload, &clock, me.as_deref()) {
            // Nobody reading is fine; the clock merge above still counts.
            let _ = tx.send(broadcast);
        }
    }
    tracing::debug!("broadcast listener stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ChannelSource, frame, receive_error};
    use crate::value::Value;

    fn publication(user: &str, channel: &str, message: &str, clock: i64) -> Envelope {
        Envelope::new(
            "publication",
            Value::from_iter([
                ("user", Value::from(user)),
                ("channel", Value::from(channel)),
                ("message", Value::from(message)),
                ("clock", Value::Int(clock)),
            ]),
        )
    }

    fn private(src: &str, dst: &str, message: &str) -> Envelope {
        Envelope::new(
            "private_message",
            Value::from_iter([
                ("src", Value::from(src)),
                ("dst", Value::from(dst)),
                ("message", Value::from(message)),
                ("clock", Value::Int(5)),
            ]),
        )
    }

    #[test]
    fn renders_publication_and_private() {
        let p = interpret(&publication("alice", "general", "hi", 1), None).unwrap();
        assert_eq!(p.to_string(), "[general] alice: hi");
        let m = interpret(&private("alice", "bob", "psst"), Some("bob")).unwrap();
        assert_eq!(m.to_string(), "[PRIVATE] alice: psst");
    }

    #[test]
    fn private_for_someone_else_is_dropped() {
        assert!(interpret(&private("alice", "carol", "psst"), Some("bob")).is_none());
        assert!(interpret(&private("alice", "", "psst"), None).is_none());
    }

    #[test]
    fn unknown_service_and_non_map_ignored() {
        let other = Envelope::new("heartbeat", Value::from_iter([("user", "x")]));
        assert!(interpret(&other, Some("x")).is_none());
        let bare = Envelope::new("publication", Value::from("text"));
        assert!(interpret(&bare, None).is_none());
    }

    #[test]
    fn dropped_private_still_merges_clock() {
        let clock = LogicalClock::new();
        let payload = private("alice", "carol", "psst").encode().unwrap();
        assert!(handle_payload(&payload, &clock, Some("bob")).is_none());
        assert_eq!(clock.value(), 6);
    }

    #[test]
    fn garbage_payload_is_dropped_without_touching_clock() {
        let clock = LogicalClock::new();
        assert!(handle_payload(b"\x92\x01", &clock, None).is_none());
        assert_eq!(clock.value(), 0);
    }

    #[tokio::test]
    async fn listener_survives_errors_and_merges_clock() {
        let (feed, source) = ChannelSource::new();
        let clock = LogicalClock::new();
        let (_identity_tx, identity) = watch::channel(Some("bob".to_string()));
        let (listener, mut rx) =
            Listener::spawn(source, clock.clone(), identity, Duration::from_millis(1));

        feed.send(receive_error()).unwrap();
        feed.send(Ok(crate::transport::BroadcastFrame {
            topic: b"general".to_vec(),
            payload: b"not msgpack".to_vec(),
        }))
        .unwrap();
        feed.send(frame("general", &publication("alice", "general", "hi", 9)))
            .unwrap();
        feed.send(frame("carol", &private("alice", "carol", "secret")))
            .unwrap();
        feed.send(frame("bob", &private("alice", "bob", "for bob")))
            .unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            Broadcast::Publication {
                user: "alice".to_string(),
                channel: "general".to_string(),
                message: "hi".to_string(),
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            Broadcast::PrivateMessage {
                src: "alice".to_string(),
                message: "for bob".to_string(),
            }
        );
        assert!(listener.is_running());
        // 9 -> 10, then two merges of 5 -> 11, 12.
        assert_eq!(clock.value(), 12);

        listener.shutdown().await;
    }

    #[tokio::test]
    async fn identity_change_is_seen_by_listener() {
        let (feed, source) = ChannelSource::new();
        let (identity_tx, identity) = watch::channel(None);
        let (listener, mut rx) =
            Listener::spawn(source, LogicalClock::new(), identity, Duration::from_millis(1));

        identity_tx.send_replace(Some("dave".to_string()));
        feed.send(frame("dave", &private("erin", "dave", "hello")))
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().to_string(), "[PRIVATE] erin: hello");
        listener.shutdown().await;
    }
}
