//! Client side of the pubchat publish/subscribe chat system.
//!
//! A [`Session`] talks to the broker over a synchronous command channel and
//! receives the broadcast stream through a background listener. Both paths
//! feed one Lamport [`LogicalClock`].

pub mod broadcast;
pub mod clock;
pub mod command;
pub mod config;
pub mod envelope;
pub mod error;
#[cfg(any(test, feature = "loopback"))]
pub mod loopback;
pub mod protocol;
pub mod session;
pub mod time;
pub mod transport;
pub mod value;

#[cfg(test)]
mod testing;

pub use broadcast::Broadcast;
pub use clock::LogicalClock;
pub use config::ClientConfig;
pub use envelope::Envelope;
pub use error::{ClientError, Result};
pub use protocol::Operation;
pub use session::Session;
pub use value::Value;
