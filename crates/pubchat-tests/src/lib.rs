//! Integration test helpers for pubchat end-to-end scenarios.
//!
//! [`harness::broker::TestBroker`] serves the broker and proxy endpoints on
//! real ZeroMQ sockets, so sessions and bots under test go through the same
//! transports as production.

pub mod harness;
