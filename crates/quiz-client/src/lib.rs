//! Realtime session core for the elimination quiz.
//!
//! The crate is layered leaves-first:
//!
//! - [`transport`] — the seam between the session core and any concrete
//!   socket: reader/writer trait halves plus a [`transport::Connector`]
//!   factory so tests can dial in-memory transports.
//! - [`ws_transport`] — the production WebSocket implementation.
//! - [`connection`] — the connection manager: one background supervisor
//!   task per connection handling reconnect-with-backoff, the
//!   heartbeat, and frame parsing.
//! - [`controller`] — the session facade: owns one connection, the
//!   state machine, the countdown timer, and the answer slot, and
//!   exposes the verbs (create/join/leave room, start game, submit
//!   answer, reconnect, ...).
//!
//! Exactly one [`controller::SessionController`] should exist per game
//! view; all UI consumers observe it so only one physical connection
//! exists. The constructing owner calls `close()` on teardown;
//! everything else only borrows state.

pub mod connection;
pub mod controller;
pub mod transport;
pub mod ws_transport;

#[cfg(test)]
pub(crate) mod testing;
