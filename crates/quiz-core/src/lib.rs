//! Core types for the elimination-quiz realtime client.
//!
//! Everything in this crate is I/O-free and clock-injected: the wire
//! protocol, the session state machine, the countdown timer, and the
//! answer reconciliation unit are all plain data structures that can be
//! driven from tests with synthetic events and instants. Networking
//! lives in the `quiz-client` crate.

pub mod answer;
pub mod protocol;
pub mod session;
pub mod timer;
