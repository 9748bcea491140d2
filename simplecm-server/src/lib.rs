//! Control server for the simplecm connection manager.
//!
//! Exposes a [`simplecm::Service`] over a newline-delimited TCP protocol so
//! a test harness (or a person with `nc`) can play both the protocol side
//! and a Telepathy client.

pub mod config;
pub mod control;
pub mod server;
pub mod session;
