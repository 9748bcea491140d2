//! A toy Telepathy-style connection manager.
//!
//! Clients see a [`connection::Connection`] with a handle table, contact
//! presence and text channels. The protocol side (an embedding host) drives
//! it through [`service::Service`]: it adds contacts, sets their presence,
//! injects inbound messages and collects [`event::ConnectionEvent`]s,
//! including the messages clients sent out.

pub mod channel;
pub mod chat;
pub mod connection;
pub mod error;
pub mod event;
pub mod handle;
pub mod message;
pub mod presence;
pub mod protocol;
pub mod service;
pub mod token;

pub use chat::{Chat, ChatKind};
pub use connection::Connection;
pub use error::{ServiceError, TpError};
pub use event::{ConnectionEvent, EventEnvelope};
pub use handle::{Handle, HandleType};
pub use message::MessageParts;
pub use presence::PresenceStatus;
pub use service::{Message, Service};
