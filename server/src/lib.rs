//! # Trellis Server
//! A broker that organizes long-lived client connections into a three-level
//! domain → cluster → channel hierarchy, places unassigned nodes through a
//! request/reply protocol with the clients themselves, and relays
//! channel-scoped activity batches between peers.
//!
//! The [`Server`] is a plain struct driven by the host's single event loop:
//! feed inbound traffic through [`Server::receive_message`], pump
//! [`Server::update`] for timeouts, and drain produced [`Events`] with
//! [`Server::receive`].

#![deny(
    trivial_casts,
    trivial_numeric_casts,
    unstable_features,
    unused_import_braces
)]

pub mod transport;

mod connection;
mod error;
mod events;
mod pool;
mod request;
mod server;
mod sync;

pub use connection::{Connection, ConnectionKey};
pub use error::ServerError;
pub use events::{
    AssignmentEvent, BatchRelayEvent, DisconnectEvent, ErrorEvent, Event, Events,
    RegistrationEvent, RejectionEvent,
};
pub use server::{ConnectionDetail, LevelStats, OfflineReport, PoolStats, Server, ServerConfig};
