//! A per-interface DHCPv6 (RFC 8415) client: wire codec, RFC 3315 §14
//! randomized exponential backoff, lease bookkeeping, and the twelve-state
//! client state machine, all driven synchronously by an embedder rather
//! than owning a socket, a clock, or a thread of its own.
//!
//! The embedder supplies five collaborators (§6): a [`collab::Socket`] to
//! move bytes, a [`collab::Interface`] to report link state, a
//! [`collab::DuidSource`] to establish identifiers, a [`collab::AddressTable`]
//! to program the kernel's address list, and a [`collab::ServiceHost`] to
//! receive coalesced notifications. It then drives [`client::Client`] with
//! three entry points: [`client::Client::handle_message`] on every inbound
//! datagram, [`client::Client::poll_timer`] at or after
//! [`client::Client::next_poll_at`], and [`client::Client::handle_event`] on
//! link/address/power events.

pub mod client;
pub mod collab;
pub mod config;
pub mod duid;
pub mod error;
pub mod lease;
pub mod notify;
pub mod retransmit;
pub mod wire;

pub use client::{Client, Event, Mode, StateId};
pub use collab::{AddressDadState, AddressFlags, AddressTable, DuidSource, Interface, LinkLayerType, LinkStatus, ServiceHost, Socket};
pub use config::ClientConfig;
pub use duid::{Duid, DuidKind};
pub use error::ClientError;
pub use lease::Lease;
pub use notify::Notification;
