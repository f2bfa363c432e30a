//! External collaborator contracts (§6).
//!
//! Everything in this module is a seam the embedder implements; this crate
//! never constructs a concrete socket, interface, or kernel-address table
//! itself. Generic parameters (`Client<S, I, D, A, H>`) are used rather than
//! trait objects, so each seam is statically dispatched.

use std::net::Ipv6Addr;

use crate::duid::Duid;

/// Moves DHCPv6 bytes to/from the wire. ENXIO/ENETDOWN-equivalent errors are
/// not failures (the interface is transiently down); everything else is
/// logged and swallowed by the client (§7).
pub trait Socket {
    fn transmit(&mut self, packet: &[u8]) -> std::io::Result<()>;
}

/// Link-layer medium a DHCPv6 client interface runs over (§4.6, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLayerType {
    Wired,
    Wireless,
    Cellular,
}

/// Snapshot of link state as reported by the embedding service (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatus {
    /// The link is usable at all (carrier present).
    pub valid: bool,
    /// The interface is the one currently in active use (vs. standby).
    pub active: bool,
    /// Hint from the service: true if wake found the same network as
    /// before sleep, so in-flight timers can simply be rescheduled rather
    /// than restarted.
    pub wake_on_same_network: bool,
}

/// Reports link state, link-layer type, and the interface's present
/// IPv6 addresses (with DAD status) to the client.
pub trait Interface {
    fn name(&self) -> &str;
    fn link_layer_index(&self) -> u32;
    fn link_layer_type(&self) -> LinkLayerType;
    fn is_wireless(&self) -> bool {
        matches!(self.link_layer_type(), LinkLayerType::Wireless)
    }
    fn link_status(&self) -> LinkStatus;
}

/// Duplicate-address-detection state of one address reported by
/// [`Interface`] on an address-list-changed event (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressDadState {
    Tentative,
    Duplicated,
    Usable,
}

/// Establishes and persists the system-wide DUID, or hands back a
/// per-interface private DUID when the client was started with
/// `privacy_required`.
pub trait DuidSource {
    fn establish_and_get(&mut self) -> Duid;
    fn copy_random(&mut self, interface_name: &str) -> Duid;
    fn allocate_iaid(&mut self, interface_name: &str) -> u32;
}

bitflags::bitflags! {
    /// Kernel address-table flags an added address carries (§6). A DHCPv6
    /// client only ever adds `DYNAMIC` addresses; the type stays a bitflags
    /// set rather than a bare bool so an embedder's `AddressTable` can OR in
    /// its own platform-specific flags (e.g. `TEMPORARY`, `DEPRECATED`)
    /// without widening this trait's signature.
    pub struct AddressFlags: u32 {
        const DYNAMIC = 0x1;
    }
}

/// `DYNAMIC`-flagged kernel IPv6 address table operations (§6).
pub trait AddressTable {
    fn add_address(
        &mut self,
        interface_name: &str,
        address: Ipv6Addr,
        prefix_length: u8,
        flags: AddressFlags,
        valid_lifetime: u32,
        preferred_lifetime: u32,
    ) -> std::io::Result<()>;

    fn remove_address(&mut self, interface_name: &str, address: Ipv6Addr) -> std::io::Result<()>;
}

/// Hosts the event loop and receives coalesced notifications.
pub trait ServiceHost {
    fn get_ssid(&self) -> Option<String>;
    fn notify(&mut self, notification: crate::notify::Notification);
}
