//! Wire format for the subset of DHCPv6 (RFC 8415) this client speaks.
//!
//! Splits the codec in two: a
//! [`Packet`] wrapper over a raw buffer for header field access and option
//! iteration, and a [`Repr`] that parses the options this client understands
//! into a typed, owned-enough structure, and can emit itself back into a
//! buffer. This module never logs; callers decide what a parse failure means.

pub(crate) mod message;
mod repr;

pub use message::{
    option_is_ok, parse_options, Dhcpv6Option, Dhcpv6OptionWriter, MessageType, Packet,
    ALWAYS_OK_OPTIONS, CLIENT_PORT, MAX_DNS_ADDRESSES, MAX_IA_ADDRESSES, MAX_REQUEST_OPTIONS,
    SERVER_PORT,
};
pub(crate) use message::field;
pub use repr::Repr;
pub use repr::{ReprDnsServers, ReprIaAddr, ReprIaNa, ReprStatusCode, StatusCode};

pub(crate) type Field = core::ops::Range<usize>;
pub(crate) type Rest = core::ops::RangeFrom<usize>;

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone, Copy)]
pub enum Error {
    #[error("DHCPv6 packet shorter than its fixed header")]
    Truncated,
    #[error("DHCPv6 option length spills past the enclosing buffer")]
    Malformed,
    #[error("too many values for a fixed-capacity option")]
    TooMany,
}

pub type Result<T> = core::result::Result<T, Error>;

/// All_DHCP_Relay_Agents_and_Servers, the link-local multicast group every
/// DHCPv6 client sends to (RFC 8415 §7.1).
pub const ALL_DHCP_RELAY_AGENTS_AND_SERVERS: std::net::Ipv6Addr =
    std::net::Ipv6Addr::new(0xff02, 0, 0, 0, 0, 0, 1, 2);

/// Builds the `From`/`Into` pair and a catch-all `Unknown` variant for a
/// C-like enum backed by an integer wire value.
macro_rules! enum_with_unknown {
    (
        $( #[$enum_attr:meta] )*
        pub enum $name:ident($int_ty:ty) {
            $( $variant:ident = $value:expr ),+ $(,)?
        }
    ) => {
        $( #[$enum_attr] )*
        #[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
        pub enum $name {
            $( $variant ),+,
            Unknown($int_ty),
        }

        impl ::core::convert::From<$int_ty> for $name {
            fn from(value: $int_ty) -> Self {
                match value {
                    $( $value => Self::$variant, )+
                    other => Self::Unknown(other),
                }
            }
        }

        impl ::core::convert::From<$name> for $int_ty {
            fn from(value: $name) -> Self {
                match value {
                    $( $name::$variant => $value, )+
                    $name::Unknown(other) => other,
                }
            }
        }
    };
}

pub(crate) use enum_with_unknown;
