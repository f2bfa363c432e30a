use byteorder::{ByteOrder, NetworkEndian};
use std::{fmt, iter};

use super::{enum_with_unknown, Error, Field, Rest, Result};

pub const SERVER_PORT: u16 = 547;
pub const CLIENT_PORT: u16 = 546;
pub const MAX_REQUEST_OPTIONS: usize = 16;
pub const MAX_IA_ADDRESSES: usize = 4;
pub const MAX_DNS_ADDRESSES: usize = 8;

enum_with_unknown! {
    /// The possible message types of a DHCPv6 packet (RFC 8415 §7.3).
    pub enum MessageType(u8) {
        Solicit = 1,
        Advertise = 2,
        Request = 3,
        Confirm = 4,
        Renew = 5,
        Rebind = 6,
        Reply = 7,
        Release = 8,
        Decline = 9,
        Reconfigure = 10,
        InformationRequest = 11,
        RelayForw = 12,
        RelayRepl = 13,
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Solicit => write!(f, "solicit"),
            Self::Advertise => write!(f, "advertise"),
            Self::Request => write!(f, "request"),
            Self::Confirm => write!(f, "confirm"),
            Self::Renew => write!(f, "renew"),
            Self::Rebind => write!(f, "rebind"),
            Self::Reply => write!(f, "reply"),
            Self::Release => write!(f, "release"),
            Self::Decline => write!(f, "decline"),
            Self::Reconfigure => write!(f, "reconfigure"),
            Self::InformationRequest => write!(f, "information-request"),
            Self::RelayForw => write!(f, "relay-forw"),
            Self::RelayRepl => write!(f, "relay-repl"),
            Self::Unknown(a) => write!(f, "unknown({a})"),
        }
    }
}

/// Options always permitted on a DHCPv6 client regardless of what it asked
/// for via ORO (RFC 8415's `DHCPv6ClientOptionIsOK` equivalent).
pub const ALWAYS_OK_OPTIONS: &[u16] = &[
    field::OPT_CLIENTID,
    field::OPT_SERVERID,
    field::OPT_ORO,
    field::OPT_ELAPSED_TIME,
    field::OPT_UNICAST,
    field::OPT_RAPID_COMMIT,
    field::OPT_IA_NA,
    field::OPT_IA_ADDR,
    field::OPT_STATUS_CODE,
    field::OPT_IA_TA,
    field::OPT_PREFERENCE,
    field::OPT_RELAY_MSG,
    field::OPT_AUTH,
    field::OPT_USER_CLASS,
    field::OPT_VENDOR_CLASS,
    field::OPT_VENDOR_OPTS,
    field::OPT_INTERFACE_ID,
    field::OPT_RECONF_MSG,
    field::OPT_RECONF_ACCEPT,
];

/// `DHCPv6ClientOptionIsOK` (§4.3): an option is acceptable on this client if
/// it's always allowed regardless of ORO, or if it's part of the currently
/// configured requested-options set.
pub fn option_is_ok(kind: u16, requested_options: &[u16]) -> bool {
    ALWAYS_OK_OPTIONS.contains(&kind) || requested_options.contains(&kind)
}

/// A single option as a `(code, value)` pair borrowed from a packet buffer.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Dhcpv6Option<'a> {
    pub kind: u16,
    pub data: &'a [u8],
}

/// Sequential writer over the options area of an outbound packet buffer.
///
/// Each call to [`emit`](Self::emit) advances past the bytes it wrote and
/// refuses to write more than the buffer has room for, failing fast rather
/// than letting an over-long packet silently truncate.
#[derive(Debug)]
pub struct Dhcpv6OptionWriter<'a> {
    buffer: &'a mut [u8],
}

impl<'a> Dhcpv6OptionWriter<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer }
    }

    pub fn emit(&mut self, option: Dhcpv6Option<'_>) -> Result<()> {
        if option.data.len() > u16::MAX as usize {
            return Err(Error::TooMany);
        }

        let total_len = 4 + option.data.len();
        if self.buffer.len() < total_len {
            return Err(Error::Malformed);
        }

        let (buf, rest) = std::mem::take(&mut self.buffer).split_at_mut(total_len);
        self.buffer = rest;

        NetworkEndian::write_u16(&mut buf[0..2], option.kind);
        NetworkEndian::write_u16(&mut buf[2..4], option.data.len() as u16);
        buf[4..].copy_from_slice(option.data);

        Ok(())
    }

    pub fn remaining_len(&self) -> usize {
        self.buffer.len()
    }
}

/// Iterate the TLV options of a buffer, silently stopping (not erroring) at
/// the first option whose declared length would spill past the end, per
/// §4.3's "parser rejects options whose length spills past the enclosing
/// buffer" rule.
pub fn parse_options(mut buf: &[u8]) -> impl Iterator<Item = Dhcpv6Option<'_>> + '_ {
    iter::from_fn(move || {
        if buf.len() < 4 {
            return None;
        }
        let kind = NetworkEndian::read_u16(buf);
        let len = NetworkEndian::read_u16(&buf[2..]) as usize;
        if buf.len() < 4 + len {
            return None;
        }
        let opt = Dhcpv6Option {
            kind,
            data: &buf[4..4 + len],
        };
        buf = &buf[4 + len..];
        Some(opt)
    })
}

/// A read/write wrapper around a raw DHCPv6 packet buffer.
///
/// All DHCPv6 messages share a 4-byte header (1-byte message type, 3-byte
/// transaction id) followed by a stream of options (RFC 8415 §8, Figure 2).
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct Packet<T: AsRef<[u8]>> {
    buffer: T,
}

pub(crate) mod field {
    use super::{Field, Rest};

    pub const MTYPE: usize = 0;
    pub const XID: Field = 1..4;
    pub const OPTIONS: Rest = 4..;

    pub const OPT_CLIENTID: u16 = 1;
    pub const OPT_SERVERID: u16 = 2;
    pub const OPT_IA_NA: u16 = 3;
    pub const OPT_IA_TA: u16 = 4;
    pub const OPT_IA_ADDR: u16 = 5;
    pub const OPT_ORO: u16 = 6;
    pub const OPT_PREFERENCE: u16 = 7;
    pub const OPT_ELAPSED_TIME: u16 = 8;
    pub const OPT_RELAY_MSG: u16 = 9;
    pub const OPT_AUTH: u16 = 11;
    pub const OPT_UNICAST: u16 = 12;
    pub const OPT_STATUS_CODE: u16 = 13;
    pub const OPT_RAPID_COMMIT: u16 = 14;
    pub const OPT_USER_CLASS: u16 = 15;
    pub const OPT_VENDOR_CLASS: u16 = 16;
    pub const OPT_VENDOR_OPTS: u16 = 17;
    pub const OPT_INTERFACE_ID: u16 = 18;
    pub const OPT_RECONF_MSG: u16 = 19;
    pub const OPT_RECONF_ACCEPT: u16 = 20;
    pub const OPT_DNS_SERVERS: u16 = 23;
    pub const OPT_DOMAIN_LIST: u16 = 24;
    pub const OPT_CAPTIVE_PORTAL: u16 = 103;
}


impl<T: AsRef<[u8]>> Packet<T> {
    pub const fn new_unchecked(buffer: T) -> Packet<T> {
        Packet { buffer }
    }

    /// Combination of [`new_unchecked`](Self::new_unchecked) and
    /// [`check_len`](Self::check_len).
    pub fn new_checked(buffer: T) -> Result<Packet<T>> {
        let packet = Self::new_unchecked(buffer);
        packet.check_len()?;
        Ok(packet)
    }

    pub fn check_len(&self) -> Result<()> {
        if self.buffer.as_ref().len() < field::OPTIONS.start {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    pub fn into_inner(self) -> T {
        self.buffer
    }

    pub fn message_type(&self) -> MessageType {
        MessageType::from(self.buffer.as_ref()[field::MTYPE])
    }

    /// The transaction ID (`xid`); only its low 24 bits are meaningful.
    pub fn transaction_id(&self) -> u32 {
        NetworkEndian::read_u24(&self.buffer.as_ref()[field::XID])
    }

    pub fn options(&self) -> impl Iterator<Item = Dhcpv6Option<'_>> + '_ {
        parse_options(&self.buffer.as_ref()[field::OPTIONS])
    }
}

impl<T: AsRef<[u8]> + AsMut<[u8]>> Packet<T> {
    pub fn set_message_type(&mut self, value: MessageType) {
        self.buffer.as_mut()[field::MTYPE] = value.into();
    }

    pub fn set_transaction_id(&mut self, value: u32) {
        NetworkEndian::write_u24(&mut self.buffer.as_mut()[field::XID], value & 0x00ff_ffff);
    }
}

impl<'a, T: AsRef<[u8]> + AsMut<[u8]> + ?Sized> Packet<&'a mut T> {
    pub fn options_mut(&mut self) -> Dhcpv6OptionWriter<'_> {
        Dhcpv6OptionWriter::new(&mut self.buffer.as_mut()[field::OPTIONS])
    }
}

impl<'a, T: AsRef<[u8]> + ?Sized> fmt::Display for Packet<&'a T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "DHCPv6 msg-type={} trans-id={:#x}",
            self.message_type(),
            self.transaction_id()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fields_round_trip() {
        let mut buf = [0u8; 4];
        let mut packet = Packet::new_unchecked(&mut buf[..]);
        packet.set_message_type(MessageType::Solicit);
        packet.set_transaction_id(0x00ff_00ff);
        assert_eq!(packet.message_type(), MessageType::Solicit);
        // Only the low 24 bits are meaningful.
        assert_eq!(packet.transaction_id(), 0x00ff_00ff & 0x00ff_ffff);
    }

    #[test]
    fn shorter_than_header_is_truncated() {
        let buf = [0u8; 3];
        assert_eq!(Packet::new_checked(&buf[..]).unwrap_err(), Error::Truncated);
    }

    #[test]
    fn options_iterate_in_order() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&[u8::from(MessageType::Reply), 0, 0, 1]);
        let mut body = vec![0u8; 4 + 2 + 4 + 3];
        {
            let mut w = Dhcpv6OptionWriter::new(&mut body);
            w.emit(Dhcpv6Option { kind: field::OPT_ELAPSED_TIME, data: &[0, 5] }).unwrap();
            w.emit(Dhcpv6Option { kind: field::OPT_CLIENTID, data: &[1, 2, 3] }).unwrap();
        }
        buf.extend_from_slice(&body);

        let packet = Packet::new_checked(&buf[..]).unwrap();
        let options: Vec<_> = packet.options().collect();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].kind, field::OPT_ELAPSED_TIME);
        assert_eq!(options[0].data, &[0, 5]);
        assert_eq!(options[1].kind, field::OPT_CLIENTID);
        assert_eq!(options[1].data, &[1, 2, 3]);
    }

    #[test]
    fn option_spilling_past_buffer_stops_iteration() {
        // Declares a 10-byte option but the buffer only has 2 bytes of data.
        let mut buf = vec![u8::from(MessageType::Reply), 0, 0, 1];
        buf.extend_from_slice(&field::OPT_CLIENTID.to_be_bytes());
        buf.extend_from_slice(&10u16.to_be_bytes());
        buf.extend_from_slice(&[0xaa, 0xbb]);
        let packet = Packet::new_checked(&buf[..]).unwrap();
        assert_eq!(packet.options().count(), 0);
    }

    #[test]
    fn writer_refuses_to_overrun_its_buffer() {
        let mut small = [0u8; 3];
        let mut writer = Dhcpv6OptionWriter::new(&mut small);
        let err = writer
            .emit(Dhcpv6Option { kind: field::OPT_CLIENTID, data: &[1, 2, 3] })
            .unwrap_err();
        assert_eq!(err, Error::Malformed);
    }
}
