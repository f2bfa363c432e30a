use byteorder::{ByteOrder, NetworkEndian};
use std::borrow::Cow;
use std::fmt;
use std::net::Ipv6Addr;

use super::enum_with_unknown;
use super::message::{
    field, parse_options, Dhcpv6Option, Dhcpv6OptionWriter, MessageType, Packet,
    MAX_DNS_ADDRESSES, MAX_IA_ADDRESSES, MAX_REQUEST_OPTIONS,
};
use super::{Error, Result};

enum_with_unknown! {
    pub enum StatusCode(u16) {
        Success = 0,
        UnspecFail = 1,
        NoAddrsAvail = 2,
        NoBinding = 3,
        NotOnLink = 4,
        UseMulticast = 5,
        NoPrefixAvail = 6,
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Success => write!(f, "success"),
            Self::UnspecFail => write!(f, "unspec-fail"),
            Self::NoAddrsAvail => write!(f, "no-addrs-avail"),
            Self::NoBinding => write!(f, "no-binding"),
            Self::NotOnLink => write!(f, "not-on-link"),
            Self::UseMulticast => write!(f, "use-multicast"),
            Self::NoPrefixAvail => write!(f, "no-prefix-avail"),
            Self::Unknown(a) => write!(f, "unknown({a})"),
        }
    }
}

/// `OPTION_STATUS_CODE` (RFC 8415 §21.13): a status code plus a UTF-8
/// (lossily decoded, per the RFC's "SHOULD be encoded using UTF-8") message.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ReprStatusCode<'a> {
    pub status_code: StatusCode,
    pub status_message: Cow<'a, str>,
}

impl<'a> ReprStatusCode<'a> {
    pub fn data_len(&self) -> usize {
        2 + self.status_message.as_bytes().len()
    }

    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < 2 {
            return Err(Error::Malformed);
        }
        Ok(Self {
            status_code: StatusCode::from(NetworkEndian::read_u16(data)),
            status_message: String::from_utf8_lossy(&data[2..]),
        })
    }

    pub fn emit(&self, options: &mut Dhcpv6OptionWriter<'_>) -> Result<()> {
        let mut buf = vec![0u8; self.data_len()];
        NetworkEndian::write_u16(&mut buf[0..2], self.status_code.into());
        buf[2..].copy_from_slice(self.status_message.as_bytes());
        options.emit(Dhcpv6Option {
            kind: field::OPT_STATUS_CODE,
            data: &buf,
        })
    }
}

impl<'a> fmt::Display for ReprStatusCode<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}('{}')", self.status_code, self.status_message)
    }
}

/// `OPTION_IAADDR` (RFC 8415 §21.6): one address within an `IA_NA`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ReprIaAddr<'a> {
    pub addr: Ipv6Addr,
    pub preferred_lifetime: u32,
    pub valid_lifetime: u32,
    pub additional_options: Vec<Dhcpv6Option<'a>>,
}

impl<'a> ReprIaAddr<'a> {
    pub fn data_len(&self) -> usize {
        let mut len = 16 + 4 + 4;
        for opt in &self.additional_options {
            len += 4 + opt.data.len();
        }
        len
    }

    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < 24 {
            return Err(Error::Malformed);
        }
        let addr = Ipv6Addr::from(<[u8; 16]>::try_from(&data[0..16]).unwrap());
        let preferred_lifetime = NetworkEndian::read_u32(&data[16..20]);
        let valid_lifetime = NetworkEndian::read_u32(&data[20..24]);
        let additional_options = parse_options(&data[24..]).collect();

        Ok(Self {
            addr,
            preferred_lifetime,
            valid_lifetime,
            additional_options,
        })
    }

    pub fn emit(&self, options: &mut Dhcpv6OptionWriter<'_>) -> Result<()> {
        let mut buf = vec![0u8; self.data_len()];
        buf[0..16].copy_from_slice(&self.addr.octets());
        NetworkEndian::write_u32(&mut buf[16..20], self.preferred_lifetime);
        NetworkEndian::write_u32(&mut buf[20..24], self.valid_lifetime);
        {
            let mut nested = Dhcpv6OptionWriter::new(&mut buf[24..]);
            for opt in &self.additional_options {
                nested.emit(*opt)?;
            }
        }
        options.emit(Dhcpv6Option {
            kind: field::OPT_IA_ADDR,
            data: &buf,
        })
    }
}

impl<'a> fmt::Display for ReprIaAddr<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}(preferred={} valid={})",
            self.addr, self.preferred_lifetime, self.valid_lifetime
        )
    }
}

/// `OPTION_IA_NA` (RFC 8415 §21.4): an identity association for
/// non-temporary addresses, with its nested `IAADDR`s and optional status.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ReprIaNa<'a> {
    pub iaid: u32,
    pub t1: u32,
    pub t2: u32,
    pub addresses: Vec<ReprIaAddr<'a>>,
    pub status_code: Option<ReprStatusCode<'a>>,
    pub additional_options: Vec<Dhcpv6Option<'a>>,
}

impl<'a> ReprIaNa<'a> {
    pub fn data_len(&self) -> usize {
        let mut len = 4 + 4 + 4;
        for addr in &self.addresses {
            len += 4 + addr.data_len();
        }
        if let Some(s) = &self.status_code {
            len += 4 + s.data_len();
        }
        for opt in &self.additional_options {
            len += 4 + opt.data.len();
        }
        len
    }

    /// Parses the fixed IAID/T1/T2 header unconditionally; a malformed or
    /// truncated nested `IAADDR`/`STATUS_CODE` is skipped rather than
    /// failing the whole `IA_NA` (§4.3: malformed sub-options are reported
    /// as absent, not as a hard parse error).
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        if data.len() < 12 {
            return Err(Error::Malformed);
        }
        let iaid = NetworkEndian::read_u32(&data[0..4]);
        let t1 = NetworkEndian::read_u32(&data[4..8]);
        let t2 = NetworkEndian::read_u32(&data[8..12]);

        let mut addresses = Vec::new();
        let mut status_code = None;
        let mut additional_options = Vec::new();
        for option in parse_options(&data[12..]) {
            match option.kind {
                field::OPT_IA_ADDR => match ReprIaAddr::parse(option.data) {
                    Ok(addr) => {
                        if addresses.len() < MAX_IA_ADDRESSES {
                            addresses.push(addr);
                        } else {
                            log::debug!("ignoring IAADDR past the per-IA_NA cap");
                        }
                    }
                    Err(_) => log::trace!("dropping malformed IAADDR inside IA_NA"),
                },
                field::OPT_STATUS_CODE => match ReprStatusCode::parse(option.data) {
                    Ok(s) => status_code = Some(s),
                    Err(_) => log::trace!("dropping malformed STATUS_CODE inside IA_NA"),
                },
                _ => additional_options.push(option),
            }
        }

        Ok(Self {
            iaid,
            t1,
            t2,
            addresses,
            status_code,
            additional_options,
        })
    }

    pub fn emit(&self, options: &mut Dhcpv6OptionWriter<'_>) -> Result<()> {
        let mut buf = vec![0u8; self.data_len()];
        NetworkEndian::write_u32(&mut buf[0..4], self.iaid);
        NetworkEndian::write_u32(&mut buf[4..8], self.t1);
        NetworkEndian::write_u32(&mut buf[8..12], self.t2);
        {
            let mut nested = Dhcpv6OptionWriter::new(&mut buf[12..]);
            for addr in &self.addresses {
                addr.emit(&mut nested)?;
            }
            if let Some(s) = &self.status_code {
                s.emit(&mut nested)?;
            }
            for opt in &self.additional_options {
                nested.emit(*opt)?;
            }
        }
        options.emit(Dhcpv6Option {
            kind: field::OPT_IA_NA,
            data: &buf,
        })
    }

    /// The usable address, if any: the first `IAADDR` that is not itself
    /// carrying a non-success status code.
    pub fn usable_addr(&self) -> Option<&ReprIaAddr<'a>> {
        self.addresses.first()
    }
}

impl<'a> fmt::Display for ReprIaNa<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ia-na iaid={} t1={} t2={}", self.iaid, self.t1, self.t2)?;
        for addr in &self.addresses {
            write!(f, " addr={addr}")?;
        }
        if let Some(s) = &self.status_code {
            write!(f, " status={s}")?;
        }
        Ok(())
    }
}

/// `OPTION_DNS_SERVERS` (RFC 3646): a flat list of recursive DNS server
/// addresses. `DOMAIN_LIST` and `CAPTIVE_PORTAL_URL` are passed through as
/// opaque bytes — this crate does not interpret DNS search-list
/// compression or URL contents.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ReprDnsServers {
    pub addresses: Vec<Ipv6Addr>,
}

impl ReprDnsServers {
    pub fn data_len(&self) -> usize {
        self.addresses.len() * 16
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut addresses = Vec::new();
        for chunk in data.chunks(16) {
            if chunk.len() != 16 {
                break;
            }
            if addresses.len() >= MAX_DNS_ADDRESSES {
                log::debug!("ignoring DNS server past the cap");
                break;
            }
            addresses.push(Ipv6Addr::from(<[u8; 16]>::try_from(chunk).unwrap()));
        }
        Ok(Self { addresses })
    }

    pub fn emit(&self, options: &mut Dhcpv6OptionWriter<'_>) -> Result<()> {
        let mut buf = vec![0u8; self.data_len()];
        for (i, addr) in self.addresses.iter().enumerate() {
            buf[i * 16..i * 16 + 16].copy_from_slice(&addr.octets());
        }
        options.emit(Dhcpv6Option {
            kind: field::OPT_DNS_SERVERS,
            data: &buf,
        })
    }
}

impl fmt::Display for ReprDnsServers {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "dns-servers")?;
        for addr in &self.addresses {
            write!(f, " {addr}")?;
        }
        Ok(())
    }
}

/// Parsed/emittable view of a DHCPv6 message: the subset of RFC 8415
/// options this client constructs or interprets (§4.3).
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Repr<'a> {
    pub message_type: MessageType,
    pub transaction_id: u32,
    pub client_id: Option<&'a [u8]>,
    pub server_id: Option<&'a [u8]>,
    pub elapsed_time: Option<u16>,
    pub request_options: Option<Vec<u16>>,
    pub preference: Option<u8>,
    pub rapid_commit: bool,
    pub status_code: Option<ReprStatusCode<'a>>,
    pub ia_na: Option<ReprIaNa<'a>>,
    pub dns_servers: Option<ReprDnsServers>,
    pub domain_list: Option<&'a [u8]>,
    pub captive_portal: Option<&'a [u8]>,
    /// Options this client neither constructs nor interprets, carried
    /// through unchanged when re-emitting (not used when building outbound
    /// messages from scratch).
    pub additional_options: Vec<Dhcpv6Option<'a>>,
}

impl<'a> Repr<'a> {
    pub fn new(message_type: MessageType, transaction_id: u32) -> Self {
        Self {
            message_type,
            transaction_id,
            client_id: None,
            server_id: None,
            elapsed_time: None,
            request_options: None,
            preference: None,
            rapid_commit: false,
            status_code: None,
            ia_na: None,
            dns_servers: None,
            domain_list: None,
            captive_portal: None,
            additional_options: Vec::new(),
        }
    }

    pub fn buffer_len(&self) -> usize {
        let mut len = field::OPTIONS.start;
        if let Some(id) = self.client_id {
            len += 4 + id.len();
        }
        if let Some(id) = self.server_id {
            len += 4 + id.len();
        }
        if self.elapsed_time.is_some() {
            len += 4 + 2;
        }
        if let Some(options) = &self.request_options {
            len += 4 + 2 * options.len();
        }
        if self.preference.is_some() {
            len += 4 + 1;
        }
        if self.rapid_commit {
            len += 4;
        }
        if let Some(s) = &self.status_code {
            len += 4 + s.data_len();
        }
        if let Some(ia) = &self.ia_na {
            len += 4 + ia.data_len();
        }
        if let Some(dns) = &self.dns_servers {
            len += 4 + dns.data_len();
        }
        if let Some(d) = self.domain_list {
            len += 4 + d.len();
        }
        if let Some(c) = self.captive_portal {
            len += 4 + c.len();
        }
        for opt in &self.additional_options {
            len += 4 + opt.data.len();
        }
        len
    }

    /// Parses every option this client understands; an unrecognized or
    /// malformed option is skipped rather than failing the whole message
    /// (§4.3/§7: wire errors are absorbed, never escalated).
    pub fn parse<T>(packet: &Packet<&'a T>) -> Result<Self>
    where
        T: AsRef<[u8]> + ?Sized,
    {
        let mut repr = Self::new(packet.message_type(), packet.transaction_id());

        for option in packet.options() {
            let data = option.data;
            match option.kind {
                field::OPT_CLIENTID => repr.client_id = Some(data),
                field::OPT_SERVERID => repr.server_id = Some(data),
                field::OPT_ELAPSED_TIME if data.len() == 2 => {
                    repr.elapsed_time = Some(NetworkEndian::read_u16(data));
                }
                field::OPT_PREFERENCE if data.len() == 1 => {
                    repr.preference = Some(data[0]);
                }
                field::OPT_RAPID_COMMIT => repr.rapid_commit = true,
                field::OPT_STATUS_CODE => match ReprStatusCode::parse(data) {
                    Ok(s) => repr.status_code = Some(s),
                    Err(_) => log::trace!("dropping malformed top-level STATUS_CODE"),
                },
                field::OPT_IA_NA => match ReprIaNa::parse(data) {
                    Ok(ia) => repr.ia_na = Some(ia),
                    Err(_) => log::trace!("dropping malformed IA_NA"),
                },
                field::OPT_DNS_SERVERS => match ReprDnsServers::parse(data) {
                    Ok(dns) => repr.dns_servers = Some(dns),
                    Err(_) => log::trace!("dropping malformed DNS_SERVERS"),
                },
                field::OPT_DOMAIN_LIST => repr.domain_list = Some(data),
                field::OPT_CAPTIVE_PORTAL => repr.captive_portal = Some(data),
                field::OPT_ORO => {
                    let mut options = Vec::new();
                    for chunk in data.chunks(2) {
                        if chunk.len() == 2 && options.len() < MAX_REQUEST_OPTIONS {
                            options.push(NetworkEndian::read_u16(chunk));
                        }
                    }
                    repr.request_options = Some(options);
                }
                _ => repr.additional_options.push(option),
            }
        }

        Ok(repr)
    }

    pub fn emit<T>(&self, packet: &mut Packet<&mut T>) -> Result<()>
    where
        T: AsRef<[u8]> + AsMut<[u8]> + ?Sized,
    {
        packet.set_message_type(self.message_type);
        packet.set_transaction_id(self.transaction_id);

        let mut options = packet.options_mut();

        if let Some(val) = self.client_id {
            options.emit(Dhcpv6Option {
                kind: field::OPT_CLIENTID,
                data: val,
            })?;
        }
        if let Some(val) = self.server_id {
            options.emit(Dhcpv6Option {
                kind: field::OPT_SERVERID,
                data: val,
            })?;
        }
        if let Some(val) = self.elapsed_time {
            options.emit(Dhcpv6Option {
                kind: field::OPT_ELAPSED_TIME,
                data: &val.to_be_bytes(),
            })?;
        }
        if let Some(val) = self.preference {
            options.emit(Dhcpv6Option {
                kind: field::OPT_PREFERENCE,
                data: &[val],
            })?;
        }
        if self.rapid_commit {
            options.emit(Dhcpv6Option {
                kind: field::OPT_RAPID_COMMIT,
                data: &[],
            })?;
        }
        if let Some(s) = &self.status_code {
            s.emit(&mut options)?;
        }
        if let Some(ia) = &self.ia_na {
            ia.emit(&mut options)?;
        }
        if let Some(dns) = &self.dns_servers {
            dns.emit(&mut options)?;
        }
        if let Some(d) = self.domain_list {
            options.emit(Dhcpv6Option {
                kind: field::OPT_DOMAIN_LIST,
                data: d,
            })?;
        }
        if let Some(c) = self.captive_portal {
            options.emit(Dhcpv6Option {
                kind: field::OPT_CAPTIVE_PORTAL,
                data: c,
            })?;
        }
        if let Some(request_options) = &self.request_options {
            let mut buf = vec![0u8; request_options.len() * 2];
            for (i, opt) in request_options.iter().enumerate() {
                NetworkEndian::write_u16(&mut buf[i * 2..i * 2 + 2], *opt);
            }
            options.emit(Dhcpv6Option {
                kind: field::OPT_ORO,
                data: &buf,
            })?;
        }
        for opt in &self.additional_options {
            options.emit(*opt)?;
        }

        Ok(())
    }
}

impl<'a> fmt::Display for Repr<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "DHCPv6 msg-type={} trans-id={:#x}",
            self.message_type, self.transaction_id
        )?;
        if let Some(id) = self.server_id {
            write!(f, " server-id={id:x?}")?;
        }
        if let Some(id) = self.client_id {
            write!(f, " client-id={id:x?}")?;
        }
        if let Some(ia) = &self.ia_na {
            write!(f, " {ia}")?;
        }
        if let Some(s) = &self.status_code {
            write!(f, " status={s}")?;
        }
        Ok(())
    }
}
