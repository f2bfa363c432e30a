//! DUID (DHCP Unique Identifier, RFC 8415 §11) handling.
//!
//! The crate does not allocate, persist, or choose a DUID itself — that is
//! the DUID/IAID collaborator's job (§6) — it only carries the bytes the
//! collaborator hands back and exposes the leading type tag for logging.

/// An opaque DUID. Unlike a fixed link-layer address, DUID-LLT/EN/UUID
/// variants vary in length, so this wraps an owned `Vec<u8>` rather than a
/// fixed-size array.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Duid(Vec<u8>);

/// The four DUID encodings RFC 8415 §11 and RFC 6355 define.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuidKind {
    LinkLayerPlusTime,
    EnterpriseNumber,
    LinkLayer,
    Uuid,
    Unknown(u16),
}

impl Duid {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn kind(&self) -> Option<DuidKind> {
        if self.0.len() < 2 {
            return None;
        }
        Some(match u16::from_be_bytes([self.0[0], self.0[1]]) {
            1 => DuidKind::LinkLayerPlusTime,
            2 => DuidKind::EnterpriseNumber,
            3 => DuidKind::LinkLayer,
            4 => DuidKind::Uuid,
            other => DuidKind::Unknown(other),
        })
    }
}

impl std::fmt::Display for Duid {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}
