//! Per-client configuration supplied by the embedder at construction time.
//!
//! This is deliberately thin: file/env parsing and persistence are the
//! embedding service's job (§1 excludes "higher-level service plumbing"
//! from this crate's scope), the same split `hr-ipv6` draws between its
//! plain `Ipv6Config` struct and the separately-persisted `PdState`.

use crate::wire::MAX_REQUEST_OPTIONS;

/// RFC 3315/8415 §5.5 default IRT/MRT/MRC/MRD values for each phase, as
/// required by §6's "wire constants" table. Expressed as associated
/// constants rather than a single struct literal so each state's handler
/// can name exactly the one it needs.
pub mod defaults {
    use std::time::Duration;

    pub const SOL_MAX_DELAY: Duration = Duration::from_secs(1);
    pub const SOL_TIMEOUT: Duration = Duration::from_secs(1);
    pub const SOL_MAX_RT: Duration = Duration::from_secs(120);

    pub const REQ_TIMEOUT: Duration = Duration::from_secs(1);
    pub const REQ_MAX_RT: Duration = Duration::from_secs(30);
    pub const REQ_MAX_RC: u32 = 10;

    pub const REN_TIMEOUT: Duration = Duration::from_secs(10);
    pub const REN_MAX_RT: Duration = Duration::from_secs(600);

    pub const REB_TIMEOUT: Duration = Duration::from_secs(10);
    pub const REB_MAX_RT: Duration = Duration::from_secs(600);

    pub const CNF_MAX_DELAY: Duration = Duration::from_secs(1);
    pub const CNF_TIMEOUT: Duration = Duration::from_secs(1);
    pub const CNF_MAX_RT: Duration = Duration::from_secs(4);
    pub const CNF_MAX_RD: Duration = Duration::from_secs(10);

    pub const DEC_TIMEOUT: Duration = Duration::from_secs(1);
    pub const DEC_MAX_RC: u32 = 5;

    pub const INF_MAX_DELAY: Duration = Duration::from_secs(1);
    pub const INF_TIMEOUT: Duration = Duration::from_secs(1);
    pub const INF_MAX_RT: Duration = Duration::from_secs(120);

    /// Solicit try at which a "symptom" diagnostic notification fires (§4.1).
    pub const GENERATE_SYMPTOM_AT_TRY: u32 = 6;

    /// Minimum wake-to-renew window below which wake goes straight to Renew
    /// rather than rescheduling the existing timer (§4.6).
    pub const WAKE_SKEW_SECS: u64 = 30;

    /// Minimum T1 reschedule delay on an address-change event (§4.5).
    pub const MIN_RENEW_DELAY: Duration = Duration::from_secs(10);
}

/// Static default option-request set: DNS_SERVERS, DOMAIN_LIST,
/// CAPTIVE_PORTAL_URL (§4.3).
pub fn default_requested_options() -> Vec<u16> {
    use crate::wire::field::{OPT_CAPTIVE_PORTAL, OPT_DNS_SERVERS, OPT_DOMAIN_LIST};
    vec![OPT_DNS_SERVERS, OPT_DOMAIN_LIST, OPT_CAPTIVE_PORTAL]
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Options requested via ORO, in addition to the static default set.
    pub requested_options: Vec<u16>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            requested_options: default_requested_options(),
        }
    }
}

impl ClientConfig {
    pub fn set_requested_options(&mut self, options: &[u16]) {
        let mut merged = default_requested_options();
        for &opt in options {
            if !merged.contains(&opt) && merged.len() < MAX_REQUEST_OPTIONS {
                merged.push(opt);
            }
        }
        self.requested_options = merged;
    }
}
