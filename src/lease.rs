//! The currently held `IA_NA` binding (§3, §4.4): server identifier,
//! address, T1/T2, preferred/valid lifetimes, absolute start time, and the
//! SSID the lease was obtained on.

use std::time::{Duration, Instant};

/// Sentinel meaning "never expires" (RFC 8415's 0xffffffff lifetime value).
pub const INFINITE: u32 = 0xffff_ffff;

#[derive(Debug, Clone)]
pub struct Lease {
    pub valid: bool,
    pub start: Instant,
    pub t1: u32,
    pub t2: u32,
    pub preferred_lifetime: u32,
    pub valid_lifetime: u32,
    /// SSID in effect when this lease was obtained; empty on wired links.
    pub ssid: Option<String>,
}

impl Lease {
    /// Builds a lease from a freshly saved `IA_NA`, applying the §4.4
    /// normalization steps in order.
    pub fn new(
        start: Instant,
        t1: u32,
        t2: u32,
        preferred_lifetime: u32,
        valid_lifetime: u32,
        ssid: Option<String>,
    ) -> Self {
        let mut preferred_lifetime = preferred_lifetime;
        let mut valid_lifetime = valid_lifetime;
        let mut t1 = t1;
        let mut t2 = t2;

        // 1. preferred_lifetime == 0 borrows valid_lifetime.
        if preferred_lifetime == 0 {
            preferred_lifetime = valid_lifetime;
        }

        // 2. missing T1/T2 are derived from preferred_lifetime, unless it's
        //    infinite (then no renewal is ever needed).
        if t1 == 0 || t2 == 0 {
            if preferred_lifetime == INFINITE {
                t1 = 0;
                t2 = 0;
            } else {
                t1 = (preferred_lifetime as f64 * 0.5) as u32;
                t2 = (preferred_lifetime as f64 * 0.8) as u32;
            }
        }

        // 3. an infinite T1/T2 makes no sense; treat the whole lease as
        //    infinite instead.
        if t1 == INFINITE || t2 == INFINITE {
            t1 = 0;
            t2 = 0;
            preferred_lifetime = INFINITE;
            valid_lifetime = INFINITE;
        }

        // 4. an infinite valid_lifetime never needs renewal either.
        if valid_lifetime == INFINITE {
            t1 = 0;
            t2 = 0;
        }

        Self {
            valid: true,
            start,
            t1,
            t2,
            preferred_lifetime,
            valid_lifetime,
            ssid,
        }
    }

    /// §4.4: valid iff the flag is set and, unless the valid lifetime is
    /// infinite, `now` falls within `[start, start + valid_lifetime)`. A
    /// `now` earlier than `start` (wall clock went backwards) is invalid.
    pub fn still_valid(&self, now: Instant) -> bool {
        if !self.valid {
            return false;
        }
        if self.valid_lifetime == INFINITE {
            return true;
        }
        if now < self.start {
            return false;
        }
        now - self.start < Duration::from_secs(self.valid_lifetime as u64)
    }

    pub fn t1_deadline(&self) -> Option<Instant> {
        (self.valid_lifetime != INFINITE || self.t1 != 0)
            .then(|| self.start + Duration::from_secs(self.t1 as u64))
    }

    pub fn t2_deadline(&self) -> Option<Instant> {
        (self.valid_lifetime != INFINITE || self.t2 != 0)
            .then(|| self.start + Duration::from_secs(self.t2 as u64))
    }

    pub fn expiry(&self) -> Option<Instant> {
        (self.valid_lifetime != INFINITE)
            .then(|| self.start + Duration::from_secs(self.valid_lifetime as u64))
    }

    pub fn invalidate(&mut self) {
        self.valid = false;
    }
}
