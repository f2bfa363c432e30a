//! Randomized exponential backoff matching RFC 3315/8415 §14.
//!
//! Given an initial retransmission time `IRT` and a ceiling `MRT`, produces
//! `RT_1 = IRT * (1 + U(-0.1, 0.1))`, `RT_k = 2*RT_{k-1} + U(-0.1,0.1)*RT_{k-1}`,
//! clamped to `MRT * (1 + U(-0.1, 0.1))` once the unclamped value would
//! exceed `MRT` (MRT == 0 means unbounded). The entropy source is passed in
//! rather than owned, so the whole client shares one CSPRNG-seeded
//! generator instead of each backoff owning its own.

use std::time::Duration;

use rand::Rng;

/// One running retransmission sequence for a single phase (a Solicit
/// attempt, a Renew attempt, etc).
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    irt: Duration,
    mrt: Duration,
    mrc: u32,
    mrd: Duration,
    rt: Option<Duration>,
    try_count: u32,
}

impl Backoff {
    /// `mrt` or `mrd` of `Duration::ZERO` means "no ceiling" for that
    /// dimension, matching RFC 8415's "MRT value of 0 means there is no
    /// upper limit" convention (likewise for MRC, MRD).
    pub fn new(irt: Duration, mrt: Duration, mrc: u32, mrd: Duration) -> Self {
        Self {
            irt,
            mrt,
            mrc,
            mrd,
            rt: None,
            try_count: 0,
        }
    }

    /// Number of transmissions made so far in this phase (1 after the
    /// first call to [`next`](Self::next)).
    pub fn try_count(&self) -> u32 {
        self.try_count
    }

    /// Whether the retry-count ceiling (MRC) has been reached. Does not
    /// consider MRD; callers bounding by elapsed time check that
    /// separately against their own phase-start timestamp.
    pub fn mrc_exhausted(&self) -> bool {
        self.mrc != 0 && self.try_count >= self.mrc
    }

    /// Advances the sequence and returns the next retransmission timeout.
    pub fn next<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Duration {
        self.try_count += 1;

        let next = match self.rt {
            None => jitter(rng, self.irt, -0.1, 0.1),
            Some(prev) => {
                // RT_k = 2*RT_{k-1} + U(-0.1, 0.1)*RT_{k-1}: the jitter term is
                // a fraction of the *un-doubled* previous value, not of the
                // doubled one, per RFC 3315/8415 §14.
                let doubled = prev.saturating_add(prev);
                let factor = rng.gen_range(-0.1..=0.1f64);
                let offset = prev.mul_f64(factor.abs());
                if factor >= 0.0 {
                    doubled + offset
                } else {
                    doubled.saturating_sub(offset)
                }
            }
        };

        let next = if self.mrt != Duration::ZERO && next > self.mrt {
            jitter(rng, self.mrt, -0.1, 0.1)
        } else {
            next
        };

        self.rt = Some(next);
        next
    }

    pub fn mrd(&self) -> Duration {
        self.mrd
    }
}

fn jitter<R: Rng + ?Sized>(rng: &mut R, base: Duration, lo: f64, hi: f64) -> Duration {
    let factor = 1.0 + rng.gen_range(lo..=hi);
    base.mul_f64(factor.max(0.0))
}

/// Samples a fresh 24-bit DHCPv6 transaction id from a CSPRNG-seeded source.
pub fn random_transaction_id<R: Rng + ?Sized>(rng: &mut R) -> u32 {
    rng.gen_range(0..=0x00ff_ffffu32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn first_interval_is_near_irt() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(120), 0, Duration::ZERO);
        for _ in 0..200 {
            let mut backoff = backoff;
            let rt1 = backoff.next(&mut rng);
            let lo = Duration::from_secs_f64(0.9);
            let hi = Duration::from_secs_f64(1.1);
            assert!(rt1 >= lo && rt1 <= hi, "rt1={rt1:?}");
        }
        let _ = backoff.next(&mut rng);
    }

    #[test]
    fn sequence_stays_within_jitter_of_double() {
        let mut rng = StdRng::seed_from_u64(2);
        for seed in 0..500 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut backoff = Backoff::new(Duration::from_secs(1), Duration::ZERO, 0, Duration::ZERO);
            let mut prev = backoff.next(&mut rng);
            for _ in 0..5 {
                let rt = backoff.next(&mut rng);
                let expected = prev.mul_f64(2.0);
                let allowed = prev.mul_f64(0.1);
                let diff = if rt > expected { rt - expected } else { expected - rt };
                assert!(diff <= allowed + Duration::from_micros(1), "rt={rt:?} expected~{expected:?}");
                prev = rt;
            }
        }
        let _ = rng.gen::<u32>();
    }

    #[test]
    fn clamps_to_mrt() {
        let mut rng = StdRng::seed_from_u64(3);
        let mrt = Duration::from_secs(10);
        let mut backoff = Backoff::new(Duration::from_secs(1), mrt, 0, Duration::ZERO);
        let mut last = Duration::ZERO;
        for _ in 0..20 {
            last = backoff.next(&mut rng);
        }
        assert!(last <= mrt.mul_f64(1.1) + Duration::from_millis(1));
    }

    #[test]
    fn mrc_exhausts() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30), 3, Duration::ZERO);
        assert!(!backoff.mrc_exhausted());
        backoff.next(&mut rng);
        backoff.next(&mut rng);
        assert!(!backoff.mrc_exhausted());
        backoff.next(&mut rng);
        assert!(backoff.mrc_exhausted());
    }

    #[test]
    fn transaction_ids_fit_24_bits() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..1000 {
            assert!(random_transaction_id(&mut rng) <= 0x00ff_ffff);
        }
    }
}
