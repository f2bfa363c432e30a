//! Coalesced notification fan-out (§4.8).
//!
//! A single coalescing slot rather than a queue: multiple posts between
//! drains collapse into the single most recent payload — the embedding
//! event loop is expected to wake once and call [`Notifier::take`] once,
//! not once per post.

/// What happened, for the service layer to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// A usable address/configuration was (re)acquired.
    Acquired,
    /// The lease or stateless configuration was refreshed in place.
    Updated,
    /// The address or configuration was given up (Unbound, stop, release).
    Lost,
    /// Acquisition is taking unusually long (Solicit try reached
    /// `GENERATE_SYMPTOM_AT_TRY`). Never coalesced — delivered synchronously
    /// from the timer callback that detects it (§9).
    Symptom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Acquired,
    Updated,
    Lost,
}

/// A single coalescing slot: only the most recent kind survives between
/// drains. Ranked so a `Lost` is never silently overwritten by `Updated` and
/// vice versa in a way that hides the more consequential change — ranking
/// matches the order an embedder would want to observe if it could only see
/// one (`Acquired`/`Lost` outrank a mere `Updated`).
#[derive(Debug, Default)]
pub struct Notifier {
    pending: Option<NotificationKind>,
}

impl Notifier {
    pub fn new() -> Self {
        Self { pending: None }
    }

    pub fn post(&mut self, kind: NotificationKind) {
        self.pending = Some(match (self.pending, kind) {
            (Some(NotificationKind::Lost), NotificationKind::Updated) => NotificationKind::Lost,
            (_, kind) => kind,
        });
    }

    /// Drains the coalesced slot, if anything is pending.
    pub fn take(&mut self) -> Option<Notification> {
        self.pending.take().map(|kind| match kind {
            NotificationKind::Acquired => Notification::Acquired,
            NotificationKind::Updated => Notification::Updated,
            NotificationKind::Lost => Notification::Lost,
        })
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coalesces_repeated_posts() {
        let mut n = Notifier::new();
        n.post(NotificationKind::Updated);
        n.post(NotificationKind::Updated);
        n.post(NotificationKind::Updated);
        assert_eq!(n.take(), Some(Notification::Updated));
        assert_eq!(n.take(), None);
    }

    #[test]
    fn lost_outranks_trailing_updated() {
        let mut n = Notifier::new();
        n.post(NotificationKind::Lost);
        n.post(NotificationKind::Updated);
        assert_eq!(n.take(), Some(Notification::Lost));
    }

    #[test]
    fn fresh_acquired_after_drain_is_not_suppressed() {
        let mut n = Notifier::new();
        n.post(NotificationKind::Lost);
        assert_eq!(n.take(), Some(Notification::Lost));
        n.post(NotificationKind::Acquired);
        assert_eq!(n.take(), Some(Notification::Acquired));
    }
}
