//! The twelve-state DHCPv6 client state machine (§4.1).
//!
//! One `on_enter`/`on_timer`/`on_message` triple per state, per the
//! rearchitecture in §9: the common entry discipline (cancel the single
//! timer, reset `try`, regenerate the transaction id, install the state's
//! receive handler) lives in [`Client::enter`], and the "fall through from
//! start to timeout" the original C gives some states becomes an explicit
//! call from `enter` into that state's `on_timer` when the state has no
//! initial delay of its own.
//!
//! Wire and collaborator errors never propagate out of here (§7); they are
//! logged and the state machine proceeds exactly as specified.

use std::net::Ipv6Addr;
use std::time::{Duration, Instant};

use rand::rngs::ThreadRng;
use rand::Rng;

use crate::collab::{AddressDadState, AddressFlags, AddressTable, DuidSource, Interface, LinkLayerType, Socket, ServiceHost};
use crate::config::{defaults, ClientConfig};
use crate::duid::Duid;
use crate::error::{ClientError, Result as ClientResult};
use crate::lease::Lease;
use crate::notify::{Notification, NotificationKind, Notifier};
use crate::retransmit::{random_transaction_id, Backoff};
use crate::wire::{self, MessageType, Packet, Repr, StatusCode};

/// §3: `mode ∈ {Idle, Stateless, Stateful}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Stateless,
    Stateful,
}

/// §4.1's twelve states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateId {
    Inactive,
    Solicit,
    Request,
    Bound,
    Renew,
    Rebind,
    Confirm,
    Release,
    Unbound,
    Decline,
    Inform,
    InformComplete,
}

/// External interface/service events delivered via [`Client::handle_event`]
/// (§4.5, §4.6, §6). A no-op in every mode but `Stateful` except where noted.
#[derive(Debug, Clone)]
pub enum Event {
    LinkStatusChanged,
    AddressChanged(Vec<(Ipv6Addr, AddressDadState)>),
    Wake,
    BssidChanged,
    /// Embedder-triggered renewal (e.g. a UI "renew now" action).
    Renew,
}

/// A server's ADVERTISE candidate, tracked during Solicit (§4.1).
struct Candidate {
    raw: Vec<u8>,
    preference: u8,
}

/// Per-interface DHCPv6 client. Generic over the collaborator seams in §6
/// rather than boxed trait objects, so an embedder monomorphizes once per
/// concrete stack.
pub struct Client<S, I, D, A, H> {
    socket: S,
    interface: I,
    duid_source: D,
    address_table: A,
    service: H,

    config: ClientConfig,
    rng: ThreadRng,

    mode: Mode,
    state: StateId,
    transaction_id: u32,
    try_count: u32,
    backoff: Option<Backoff>,
    phase_start: Instant,
    next_fire: Option<Instant>,

    client_id: Option<Duid>,
    iaid: u32,

    /// Raw bytes of the saved REPLY/ADVERTISE, re-parsed lazily rather than
    /// retaining borrowed sub-references into it (§9: never keep a view
    /// that can outlive its backing buffer).
    saved: Option<Vec<u8>>,
    saved_verified: bool,

    candidate: Option<Candidate>,

    assigned_address: Option<(Ipv6Addr, u8)>,
    lease: Option<Lease>,
    private_address: bool,

    last_renew_scheduled_at: Option<Instant>,

    notifier: Notifier,
    scratch: Vec<u8>,
}

impl<S, I, D, A, H> Client<S, I, D, A, H>
where
    S: Socket,
    I: Interface,
    D: DuidSource,
    A: AddressTable,
    H: ServiceHost,
{
    pub fn new(socket: S, interface: I, duid_source: D, address_table: A, service: H) -> Self {
        Self::with_config(socket, interface, duid_source, address_table, service, ClientConfig::default())
    }

    pub fn with_config(
        socket: S,
        interface: I,
        duid_source: D,
        address_table: A,
        service: H,
        config: ClientConfig,
    ) -> Self {
        Self {
            socket,
            interface,
            duid_source,
            address_table,
            service,
            config,
            rng: rand::thread_rng(),
            mode: Mode::Idle,
            state: StateId::Inactive,
            transaction_id: 0,
            try_count: 0,
            backoff: None,
            phase_start: Instant::now(),
            next_fire: None,
            client_id: None,
            iaid: 0,
            saved: None,
            saved_verified: false,
            candidate: None,
            assigned_address: None,
            lease: None,
            private_address: false,
            last_renew_scheduled_at: None,
            notifier: Notifier::new(),
            scratch: vec![0u8; 1500],
        }
    }

    pub fn set_requested_options(&mut self, options: &[u16]) {
        self.config.set_requested_options(options);
    }

    pub fn state(&self) -> StateId {
        self.state
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// §6: `get_info()` — the saved packet's raw bytes and parsed view, iff
    /// `saved_verified`. Re-parses lazily each call rather than caching a
    /// borrowed `Repr` alongside the bytes.
    pub fn get_info(&self) -> Option<(&[u8], Repr<'_>)> {
        if !self.saved_verified {
            return None;
        }
        let raw = self.saved.as_deref()?;
        let packet = Packet::new_checked(raw).ok()?;
        let repr = Repr::parse(&packet).ok()?;
        Some((raw, repr))
    }

    pub fn copy_addresses(&self) -> Option<(Ipv6Addr, u8)> {
        self.assigned_address
    }

    /// Drains the coalesced notification, if any (§4.8).
    pub fn poll_notification(&mut self) -> Option<Notification> {
        self.notifier.take()
    }

    /// §6: `start(allocate_address, privacy_required)`.
    pub fn start(&mut self, now: Instant, allocate_address: bool, privacy_required: bool) -> ClientResult<()> {
        if self.mode != Mode::Idle {
            return Err(ClientError::AlreadyStarted);
        }

        self.private_address = privacy_required;
        self.client_id = Some(if privacy_required {
            self.duid_source.copy_random(self.interface.name())
        } else {
            self.duid_source.establish_and_get()
        });
        self.iaid = self.duid_source.allocate_iaid(self.interface.name());

        if allocate_address {
            self.mode = Mode::Stateful;
            let same_network = self.lease.as_ref().map_or(false, |l| self.same_network(l));
            if same_network && self.lease.as_ref().is_some_and(|l| l.still_valid(now)) {
                self.enter(now, StateId::Confirm);
            } else {
                self.enter(now, StateId::Solicit);
            }
        } else {
            self.mode = Mode::Stateless;
            self.enter(now, StateId::Inform);
        }
        Ok(())
    }

    /// §6: `stop(discard_information)` — leaves Inactive. Idempotent:
    /// calling it twice is a no-op (§8).
    pub fn stop(&mut self, now: Instant, discard_information: bool) {
        if self.mode == Mode::Idle {
            return;
        }
        self.mode = Mode::Idle;
        if discard_information {
            self.lease = None;
            self.assigned_address = None;
        }
        self.enter(now, StateId::Inactive);
    }

    /// §6: `release()` — best-effort RELEASE if a still-valid lease exists,
    /// then Inactive (§3 lifecycle: "a released client with a still-valid
    /// lease first sends a best-effort RELEASE").
    pub fn release(&mut self, now: Instant) {
        if self.mode == Mode::Stateful && self.lease.as_ref().is_some_and(|l| l.still_valid(now)) {
            self.enter(now, StateId::Release);
        }
        self.mode = Mode::Idle;
        self.lease = None;
        self.assigned_address = None;
        self.enter(now, StateId::Inactive);
    }

    /// The next absolute time the embedder must call [`Client::poll_timer`].
    pub fn next_poll_at(&self) -> Option<Instant> {
        self.next_fire
    }

    /// Fires the single outstanding timer if due. A no-op otherwise.
    pub fn poll_timer(&mut self, now: Instant) {
        let Some(fire_at) = self.next_fire else { return };
        if now < fire_at {
            return;
        }
        self.next_fire = None;
        self.on_timer(now);
    }

    /// Parses and dispatches an inbound datagram. Parse failures are
    /// silently dropped (§7 class 1).
    pub fn handle_message(&mut self, now: Instant, data: &[u8]) {
        let packet = match Packet::new_checked(data) {
            Ok(p) => p,
            Err(e) => {
                log::trace!("dropping truncated DHCPv6 packet: {e}");
                return;
            }
        };
        let mut repr = match Repr::parse(&packet) {
            Ok(r) => r,
            Err(e) => {
                log::trace!("dropping unparseable DHCPv6 packet: {e}");
                return;
            }
        };
        self.screen_options(&mut repr);
        if !self.duid_echoes_ours(&repr) {
            return;
        }
        self.on_message(now, data, &repr);
    }

    pub fn handle_event(&mut self, now: Instant, event: Event) {
        if self.mode != Mode::Stateful {
            return;
        }
        match event {
            Event::LinkStatusChanged => self.handle_link_status_changed(now),
            Event::AddressChanged(addrs) => self.handle_address_changed(now, &addrs),
            Event::Wake => self.handle_wake(now),
            Event::BssidChanged => {
                if !matches!(self.state, StateId::Bound | StateId::Renew | StateId::Rebind) {
                    return;
                }
                self.enter(now, StateId::Confirm);
            }
            Event::Renew => {
                if matches!(self.state, StateId::Bound) {
                    self.enter(now, StateId::Renew);
                }
            }
        }
    }

    // ---- option screening (§4.3) ----

    /// Drops top-level options this client never asked for and that aren't
    /// always-permitted (`DHCPv6ClientOptionIsOK`), before the message is
    /// matched or handed to a state handler.
    fn screen_options(&self, repr: &mut Repr<'_>) {
        let requested = &self.config.requested_options;
        repr.additional_options.retain(|opt| {
            let ok = crate::wire::option_is_ok(opt.kind, requested);
            if !ok {
                log::trace!("ignoring unrequested DHCPv6 option {}", opt.kind);
            }
            ok
        });
    }

    // ---- message matching (§4.1) ----

    fn duid_echoes_ours(&self, repr: &Repr<'_>) -> bool {
        match (&self.client_id, repr.client_id) {
            (Some(ours), Some(theirs)) => ours.as_bytes() == theirs,
            _ => false,
        }
    }

    fn matches_phase(&self, repr: &Repr<'_>, expected: MessageType) -> bool {
        repr.message_type == expected
            && repr.transaction_id == self.transaction_id
            && self.duid_echoes_ours(repr)
            && repr.server_id.is_some_and(|id| !id.is_empty())
    }

    // ---- elapsed time (§4.1) ----

    fn elapsed_time_option(&self, now: Instant) -> u16 {
        if self.try_count <= 1 {
            return 0;
        }
        let hundredths = now.saturating_duration_since(self.phase_start).as_millis() / 10;
        hundredths.min(0xffff) as u16
    }

    // ---- entry discipline (§4.1, §5) ----

    fn enter(&mut self, now: Instant, state: StateId) {
        self.next_fire = None;
        self.state = state;
        self.try_count = 0;
        self.backoff = None;
        self.phase_start = now;
        self.transaction_id = random_transaction_id(&mut self.rng);

        match state {
            StateId::Inactive => {
                self.saved = None;
                self.saved_verified = false;
            }
            StateId::Solicit => {
                self.candidate = None;
                let delay = self.random_delay(defaults::SOL_MAX_DELAY);
                self.next_fire = Some(now + delay);
            }
            StateId::Request => {
                self.on_timer_request(now);
            }
            StateId::Bound => {
                self.on_enter_bound(now);
            }
            StateId::Renew => {
                self.on_timer_renew(now);
            }
            StateId::Rebind => {
                self.on_timer_rebind(now);
            }
            StateId::Confirm => {
                let delay = self.random_delay(defaults::CNF_MAX_DELAY);
                self.next_fire = Some(now + delay);
            }
            StateId::Release => {
                self.on_timer_release(now);
            }
            StateId::Unbound => {
                self.on_enter_unbound(now);
            }
            StateId::Decline => {
                self.on_timer_decline(now);
            }
            StateId::Inform => {
                let delay = if self.interface.link_layer_type() == LinkLayerType::Cellular {
                    Duration::ZERO
                } else {
                    self.random_delay(defaults::INF_MAX_DELAY)
                };
                self.next_fire = Some(now + delay);
            }
            StateId::InformComplete => {
                // Terminal; no timer.
            }
        }
    }

    fn random_delay(&mut self, max: Duration) -> Duration {
        if max == Duration::ZERO {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.rng.gen_range(0.0..=max.as_secs_f64()))
    }

    fn on_timer(&mut self, now: Instant) {
        match self.state {
            StateId::Inactive | StateId::InformComplete => {}
            StateId::Solicit => self.on_timer_solicit(now),
            StateId::Request => self.on_timer_request(now),
            StateId::Bound => self.on_timer_bound(now),
            StateId::Renew => self.on_timer_renew(now),
            StateId::Rebind => self.on_timer_rebind(now),
            StateId::Confirm => self.on_timer_confirm(now),
            StateId::Release => {}
            StateId::Unbound => self.on_enter_unbound(now),
            StateId::Decline => self.on_timer_decline(now),
            StateId::Inform => self.on_timer_inform(now),
        }
    }

    fn on_message(&mut self, now: Instant, raw: &[u8], repr: &Repr<'_>) {
        match self.state {
            StateId::Solicit => self.on_message_solicit(now, raw, repr),
            StateId::Request => self.on_message_request(now, raw, repr),
            StateId::Renew => self.on_message_renew_rebind(now, raw, repr, MessageType::Renew),
            StateId::Rebind => self.on_message_renew_rebind(now, raw, repr, MessageType::Rebind),
            StateId::Confirm => self.on_message_confirm(now, raw, repr),
            StateId::Decline => self.on_message_decline(now, repr),
            StateId::Inform => self.on_message_inform(now, raw, repr),
            _ => {}
        }
    }

    // ---- transmission ----

    fn send(&mut self, repr: &Repr<'_>) {
        let len = repr.buffer_len();
        if len > self.scratch.len() {
            log::warn!("DHCPv6 message of {len} bytes exceeds the 1500-byte scratch buffer");
            return;
        }
        let buf = &mut self.scratch[..len];
        let mut packet = Packet::new_unchecked(&mut *buf);
        if let Err(e) = repr.emit(&mut packet) {
            log::warn!("failed to encode outbound DHCPv6 message: {e}");
            return;
        }
        match self.socket.transmit(buf) {
            Ok(()) => {}
            Err(e) if is_interface_down(&e) => {
                log::trace!("transmit skipped, interface down: {e}");
            }
            Err(e) => log::warn!("DHCPv6 transmit failed: {e}"),
        }
    }

    // ---- Solicit (§4.1) ----

    fn on_timer_solicit(&mut self, now: Instant) {
        if !self.interface.link_status().valid {
            self.enter(now, StateId::Inactive);
            return;
        }
        if self.candidate.is_some() {
            self.enter(now, StateId::Request);
            return;
        }

        let backoff = self
            .backoff
            .get_or_insert_with(|| Backoff::new(defaults::SOL_TIMEOUT, defaults::SOL_MAX_RT, 0, Duration::ZERO));
        let timeout = backoff.next(&mut self.rng);
        self.try_count = backoff.try_count();

        let client_id_bytes = self.client_id.as_ref().map(|d| d.as_bytes().to_vec());
        let iaid = self.iaid;
        let elapsed = self.elapsed_time_option(now);
        let requested = self.config.requested_options.clone();

        let mut repr = Repr::new(MessageType::Solicit, self.transaction_id);
        repr.client_id = client_id_bytes.as_deref();
        repr.elapsed_time = Some(elapsed);
        repr.request_options = Some(requested);
        repr.ia_na = Some(wire::ReprIaNa {
            iaid,
            t1: 0,
            t2: 0,
            addresses: Vec::new(),
            status_code: None,
            additional_options: Vec::new(),
        });
        self.send(&repr);

        if self.try_count >= defaults::GENERATE_SYMPTOM_AT_TRY {
            // Synchronous, uncoalesced: reached only from this timer (§9).
            self.service.notify(Notification::Symptom);
        }

        self.next_fire = Some(now + timeout);
    }

    fn on_message_solicit(&mut self, now: Instant, raw: &[u8], repr: &Repr<'_>) {
        if !self.matches_phase(repr, MessageType::Advertise) {
            return;
        }
        if repr.status_code.as_ref().is_some_and(|s| s.status_code == StatusCode::NoAddrsAvail) {
            return;
        }
        let Some(ia_na) = repr.ia_na.as_ref() else { return };
        if ia_na.usable_addr().is_none() {
            return;
        }
        let preference = repr.preference.unwrap_or(0);

        let replace = self.candidate.as_ref().map_or(true, |c| preference > c.preference);
        if replace {
            self.candidate = Some(Candidate {
                raw: raw.to_vec(),
                preference,
            });
        }

        if self.try_count <= 1 || preference == 255 {
            self.enter(now, StateId::Request);
        }
    }

    // ---- Request (§4.1) ----

    fn on_timer_request(&mut self, now: Instant) {
        let Some(candidate) = self.candidate.as_ref() else {
            // No saved ADVERTISE to request against; fall back to Solicit.
            self.enter(now, StateId::Solicit);
            return;
        };
        let packet = match Packet::new_checked(candidate.raw.as_slice()) {
            Ok(p) => p,
            Err(_) => {
                self.enter(now, StateId::Solicit);
                return;
            }
        };
        let advertise = match Repr::parse(&packet) {
            Ok(r) => r,
            Err(_) => {
                self.enter(now, StateId::Solicit);
                return;
            }
        };
        let Some(server_id) = advertise.server_id.map(|s| s.to_vec()) else {
            self.enter(now, StateId::Solicit);
            return;
        };
        let Some(chosen_addr) = advertise.ia_na.as_ref().and_then(|ia| ia.usable_addr()).map(|a| a.addr) else {
            self.enter(now, StateId::Solicit);
            return;
        };

        let backoff = self
            .backoff
            .get_or_insert_with(|| Backoff::new(defaults::REQ_TIMEOUT, defaults::REQ_MAX_RT, defaults::REQ_MAX_RC, Duration::ZERO));
        if backoff.mrc_exhausted() {
            self.enter(now, StateId::Solicit);
            return;
        }
        let timeout = backoff.next(&mut self.rng);
        self.try_count = backoff.try_count();

        let client_id = self.client_id.as_ref().map(|d| d.as_bytes().to_vec());
        let elapsed = self.elapsed_time_option(now);
        let iaid = self.iaid;
        let requested = self.config.requested_options.clone();

        let mut repr = Repr::new(MessageType::Request, self.transaction_id);
        repr.client_id = client_id.as_deref();
        repr.server_id = Some(&server_id);
        repr.elapsed_time = Some(elapsed);
        repr.request_options = Some(requested);
        repr.ia_na = Some(wire::ReprIaNa {
            iaid,
            t1: 0,
            t2: 0,
            addresses: vec![wire::ReprIaAddr {
                addr: chosen_addr,
                preferred_lifetime: 0,
                valid_lifetime: 0,
                additional_options: Vec::new(),
            }],
            status_code: None,
            additional_options: Vec::new(),
        });
        self.send(&repr);

        self.next_fire = Some(now + timeout);
    }

    fn on_message_request(&mut self, now: Instant, raw: &[u8], repr: &Repr<'_>) {
        if !self.matches_phase(repr, MessageType::Reply) {
            return;
        }

        // §9 Open Question: preserve this exact precedence — top-level
        // NoAddrsAvail aborts (drop), IA_NA-level NotOnLink restarts
        // Solicit, IA_NA-level NoAddrsAvail falls through as "no usable
        // binding".
        if repr.status_code.as_ref().is_some_and(|s| s.status_code == StatusCode::NoAddrsAvail) {
            return;
        }

        let ia_status = repr.ia_na.as_ref().and_then(|ia| ia.status_code.as_ref()).map(|s| s.status_code);
        if ia_status == Some(StatusCode::NotOnLink) {
            self.enter(now, StateId::Solicit);
            return;
        }

        let has_usable_binding = repr.ia_na.as_ref().is_some_and(|ia| ia.usable_addr().is_some());
        if !has_usable_binding {
            // "no usable binding": neither an error nor a transition, stay
            // and let retransmission continue.
            return;
        }

        self.save_packet(raw);
        self.enter(now, StateId::Bound);
    }

    // ---- Bound (§4.1, §4.4) ----

    fn on_enter_bound(&mut self, now: Instant) {
        // Pull only owned/Copy scalars out of the re-parsed saved packet:
        // holding onto a borrowed `ReprIaNa`/`ReprIaAddr` here would keep
        // `self` borrowed across the `&mut self` calls below.
        let extracted = self.saved_ia_na().and_then(|(_, ia)| {
            let addr = ia.usable_addr()?;
            Some((ia.t1, ia.t2, addr.addr, addr.preferred_lifetime, addr.valid_lifetime))
        });
        let Some((t1, t2, addr, preferred_lifetime, valid_lifetime)) = extracted else {
            self.enter(now, StateId::Unbound);
            return;
        };

        let ssid = self.interface.is_wireless().then(|| self.service.get_ssid()).flatten();
        let lease = Lease::new(now, t1, t2, preferred_lifetime, valid_lifetime, ssid);
        let prefix_len = 128u8;

        let is_refresh = self.assigned_address.is_some_and(|(existing, _)| existing == addr);
        if !is_refresh {
            if let Some((old_addr, _)) = self.assigned_address.take() {
                if let Err(e) = self.address_table.remove_address(self.interface.name(), old_addr) {
                    log::warn!("failed to remove previous DHCPv6 address: {e}");
                }
            }
            if let Err(e) = self.address_table.add_address(
                self.interface.name(),
                addr,
                prefix_len,
                AddressFlags::DYNAMIC,
                valid_lifetime,
                preferred_lifetime,
            ) {
                log::warn!("failed to add DHCPv6 address: {e}");
            }
        }

        self.assigned_address = Some((addr, prefix_len));
        self.lease = Some(lease);
        self.saved_verified = true;

        // The `Interface` collaborator can't tell us whether the address is
        // still tentative, so schedule the T1 renewal immediately on entry
        // (§4.4: "once it is verified ... schedule a timer at T1"). If DAD
        // is still running, a later AddressChanged(Duplicated) reports a
        // collision via `handle_address_changed`; AddressChanged(Usable)
        // reschedules this same timer with a fresher elapsed baseline, and
        // AddressChanged(Tentative) leaves it untouched.
        self.notifier.post(NotificationKind::Acquired);
        self.schedule_renew_timer(now);
    }

    fn on_timer_bound(&mut self, now: Instant) {
        // Bound has no retransmission of its own; its only timer is the T1
        // renewal scheduled by the address-change handler or on_enter.
        self.enter(now, StateId::Renew);
    }

    fn schedule_renew_timer(&mut self, now: Instant) {
        let Some(lease) = &self.lease else { return };
        if lease.valid_lifetime == crate::lease::INFINITE {
            self.next_fire = None;
            return;
        }
        let t1_at = lease.t1_deadline().unwrap_or(now);
        let min_delay = now + defaults::MIN_RENEW_DELAY;
        let fire_at = if t1_at > now { t1_at } else { min_delay };
        self.next_fire = Some(fire_at);
        self.last_renew_scheduled_at = Some(fire_at);
    }

    // ---- Renew / Rebind (§4.1) ----

    fn on_timer_renew(&mut self, now: Instant) {
        self.retransmit_renew_like(now, MessageType::Renew, true);
    }

    fn on_timer_rebind(&mut self, now: Instant) {
        self.retransmit_renew_like(now, MessageType::Rebind, false);
    }

    fn retransmit_renew_like(&mut self, now: Instant, message_type: MessageType, include_server_id: bool) {
        let Some(lease) = self.lease.clone() else {
            self.enter(now, StateId::Unbound);
            return;
        };
        let t2_at = lease.t2_deadline();
        if message_type == MessageType::Renew {
            if let Some(t2) = t2_at {
                if now >= t2 {
                    self.enter(now, StateId::Rebind);
                    return;
                }
            }
        } else if let Some(expiry) = lease.expiry() {
            if now >= expiry {
                self.enter(now, StateId::Unbound);
                return;
            }
        }

        let (irt, mrt) = if message_type == MessageType::Renew {
            (defaults::REN_TIMEOUT, defaults::REN_MAX_RT)
        } else {
            (defaults::REB_TIMEOUT, defaults::REB_MAX_RT)
        };
        let backoff = self.backoff.get_or_insert_with(|| Backoff::new(irt, mrt, 0, Duration::ZERO));
        let mut timeout = backoff.next(&mut self.rng);
        self.try_count = backoff.try_count();

        // Clamp so the next attempt does not overrun T2 (Renew) or expiry
        // (Rebind) (§4.1).
        let ceiling = if message_type == MessageType::Renew { t2_at } else { lease.expiry() };
        if let Some(ceiling) = ceiling {
            if now + timeout > ceiling {
                timeout = ceiling.saturating_duration_since(now);
            }
        }

        let Some((addr, _)) = self.assigned_address else {
            self.enter(now, StateId::Unbound);
            return;
        };
        let client_id = self.client_id.as_ref().map(|d| d.as_bytes().to_vec());
        let server_id = self.saved_server_id();
        let elapsed = self.elapsed_time_option(now);
        let iaid = self.iaid;
        let requested = self.config.requested_options.clone();

        let mut repr = Repr::new(message_type, self.transaction_id);
        repr.client_id = client_id.as_deref();
        if include_server_id {
            repr.server_id = server_id.as_deref();
        }
        repr.elapsed_time = Some(elapsed);
        repr.request_options = Some(requested);
        repr.ia_na = Some(wire::ReprIaNa {
            iaid,
            t1: lease.t1,
            t2: lease.t2,
            addresses: vec![wire::ReprIaAddr {
                addr,
                preferred_lifetime: lease.preferred_lifetime,
                valid_lifetime: lease.valid_lifetime,
                additional_options: Vec::new(),
            }],
            status_code: None,
            additional_options: Vec::new(),
        });
        self.send(&repr);

        self.next_fire = Some(now + timeout);
    }

    fn on_message_renew_rebind(&mut self, now: Instant, raw: &[u8], repr: &Repr<'_>, expected: MessageType) {
        let _ = expected;
        if repr.message_type != MessageType::Reply
            || repr.transaction_id != self.transaction_id
            || !self.duid_echoes_ours(repr)
        {
            return;
        }
        let success = repr.status_code.as_ref().map_or(true, |s| s.status_code == StatusCode::Success);
        let has_usable = repr.ia_na.as_ref().is_some_and(|ia| ia.usable_addr().is_some());
        let lease_expired = !self.lease.as_ref().is_some_and(|l| l.still_valid(now));

        if success && has_usable && !lease_expired {
            self.save_packet(raw);
            self.enter(now, StateId::Bound);
        } else {
            self.enter(now, StateId::Unbound);
        }
    }

    // ---- Confirm (§4.1) ----

    fn on_timer_confirm(&mut self, now: Instant) {
        if now.saturating_duration_since(self.phase_start) >= defaults::CNF_MAX_RD {
            if self.lease.as_ref().is_some_and(|l| l.still_valid(now)) {
                self.enter(now, StateId::Bound);
            } else {
                self.enter(now, StateId::Solicit);
            }
            return;
        }

        let backoff = self
            .backoff
            .get_or_insert_with(|| Backoff::new(defaults::CNF_TIMEOUT, defaults::CNF_MAX_RT, 0, defaults::CNF_MAX_RD));
        let timeout = backoff.next(&mut self.rng);
        self.try_count = backoff.try_count();

        let Some((addr, _)) = self.assigned_address else {
            self.enter(now, StateId::Solicit);
            return;
        };
        let client_id = self.client_id.as_ref().map(|d| d.as_bytes().to_vec());
        let elapsed = self.elapsed_time_option(now);
        let iaid = self.iaid;

        let mut repr = Repr::new(MessageType::Confirm, self.transaction_id);
        repr.client_id = client_id.as_deref();
        repr.elapsed_time = Some(elapsed);
        repr.ia_na = Some(wire::ReprIaNa {
            iaid,
            t1: 0,
            t2: 0,
            addresses: vec![wire::ReprIaAddr {
                addr,
                preferred_lifetime: 0,
                valid_lifetime: 0,
                additional_options: Vec::new(),
            }],
            status_code: None,
            additional_options: Vec::new(),
        });
        self.send(&repr);

        self.next_fire = Some(now + timeout);
    }

    fn on_message_confirm(&mut self, now: Instant, raw: &[u8], repr: &Repr<'_>) {
        if repr.message_type != MessageType::Reply || repr.transaction_id != self.transaction_id || !self.duid_echoes_ours(repr) {
            return;
        }
        let success = repr.status_code.as_ref().map_or(true, |s| s.status_code == StatusCode::Success);
        if success {
            self.save_packet(raw);
            self.enter(now, StateId::Bound);
        } else {
            self.enter(now, StateId::Unbound);
        }
    }

    // ---- Release (§4.1) ----

    fn on_timer_release(&mut self, now: Instant) {
        if let (Some((addr, _)), Some(lease)) = (self.assigned_address, self.lease.clone()) {
            let client_id = self.client_id.as_ref().map(|d| d.as_bytes().to_vec());
            let server_id = self.saved_server_id();
            let iaid = self.iaid;
            let mut repr = Repr::new(MessageType::Release, self.transaction_id);
            repr.client_id = client_id.as_deref();
            repr.server_id = server_id.as_deref();
            repr.elapsed_time = Some(0);
            repr.ia_na = Some(wire::ReprIaNa {
                iaid,
                t1: 0,
                t2: 0,
                addresses: vec![wire::ReprIaAddr {
                    addr,
                    preferred_lifetime: lease.preferred_lifetime,
                    valid_lifetime: lease.valid_lifetime,
                    additional_options: Vec::new(),
                }],
                status_code: None,
                additional_options: Vec::new(),
            });
            self.send(&repr);
        }
        // Best-effort: no reply is awaited (§4.1).
    }

    // ---- Unbound (§4.1) ----

    fn on_enter_unbound(&mut self, now: Instant) {
        if let Some((addr, _)) = self.assigned_address.take() {
            if let Err(e) = self.address_table.remove_address(self.interface.name(), addr) {
                log::warn!("failed to remove address leaving Unbound: {e}");
            }
        }
        if let Some(lease) = self.lease.as_mut() {
            lease.invalidate();
        }
        self.saved_verified = false;
        self.notifier.post(NotificationKind::Lost);
        self.enter(now, StateId::Solicit);
    }

    // ---- Decline (§4.1, §4.5) ----

    fn on_timer_decline(&mut self, now: Instant) {
        let backoff = self
            .backoff
            .get_or_insert_with(|| Backoff::new(defaults::DEC_TIMEOUT, Duration::ZERO, defaults::DEC_MAX_RC, Duration::ZERO));
        if backoff.mrc_exhausted() {
            // §9 Open Question: restart Solicit immediately, intentionally,
            // without sleeping.
            self.enter(now, StateId::Solicit);
            return;
        }
        let timeout = backoff.next(&mut self.rng);
        self.try_count = backoff.try_count();

        if let Some((addr, _)) = self.assigned_address {
            let client_id = self.client_id.as_ref().map(|d| d.as_bytes().to_vec());
            let server_id = self.saved_server_id();
            let iaid = self.iaid;
            let mut repr = Repr::new(MessageType::Decline, self.transaction_id);
            repr.client_id = client_id.as_deref();
            repr.server_id = server_id.as_deref();
            repr.elapsed_time = Some(self.elapsed_time_option(now));
            repr.ia_na = Some(wire::ReprIaNa {
                iaid,
                t1: 0,
                t2: 0,
                addresses: vec![wire::ReprIaAddr {
                    addr,
                    preferred_lifetime: 0,
                    valid_lifetime: 0,
                    additional_options: Vec::new(),
                }],
                status_code: None,
                additional_options: Vec::new(),
            });
            self.send(&repr);
        }

        self.next_fire = Some(now + timeout);
    }

    fn on_message_decline(&mut self, now: Instant, repr: &Repr<'_>) {
        if repr.message_type != MessageType::Reply || repr.transaction_id != self.transaction_id || !self.duid_echoes_ours(repr) {
            return;
        }
        self.enter(now, StateId::Solicit);
    }

    // ---- Inform (§4.1) ----

    fn on_timer_inform(&mut self, now: Instant) {
        let backoff = self
            .backoff
            .get_or_insert_with(|| Backoff::new(defaults::INF_TIMEOUT, defaults::INF_MAX_RT, 0, Duration::ZERO));
        let timeout = backoff.next(&mut self.rng);
        self.try_count = backoff.try_count();

        let client_id = self.client_id.as_ref().map(|d| d.as_bytes().to_vec());
        let elapsed = self.elapsed_time_option(now);
        let requested = self.config.requested_options.clone();

        let mut repr = Repr::new(MessageType::InformationRequest, self.transaction_id);
        repr.client_id = client_id.as_deref();
        repr.elapsed_time = Some(elapsed);
        repr.request_options = Some(requested);
        self.send(&repr);

        self.next_fire = Some(now + timeout);
    }

    fn on_message_inform(&mut self, now: Instant, raw: &[u8], repr: &Repr<'_>) {
        if repr.message_type != MessageType::Reply
            || repr.transaction_id != self.transaction_id
            || !self.duid_echoes_ours(repr)
            || repr.server_id.is_none_or(|id| id.is_empty())
        {
            return;
        }
        self.save_packet(raw);
        self.saved_verified = true;
        self.notifier.post(NotificationKind::Acquired);
        self.enter(now, StateId::InformComplete);
    }

    // ---- §4.5 address-change handling ----

    fn handle_address_changed(&mut self, now: Instant, addresses: &[(Ipv6Addr, AddressDadState)]) {
        if self.state != StateId::Bound {
            return;
        }
        let Some((ours, _)) = self.assigned_address else { return };
        let Some(&(_, dad)) = addresses.iter().find(|(a, _)| *a == ours) else {
            return;
        };
        match dad {
            AddressDadState::Duplicated => self.enter(now, StateId::Decline),
            AddressDadState::Tentative => {}
            AddressDadState::Usable => {
                self.notifier.post(NotificationKind::Updated);
                self.schedule_renew_timer(now);
            }
        }
    }

    // ---- §4.6 wake handling ----

    fn handle_link_status_changed(&mut self, now: Instant) {
        let status = self.interface.link_status();
        if !status.valid {
            if let Some((addr, _)) = self.assigned_address.take() {
                let _ = self.address_table.remove_address(self.interface.name(), addr);
            }
            self.enter(now, StateId::Inactive);
        }
    }

    fn handle_wake(&mut self, now: Instant) {
        let status = self.interface.link_status();

        if !status.valid {
            if let Some((addr, _)) = self.assigned_address.take() {
                let _ = self.address_table.remove_address(self.interface.name(), addr);
            }
            return;
        }

        if !status.wake_on_same_network {
            if let Some((addr, _)) = self.assigned_address.take() {
                let _ = self.address_table.remove_address(self.interface.name(), addr);
            }
            if self.state != StateId::Solicit {
                self.enter(now, StateId::Solicit);
            }
            return;
        }

        if !self.lease.as_ref().is_some_and(|l| l.still_valid(now)) {
            self.enter(now, StateId::Unbound);
            return;
        }

        if !matches!(self.state, StateId::Bound | StateId::Renew | StateId::Rebind) {
            self.enter(now, StateId::Confirm);
            return;
        }

        let Some(lease) = &self.lease else { return };
        if lease.valid_lifetime == crate::lease::INFINITE {
            return;
        }

        if let Some(scheduled) = self.last_renew_scheduled_at {
            if scheduled.saturating_duration_since(now) >= Duration::from_secs(defaults::WAKE_SKEW_SECS) {
                self.next_fire = Some(scheduled);
                return;
            }
        }
        self.enter(now, StateId::Renew);
    }

    // ---- §4.7 same-network test ----

    fn same_network(&self, lease: &Lease) -> bool {
        if !self.interface.is_wireless() {
            return true;
        }
        let current = self.service.get_ssid();
        match (current, &lease.ssid) {
            (None, None) => false,
            (a, b) => a.as_deref() == b.as_deref(),
        }
    }

    // ---- saved packet helpers (§9) ----

    fn save_packet(&mut self, raw: &[u8]) {
        self.saved = Some(raw.to_vec());
        self.saved_verified = true;
    }

    fn saved_ia_na(&self) -> Option<(&[u8], wire::ReprIaNa<'_>)> {
        let raw = self.saved.as_deref()?;
        let packet = Packet::new_checked(raw).ok()?;
        let repr = Repr::parse(&packet).ok()?;
        let ia_na = repr.ia_na?;
        // Re-parsing borrows `raw`'s lifetime; since `ReprIaNa` here only
        // needs to live for the duration of this call's caller, and our
        // caller (`on_enter_bound`) only reads scalar fields out of it
        // before this borrow ends, this is safe. See module docs.
        Some((raw, ia_na))
    }

    fn saved_server_id(&self) -> Option<Vec<u8>> {
        let raw = self.saved.as_deref()?;
        let packet = Packet::new_checked(raw).ok()?;
        let repr = Repr::parse(&packet).ok()?;
        repr.server_id.map(|s| s.to_vec())
    }
}

/// Best-effort classification of a transient "interface is down" transmit
/// failure (§7 collaborator-error class 2), vs. one worth a `warn` log.
fn is_interface_down(err: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotConnected)
}
