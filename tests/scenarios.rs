//! End-to-end scenarios driving the state machine purely through its public
//! surface: `start`/`handle_message`/`handle_event`/`poll_timer`, with
//! hand-built wire bytes standing in for a real DHCPv6 server.

mod common;

use std::net::Ipv6Addr;
use std::time::{Duration, Instant};

use dhcpv6_client_core::wire::{MessageType, Packet, Repr, ReprIaAddr, ReprIaNa, ReprStatusCode, StatusCode};
use dhcpv6_client_core::{AddressDadState, Event, Notification, StateId};

use common::{AddressTableCall, Harness};

fn encode(repr: &Repr<'_>) -> Vec<u8> {
    let mut buf = vec![0u8; repr.buffer_len()];
    let mut packet = Packet::new_unchecked(&mut buf[..]);
    repr.emit(&mut packet).expect("encodable test repr");
    buf
}

fn parse(bytes: &[u8]) -> Repr<'_> {
    let packet = Packet::new_checked(bytes).expect("well-formed test packet");
    Repr::parse(&packet).expect("parseable test packet")
}

fn server_reply(
    message_type: MessageType,
    transaction_id: u32,
    client_duid: &[u8],
    server_duid: &[u8],
    iaid: u32,
    addr: Ipv6Addr,
    preferred: u32,
    valid: u32,
    preference: Option<u8>,
    ia_status: Option<StatusCode>,
) -> Vec<u8> {
    let mut repr = Repr::new(message_type, transaction_id);
    repr.client_id = Some(client_duid);
    repr.server_id = Some(server_duid);
    repr.preference = preference;
    repr.ia_na = Some(ReprIaNa {
        iaid,
        t1: 0,
        t2: 0,
        addresses: vec![ReprIaAddr {
            addr,
            preferred_lifetime: preferred,
            valid_lifetime: valid,
            additional_options: Vec::new(),
        }],
        status_code: ia_status.map(|status_code| ReprStatusCode {
            status_code,
            status_message: "".into(),
        }),
        additional_options: Vec::new(),
    });
    encode(&repr)
}

#[test]
fn fresh_stateful_acquisition_reaches_bound() {
    let mut h = Harness::new();
    let now = Instant::now();

    h.client.start(now, true, false).unwrap();
    assert_eq!(h.client.state(), StateId::Solicit);

    let fire_at = h.client.next_poll_at().unwrap();
    h.client.poll_timer(fire_at);
    assert_eq!(h.sent_count(), 1);

    let solicit = parse(&h.last_sent());
    assert_eq!(solicit.message_type, MessageType::Solicit);
    let iaid = solicit.ia_na.as_ref().unwrap().iaid;
    let xid = solicit.transaction_id;

    let addr = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1);
    let advertise = server_reply(
        MessageType::Advertise,
        xid,
        h.client_duid().as_bytes(),
        h.server_duid.as_bytes(),
        iaid,
        addr,
        600,
        900,
        None,
        None,
    );
    h.client.handle_message(fire_at, &advertise);

    assert_eq!(h.client.state(), StateId::Request);
    assert_eq!(h.sent_count(), 2);

    let request = parse(&h.last_sent());
    assert_eq!(request.message_type, MessageType::Request);
    let req_xid = request.transaction_id;
    assert_eq!(request.ia_na.as_ref().unwrap().addresses[0].addr, addr);

    let reply = server_reply(
        MessageType::Reply,
        req_xid,
        h.client_duid().as_bytes(),
        h.server_duid.as_bytes(),
        iaid,
        addr,
        600,
        900,
        None,
        None,
    );
    h.client.handle_message(fire_at, &reply);

    assert_eq!(h.client.state(), StateId::Bound);
    assert_eq!(h.client.copy_addresses(), Some((addr, 128)));
    assert!(h
        .address_calls
        .borrow()
        .iter()
        .any(|c| matches!(c, AddressTableCall::Add { addr: a, .. } if *a == addr)));
    assert_eq!(h.notifications.borrow().last(), Some(&Notification::Acquired));

    // T1 = preferred * 0.5 = 300s, scheduled right on entry to Bound, with
    // no follow-up AddressChanged event required.
    let next = h.client.next_poll_at().expect("renew timer scheduled on entering Bound");
    let delay = next.duration_since(fire_at);
    assert!(
        delay >= Duration::from_secs(299) && delay <= Duration::from_secs(301),
        "expected ~300s renewal delay, got {delay:?}"
    );
}

#[test]
fn preference_255_short_circuits_retransmission() {
    let mut h = Harness::new();
    let now = Instant::now();

    h.client.start(now, true, false).unwrap();
    let first_fire = h.client.next_poll_at().unwrap();
    h.client.poll_timer(first_fire);
    assert_eq!(h.sent_count(), 1);

    let solicit = parse(&h.last_sent());
    let xid = solicit.transaction_id;
    let iaid = solicit.ia_na.as_ref().unwrap().iaid;

    // Retransmit once so `try > 1`; the phase's transaction id is stable
    // across retries within Solicit.
    let second_fire = h.client.next_poll_at().unwrap();
    h.client.poll_timer(second_fire);
    assert_eq!(h.sent_count(), 2);
    assert_eq!(parse(&h.last_sent()).transaction_id, xid);

    let addr = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 2);
    let low_pref = server_reply(
        MessageType::Advertise,
        xid,
        h.client_duid().as_bytes(),
        h.server_duid.as_bytes(),
        iaid,
        addr,
        600,
        900,
        Some(10),
        None,
    );
    h.client.handle_message(second_fire, &low_pref);
    assert_eq!(h.client.state(), StateId::Solicit, "a low-preference candidate must not short-circuit retransmission");
    assert_eq!(h.sent_count(), 2);

    let max_pref = server_reply(
        MessageType::Advertise,
        xid,
        h.client_duid().as_bytes(),
        h.server_duid.as_bytes(),
        iaid,
        addr,
        600,
        900,
        Some(255),
        None,
    );
    h.client.handle_message(second_fire, &max_pref);
    assert_eq!(h.client.state(), StateId::Request);
    assert_eq!(h.sent_count(), 3);
}

#[test]
fn not_on_link_in_request_restarts_solicit() {
    let mut h = Harness::new();
    let now = Instant::now();
    h.client.start(now, true, false).unwrap();
    let fire_at = h.client.next_poll_at().unwrap();
    h.client.poll_timer(fire_at);

    let solicit = parse(&h.last_sent());
    let xid = solicit.transaction_id;
    let iaid = solicit.ia_na.as_ref().unwrap().iaid;
    let addr = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 3);

    let advertise = server_reply(
        MessageType::Advertise,
        xid,
        h.client_duid().as_bytes(),
        h.server_duid.as_bytes(),
        iaid,
        addr,
        600,
        900,
        None,
        None,
    );
    h.client.handle_message(fire_at, &advertise);
    assert_eq!(h.client.state(), StateId::Request);

    let request = parse(&h.last_sent());
    let req_xid = request.transaction_id;

    let reply = server_reply(
        MessageType::Reply,
        req_xid,
        h.client_duid().as_bytes(),
        h.server_duid.as_bytes(),
        iaid,
        addr,
        600,
        900,
        None,
        Some(StatusCode::NotOnLink),
    );
    h.client.handle_message(fire_at, &reply);

    assert_eq!(h.client.state(), StateId::Solicit);
}

fn reach_bound(h: &mut Harness, now: Instant, preferred: u32, valid: u32) -> Ipv6Addr {
    h.client.start(now, true, false).unwrap();
    let fire_at = h.client.next_poll_at().unwrap();
    h.client.poll_timer(fire_at);

    let solicit = parse(&h.last_sent());
    let xid = solicit.transaction_id;
    let iaid = solicit.ia_na.as_ref().unwrap().iaid;
    let addr = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0xaaaa);

    let advertise = server_reply(
        MessageType::Advertise,
        xid,
        h.client_duid().as_bytes(),
        h.server_duid.as_bytes(),
        iaid,
        addr,
        preferred,
        valid,
        None,
        None,
    );
    h.client.handle_message(fire_at, &advertise);

    let req_xid = parse(&h.last_sent()).transaction_id;
    let reply = server_reply(
        MessageType::Reply,
        req_xid,
        h.client_duid().as_bytes(),
        h.server_duid.as_bytes(),
        iaid,
        addr,
        preferred,
        valid,
        None,
        None,
    );
    h.client.handle_message(fire_at, &reply);
    assert_eq!(h.client.state(), StateId::Bound);
    addr
}

#[test]
fn duplicate_address_triggers_decline() {
    let mut h = Harness::new();
    let now = Instant::now();
    let addr = reach_bound(&mut h, now, 600, 900);

    h.client.handle_event(now, Event::AddressChanged(vec![(addr, AddressDadState::Duplicated)]));

    assert_eq!(h.client.state(), StateId::Decline);
    let sent = parse(&h.last_sent());
    assert_eq!(sent.message_type, MessageType::Decline);
}

#[test]
fn wake_within_skew_reschedules_instead_of_renewing() {
    let mut h = Harness::new();
    let now = Instant::now();
    let addr = reach_bound(&mut h, now, 600, 900);

    h.client.handle_event(now, Event::AddressChanged(vec![(addr, AddressDadState::Usable)]));
    let scheduled = h.client.next_poll_at().expect("finite lease schedules a renew timer");
    assert!(scheduled > now + Duration::from_secs(60));

    let before_sent = h.sent_count();
    h.client.handle_event(now, Event::Wake);

    assert_eq!(h.client.state(), StateId::Bound);
    assert_eq!(h.client.next_poll_at(), Some(scheduled));
    assert_eq!(h.sent_count(), before_sent);
}

#[test]
fn infinite_lease_never_schedules_renewal() {
    let mut h = Harness::new();
    let now = Instant::now();
    let addr = reach_bound(&mut h, now, 0xffff_ffff, 0xffff_ffff);

    h.client.handle_event(now, Event::AddressChanged(vec![(addr, AddressDadState::Usable)]));

    assert_eq!(h.client.next_poll_at(), None);
}
