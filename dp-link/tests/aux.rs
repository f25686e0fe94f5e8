mod common;

use std::{sync::Arc, time::Duration};

use common::*;
use dp_link::{
    AuxReply, AuxRequest, Kernel,
    aux::{AUX_DEFER_MAX_TRIES, AUX_TIMEOUT_MAX_TRIES, Dpcd},
    err::AuxError,
};

fn setup() -> (Dpcd, SimSink, Arc<VirtualClock>) {
    init_log();
    let sink = SimSink::new(0x14, 4);
    let clock = Arc::new(VirtualClock::default());
    let dpcd = Dpcd::new(Box::new(sink.clone()), clock.clone());
    (dpcd, sink, clock)
}

#[test]
fn defer_is_retried() {
    let (mut dpcd, sink, clock) = setup();
    for _ in 0..AUX_DEFER_MAX_TRIES {
        sink.push_reply(Ok(AuxReply::Defer));
    }
    assert_eq!(dpcd.read(0x000), Ok(0x12));
    assert_eq!(sink.transfers().len(), AUX_DEFER_MAX_TRIES as usize + 1);
    assert_eq!(clock.now(), Duration::from_micros(400) * AUX_DEFER_MAX_TRIES);
}

#[test]
fn defer_limit() {
    let (mut dpcd, sink, _) = setup();
    for _ in 0..=AUX_DEFER_MAX_TRIES {
        sink.push_reply(Ok(AuxReply::Defer));
    }
    assert_eq!(dpcd.read(0x000), Err(AuxError::DeferLimit));
    assert_eq!(sink.transfers().len(), AUX_DEFER_MAX_TRIES as usize + 1);
}

#[test]
fn nack_and_timeout_share_budget() {
    let (mut dpcd, sink, _) = setup();
    sink.push_reply(Ok(AuxReply::Nack));
    sink.push_reply(Err(AuxError::Timeout));
    assert_eq!(dpcd.read(0x001), Ok(0x14));

    let (mut dpcd, sink, _) = setup();
    for _ in 0..=AUX_TIMEOUT_MAX_TRIES {
        sink.push_reply(Ok(AuxReply::Nack));
    }
    assert_eq!(dpcd.read(0x001), Err(AuxError::Nack));
    assert_eq!(sink.transfers().len(), AUX_TIMEOUT_MAX_TRIES as usize + 1);
}

#[test]
fn unplugged_sink_is_not_retried() {
    let (mut dpcd, sink, _) = setup();
    sink.push_reply(Err(AuxError::NotPlugged));
    assert_eq!(dpcd.write(0x600, 1), Err(AuxError::NotPlugged));
    assert_eq!(sink.transfers().len(), 1);
    assert_eq!(sink.dpcd(0x600), 0);
}

#[test]
fn burst_is_split_into_aux_payloads() {
    let (mut dpcd, sink, _) = setup();
    let mut buf = [0u8; 20];
    dpcd.read_burst(0x000, &mut buf).unwrap();
    assert_eq!(buf[..3], [0x12, 0x14, 0x84]);
    assert_eq!(
        sink.transfers(),
        [(AuxRequest::Read, 0x000, 16), (AuxRequest::Read, 0x010, 4)]
    );

    dpcd.write_burst(0x103, &[1, 2, 3, 4]).unwrap();
    assert_eq!(sink.transfers().last(), Some(&(AuxRequest::Write, 0x103, 4)));
}

#[test]
fn write_field_keeps_other_bits() {
    let (mut dpcd, sink, _) = setup();
    sink.set_dpcd(0x101, 0x84);
    dpcd.write_field(0x101, 0x1f, 2).unwrap();
    assert_eq!(sink.dpcd(0x101), 0x82);
}

#[test]
fn empty_burst_is_a_noop() {
    let (mut dpcd, sink, _) = setup();
    assert_eq!(dpcd.read_burst(0x000, &mut []), Ok(()));
    assert_eq!(dpcd.write_burst(0x000, &[]), Ok(()));
    assert!(sink.transfers().is_empty());
}
