mod common;

use std::sync::Arc;

use common::*;
use dp_link::{DisplayMode, DpPlatformData, LinkTrainer, LtState, lt::LtData, sor::reg};

fn setup(sink: SimSink, pdata: DpPlatformData) -> (Rig, dp_link::DpLink) {
    init_log();
    let clock = Arc::new(VirtualClock::default());
    let rig = Rig::new(sink);
    let link = rig.configured_link_with(clock, DisplayMode::cea_1080p60(), pdata);
    (rig, link)
}

#[test]
fn tps3_sink_equalizes_with_pattern_3() {
    init_log();
    let clock = Arc::new(VirtualClock::default());
    let rig = Rig::new(SimSink::new(0x14, 4).with_tps3());
    rig.sink.set_ce(|v| v.pattern == 3);
    let trainer = LinkTrainer::new(rig.configured_link(clock.clone(), DisplayMode::cea_1080p60()));

    trainer.request_retrain();
    assert_eq!(
        drive(&trainer, clock.as_ref()),
        [
            LtState::Reset,
            LtState::ClockRecovery,
            LtState::ChannelEqualization,
            LtState::DonePass
        ]
    );
    assert!(trainer.lt_data().tps3_supported);
    // post-cursor2 levels sent along with every lane update
    assert!(rig.sink.writes_to(0x10f) > 0);
    assert_eq!(rig.sink.dpcd(0x102), 0);
}

#[test]
fn post_cursor2_request_reaches_mapped_lane() {
    let pdata = DpPlatformData {
        xbar_ctrl: [1, 0, 2, 3, 4],
        ..Default::default()
    };
    let (rig, mut link) = setup(SimSink::new(0x14, 4).with_tps3(), pdata);
    let mut lt = LtData::new(&link.link_cfg);
    assert!(lt.tps3_supported);

    // lane 1 asks for post-cursor2 level 3
    rig.sink.set_dpcd(0x20c, 3 << 2);
    lt.requested_lane_settings(&mut link).unwrap();
    assert_eq!(lt.lanes.post_cursor2, [0, 3, 0, 0]);

    lt.apply_lane_settings(&mut link);
    assert_eq!(rig.sink.dpcd(0x10f), 0x70);
    assert_eq!(rig.sink.dpcd(0x110), 0);

    let sor = link.sor_ref();
    assert_eq!(sor.lane_levels(0).2, 0x30);
    assert_eq!(sor.lane_levels(1).2, 0);
}

#[test]
fn levels_follow_the_crossbar() {
    let pdata = DpPlatformData {
        xbar_ctrl: [1, 0, 3, 2, 4],
        ..Default::default()
    };
    let (rig, mut link) = setup(SimSink::new(0x14, 4), pdata);
    let mut lt = LtData::new(&link.link_cfg);

    lt.lanes.drive_current = [0, 1, 2, 3];
    lt.apply_lane_settings(&mut link);

    let sor = link.sor_ref();
    for (lane, code) in [0x13u8, 0x1e, 0x28, 0x3c].into_iter().enumerate() {
        let phys = sor.xbar_ctrl()[lane] as usize;
        assert_eq!(sor.lane_levels(phys), (0, code, 0), "lane {lane}");
    }
    assert_eq!(sor.lane_levels(1).1, 0x13);
    assert_eq!(rig.sink.dpcd(0x103), 0x00);
    assert_eq!(rig.sink.dpcd(0x106), 0x27);
    // no post-cursor2 without TPS3
    assert_eq!(rig.sink.writes_to(0x10f), 0);
}

#[test]
fn tx_pull_up_takes_the_largest_lane_code() {
    let (rig, mut link) = setup(SimSink::new(0x14, 4), DpPlatformData::default());
    let mut lt = LtData::new(&link.link_cfg);

    lt.lanes.drive_current = [2, 0, 0, 0];
    lt.lanes.pre_emphasis = [1, 0, 0, 0];
    lt.apply_lane_settings(&mut link);

    let expected = link.pdata().calibration.codes(0, 2, 1).tx_pu;
    assert_eq!(expected, 0x60);
    assert_eq!(lt.tx_pu, expected);
    let pad = rig.sor.reg(reg::dp_padctl(0));
    assert_eq!((pad >> 8) & 0xff, expected as u32);
    assert_ne!(pad & (1 << 22), 0);
    assert_eq!(rig.sink.dpcd(0x103), 0x2e);
    assert_eq!(rig.sink.dpcd(0x104), 0x00);
}

#[test]
fn tx_pull_up_stays_off_when_board_disables_it() {
    let pdata = DpPlatformData {
        tx_pu_disable: true,
        ..Default::default()
    };
    let (rig, mut link) = setup(SimSink::new(0x14, 4), pdata);
    let mut lt = LtData::new(&link.link_cfg);

    lt.lanes.drive_current = [2, 0, 0, 0];
    lt.lanes.pre_emphasis = [1, 0, 0, 0];
    lt.apply_lane_settings(&mut link);

    assert_eq!(lt.tx_pu, 0);
    assert_eq!(rig.sor.reg(reg::dp_padctl(0)) & (1 << 22), 0);
}
