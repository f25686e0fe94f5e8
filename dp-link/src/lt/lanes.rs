//! 每条 lane 的训练参数以及 CR/CE 状态读取

use dp_if::{
    LinkRate, TrainingPattern,
    dpcd::{self, LaneAlignStatus, LaneStatus},
};

use crate::{
    config::LinkConfig,
    dp::DpLink,
    err::*,
    osal::{msleep, sleep_range_us},
};

/// Per-lane levels, each 0..=3.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaneSettings {
    pub drive_current: [u8; 4],
    pub pre_emphasis: [u8; 4],
    pub post_cursor2: [u8; 4],
}

/// Per-attempt link training context.
#[derive(Debug, Clone)]
pub struct LtData {
    /// Pattern currently sent, used to skip redundant writes.
    pub tps: TrainingPattern,
    pub lanes: LaneSettings,
    pub n_lanes: u8,
    pub link_bw: LinkRate,
    pub cr_retry: u32,
    pub ce_retry: u32,
    pub tx_pu: u8,
    /// Also gates post-cursor2 programming.
    pub tps3_supported: bool,
    pub no_aux_handshake: bool,
    pub aux_rd_interval: u8,
    /// Set once the current configuration has trained successfully.
    pub lt_config_valid: bool,
}

impl LtData {
    pub fn new(cfg: &LinkConfig) -> Self {
        let mut lt = Self {
            tps: TrainingPattern::Disable,
            lanes: LaneSettings::default(),
            n_lanes: 0,
            link_bw: cfg.link_bw,
            cr_retry: 0,
            ce_retry: 0,
            tx_pu: 0,
            tps3_supported: false,
            no_aux_handshake: false,
            aux_rd_interval: 0,
            lt_config_valid: false,
        };
        lt.sw_reset(cfg);
        lt
    }

    /// Forgets the proven configuration, the retry counters and the lane
    /// levels, and reloads the link parameters from `cfg`.
    pub fn sw_reset(&mut self, cfg: &LinkConfig) {
        self.lt_config_valid = false;
        self.cr_retry = 0;
        self.ce_retry = 0;
        self.tx_pu = 0;
        self.n_lanes = cfg.lane_count;
        self.link_bw = cfg.link_bw;
        self.no_aux_handshake = cfg.support_fast_lt;
        self.tps3_supported = cfg.tps3_supported;
        self.aux_rd_interval = cfg.aux_rd_interval;
        self.lanes = LaneSettings::default();
    }

    /// [`LtData::sw_reset`] plus reprogramming the link when a sink is
    /// present. Lane levels are left alone on the hardware side.
    pub fn reset(&mut self, link: &mut DpLink) {
        self.sw_reset(&link.link_cfg);
        if link.hpd_asserted() {
            if let Err(e) = link.update_link_config() {
                warn!("dp lt: reset link config: {e}");
            }
        }
    }

    fn loop_count(&self) -> usize {
        if self.n_lanes == 1 { 1 } else { self.n_lanes as usize / 2 }
    }

    fn active_lanes(&self) -> usize {
        (self.n_lanes as usize).min(4)
    }

    pub fn wait_aux_training(&self, link: &DpLink, clock_recovery: bool) {
        let kernel = link.kernel();
        if self.aux_rd_interval == 0 {
            if clock_recovery {
                sleep_range_us(kernel, 150, 200);
            } else {
                sleep_range_us(kernel, 450, 500);
            }
        } else {
            msleep(kernel, self.aux_rd_interval as u64 * 4);
        }
    }

    /// Sends `tp` unless it is already being sent. Without a sink only the
    /// source side is switched.
    pub fn set_training_pattern(&mut self, link: &mut DpLink, tp: TrainingPattern) {
        if self.tps == tp {
            return;
        }

        if link.hpd_asserted() {
            if let Err(e) = link.tpg(tp, self.n_lanes) {
                warn!("dp lt: set pattern {tp:?}: {e}");
            }
        } else {
            link.sor().tpg(tp, self.n_lanes);
        }
        self.tps = tp;
    }

    fn read_lane_status(&self, link: &mut DpLink, buf: &mut [u8]) -> bool {
        if self.n_lanes == 0 {
            return false;
        }
        match link.dpcd().read_burst(dpcd::LANE0_1_STATUS, buf) {
            Ok(()) => true,
            Err(e) => {
                warn!("dp lt: read lane status: {e}");
                false
            }
        }
    }

    pub fn clock_recovery_status(&self, link: &mut DpLink) -> bool {
        let mut status = [0u8; 2];
        let n = self.loop_count();
        if !self.read_lane_status(link, &mut status[..n]) {
            return false;
        }
        (0..self.active_lanes()).all(|lane| LaneStatus::of_lane(&status, lane).contains(LaneStatus::CR_DONE))
    }

    /// Channel EQ done and symbol locked on every active lane, plus
    /// inter-lane alignment.
    pub fn channel_eq_status(&self, link: &mut DpLink) -> bool {
        let mut status = [0u8; 3];
        if !self.read_lane_status(link, &mut status) {
            return false;
        }
        let locked = (0..self.active_lanes()).all(|lane| LaneStatus::of_lane(&status, lane).channel_eq_locked());
        locked && LaneAlignStatus::from_bits_truncate(status[2]).contains(LaneAlignStatus::INTERLANE_ALIGN_DONE)
    }

    pub fn lt_status(&self, link: &mut DpLink) -> bool {
        self.clock_recovery_status(link) && self.channel_eq_status(link)
    }

    /// Loads the levels the sink asks for into [`LtData::lanes`].
    pub fn requested_lane_settings(&mut self, link: &mut DpLink) -> Result {
        let mut adj = [0u8; 2];
        let n = self.loop_count();
        link.dpcd().read_burst(dpcd::ADJUST_REQUEST_LANE0_1, &mut adj[..n])?;
        for lane in 0..2 * n {
            let (vs, pe) = dpcd::adjust_request(&adj, lane);
            self.lanes.drive_current[lane] = vs;
            self.lanes.pre_emphasis[lane] = pe;
        }

        if self.tps3_supported {
            let pc = link.dpcd().read(dpcd::ADJUST_REQUEST_POST_CURSOR2)?;
            for lane in 0..self.active_lanes() {
                self.lanes.post_cursor2[lane] = dpcd::adjust_request_post_cursor2(pc, lane);
            }
        }
        Ok(())
    }

    fn set_tx_pu(&mut self, link: &mut DpLink) {
        if link.pdata().tx_pu_disable {
            link.sor().set_tx_pu(None);
            self.tx_pu = 0;
            return;
        }

        let cal = &link.pdata().calibration;
        let max_tx_pu = (0..self.active_lanes())
            .map(|lane| {
                cal.codes(
                    self.lanes.post_cursor2[lane],
                    self.lanes.drive_current[lane],
                    self.lanes.pre_emphasis[lane],
                )
                .tx_pu
            })
            .max()
            .unwrap_or(0);

        self.tx_pu = max_tx_pu;
        link.sor().set_tx_pu(Some(max_tx_pu));
    }

    /// Drives the current lane levels on the source and reports them to the
    /// sink.
    pub fn apply_lane_settings(&mut self, link: &mut DpLink) {
        let pc_supported = self.tps3_supported;

        for lane in 0..self.active_lanes() {
            let pe = self.lanes.pre_emphasis[lane];
            let vs = self.lanes.drive_current[lane];
            let pc = self.lanes.post_cursor2[lane];
            let codes = link.pdata().calibration.codes(pc, vs, pe);
            let phys = link.sor_ref().physical_lane(lane);
            link.sor().set_lane_levels(
                phys,
                codes.pre_emphasis,
                codes.drive_current,
                pc_supported.then_some(codes.post_cursor),
            );
            info!(
                "dp lt: lane {lane}: pe {pe} ({:#x}), vs {vs} ({:#x}), pc {pc} ({:#x})",
                codes.pre_emphasis, codes.drive_current, codes.post_cursor
            );
        }
        self.set_tx_pu(link);
        info!("dp lt: tx_pu {:#x}", self.tx_pu);
        sleep_range_us(link.kernel(), 15, 20);

        let mut lane_set = [0u8; 4];
        for (lane, set) in lane_set.iter_mut().enumerate().take(self.active_lanes()) {
            *set = dpcd::training_lane_set(self.lanes.drive_current[lane], self.lanes.pre_emphasis[lane]);
        }
        if let Err(e) = link.dpcd().write_burst(dpcd::TRAINING_LANE0_SET, &lane_set) {
            warn!("dp lt: write lane set: {e}");
        }

        if pc_supported {
            for cnt in 0..self.loop_count() {
                let pc = &self.lanes.post_cursor2;
                let val = dpcd::post_cursor2_set(pc[2 * cnt]) | (dpcd::post_cursor2_set(pc[2 * cnt + 1]) << 4);
                if let Err(e) = link.dpcd().write(dpcd::TRAINING_LANE0_1_SET2 + cnt as u32, val) {
                    warn!("dp lt: write post cursor2 set: {e}");
                }
            }
        }
    }
}

/// Every active lane was driven at swing 3 and the sink still asks for 3.
pub fn is_vs_already_max(n_lanes: u8, old_vs: &[u8; 4], new_vs: &[u8; 4]) -> bool {
    (0..(n_lanes as usize).min(4)).all(|lane| old_vs[lane] == dpcd::MAX_LEVEL && new_vs[lane] == dpcd::MAX_LEVEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vs_max_needs_every_lane() {
        assert!(is_vs_already_max(2, &[3, 3, 0, 0], &[3, 3, 1, 1]));
        assert!(!is_vs_already_max(2, &[3, 2, 0, 0], &[3, 3, 0, 0]));
        assert!(!is_vs_already_max(1, &[3, 0, 0, 0], &[2, 0, 0, 0]));
    }

    #[test]
    fn sw_reset_reloads_from_config() {
        let cfg = LinkConfig {
            lane_count: 2,
            link_bw: LinkRate::Hbr,
            tps3_supported: true,
            support_fast_lt: true,
            aux_rd_interval: 4,
            ..Default::default()
        };
        let mut lt = LtData::new(&LinkConfig::default());
        lt.lt_config_valid = true;
        lt.cr_retry = 3;
        lt.lanes.drive_current = [3; 4];
        lt.sw_reset(&cfg);
        assert!(!lt.lt_config_valid);
        assert_eq!(lt.cr_retry, 0);
        assert_eq!(lt.n_lanes, 2);
        assert_eq!(lt.link_bw, LinkRate::Hbr);
        assert!(lt.no_aux_handshake && lt.tps3_supported);
        assert_eq!(lt.lanes, LaneSettings::default());
    }
}
