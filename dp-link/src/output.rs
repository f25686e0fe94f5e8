//! DP 输出的使能 / 关闭流程
//!
//! [`DpOutput`] owns the link through a shared [`LinkTrainer`]. Enabling
//! programs the best link configuration, then hands over to the trainer and
//! waits for it to settle.

use alloc::sync::Arc;
use core::time::Duration;

use dp_if::{
    DisplayMode, TrainingPattern,
    dpcd::{self, DeviceServiceIrq},
};

use crate::{
    config::calc_config,
    dp::DpLink,
    err::*,
    lt::{LT_TIMEOUT, LinkTrainer, LtEvent, LtState},
};

pub struct DpOutput {
    trainer: Arc<LinkTrainer>,
    enabled: bool,
}

impl DpOutput {
    pub fn new(link: DpLink) -> Self {
        Self {
            trainer: Arc::new(LinkTrainer::new(link)),
            enabled: false,
        }
    }

    /// Handle for the thread or task running [`LinkTrainer::run`].
    pub fn trainer(&self) -> Arc<LinkTrainer> {
        self.trainer.clone()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Stores `mode` and refits the link configuration to it.
    pub fn set_mode(&mut self, mode: DisplayMode) -> Result {
        self.trainer.with_link(|link| {
            link.set_mode(mode);
            if link.max_link_cfg.max_lane_count == 0 {
                // sink capabilities not read yet
                return Ok(());
            }
            let mut cfg = link.max_link_cfg;
            cfg.lane_count = cfg.max_lane_count;
            cfg.link_bw = cfg.max_link_bw;
            if !calc_config(&mode, &mut cfg) {
                warn!("dp: mode {}x{} does not fit the link", mode.h_active, mode.v_active);
                return Err(DpError::InvalidLinkConfig);
            }
            link.max_link_cfg = cfg;
            Ok(())
        })
    }

    fn prepare_link(link: &mut DpLink) -> Result {
        if link.mode().is_none() {
            return Err(DpError::NoMode);
        }

        link.panel_power(true)?;
        link.dpcd_init()?;

        let max = link.init_max_link_cfg()?;
        if !max.is_valid {
            error!("dp: no link configuration can carry the mode");
            return Err(DpError::InvalidLinkConfig);
        }
        link.link_cfg = max;

        link.dpcd()
            .write(dpcd::MAIN_LINK_CHANNEL_CODING_SET, dpcd::CHANNEL_CODING_8B10B)?;

        link.sor().set_idle_before_attach(true);
        link.update_link_config()?;
        link.set_enhanced_framing(max.enhanced_framing)?;
        link.tpg(TrainingPattern::Disable, max.lane_count)?;

        link.sor().port_enable(true);
        link.sor().config_xbar();
        Ok(())
    }

    /// Brings the link up and trains it. Fails with [`DpError::Timeout`] if
    /// training did not settle within [`LT_TIMEOUT`]. On failure the lanes are
    /// left powered down.
    pub fn enable(&mut self) -> Result {
        self.trainer.with_link(Self::prepare_link)?;
        self.trainer.reset_training_data();

        self.trainer.request_retrain();
        if !self.trainer.wait_for_completion(LT_TIMEOUT) {
            error!("dp: link training timed out");
            self.trainer.force_disable();
            if !self.trainer.wait_for_completion(LT_TIMEOUT) {
                warn!("dp: link training did not stop");
            }
            return self.abort_enable(DpError::Timeout);
        }

        match self.trainer.state() {
            LtState::DonePass => {
                self.enabled = true;
                info!("dp: output enabled");
                Ok(())
            }
            state => {
                error!("dp: link training ended in state {state}");
                self.abort_enable(DpError::LinkTrainingFailed)
            }
        }
    }

    fn abort_enable(&self, err: DpError) -> Result {
        if let Err(e) = self.trainer.with_link(Self::power_down) {
            warn!("dp: power down after failed enable: {e}");
        }
        Err(err)
    }

    fn power_down(link: &mut DpLink) -> Result {
        link.sor().detach()?;
        let lanes = link.link_cfg.lane_count;
        link.sor().power_lanes(lanes, false)?;
        link.sor().port_enable(false);
        Ok(())
    }

    /// Takes the link down and powers off the sink and the lanes.
    pub fn disable(&mut self) -> Result {
        if !self.enabled {
            return Err(DpError::NotEnabled);
        }

        self.trainer.force_disable();
        if !self.trainer.wait_for_completion(LT_TIMEOUT) {
            warn!("dp: disable did not complete in time");
        }

        let ret = self.trainer.with_link(|link| {
            if link.hpd_asserted() {
                if let Err(e) = link.panel_power(false) {
                    warn!("dp: panel power down: {e}");
                }
            }
            let ret = Self::power_down(link);
            link.invalidate_sink_cap();
            ret
        });

        self.enabled = false;
        info!("dp: output disabled");
        ret
    }

    pub fn hotplug_event(&self, asserted: bool) {
        self.trainer.notify_hotplug(asserted);
    }

    /// Short HPD pulse from the sink. An automated test request is answered
    /// and, for a link training test, forces a retrain. Otherwise the link is
    /// retrained only when it lost lock.
    pub fn irq_event(&self) -> Result {
        if !self.enabled {
            return Ok(());
        }

        let (stable, irq) = self.trainer.with_link(DpLink::link_status)?;

        if irq.contains(DeviceServiceIrq::AUTOMATED_TEST) {
            if self.trainer.with_link(DpLink::respond_test_request)? {
                info!("dp: automated link training test requested");
                self.trainer.force_retrain();
            }
            return Ok(());
        }

        if stable {
            info!("dp: link stable, ignore irq event");
        } else {
            info!("dp: link lost, retraining");
            self.trainer.notify(LtEvent::IrqHpd);
        }
        Ok(())
    }

    /// Current state of the trainer, for status reporting.
    pub fn link_state(&self) -> LtState {
        self.trainer.state()
    }

    pub fn wait_for_training(&self, timeout: Duration) -> bool {
        self.trainer.wait_for_completion(timeout)
    }
}
