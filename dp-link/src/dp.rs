//! DisplayPort 链路：接收端能力读取与链路参数下发

use alloc::{boxed::Box, sync::Arc};

use dp_if::{
    DisplayMode, LinkRate, TrainingPattern,
    dpcd::{self, DeviceServiceIrq, EdpConfigCap, LaneAlignStatus, MaxDownspreadCap, MaxLaneCountCap},
    host::{AuxChannel, Hotplug, SorRegisters},
};

use crate::{
    aux::Dpcd,
    calib::{LaneCalibration, ProdSettings},
    config::{LinkConfig, calc_config},
    err::*,
    osal::Kernel,
    sor::Sor,
};

/// Board description of one DP output.
#[derive(Debug, Clone)]
pub struct DpPlatformData {
    /// Lane count cap below the sink's.
    pub lanes: Option<u8>,
    /// Link rate cap below the sink's.
    pub link_bw: Option<LinkRate>,
    /// Colour depth, 24 bpp when unset.
    pub bits_per_pixel: Option<u32>,
    /// Physical lane of each logical lane.
    pub xbar_ctrl: [u8; 5],
    /// SOR port (link A = 0, link B = 1).
    pub portnum: usize,
    /// Keep the TX pull-up disabled.
    pub tx_pu_disable: bool,
    pub calibration: LaneCalibration,
    pub prods: ProdSettings,
}

impl Default for DpPlatformData {
    fn default() -> Self {
        Self {
            lanes: None,
            link_bw: None,
            bits_per_pixel: None,
            xbar_ctrl: [0, 1, 2, 3, 4],
            portnum: 0,
            tx_pu_disable: false,
            calibration: LaneCalibration::default(),
            prods: ProdSettings::default(),
        }
    }
}

pub struct DpLink {
    dpcd: Dpcd,
    sor: Sor,
    hpd: Arc<dyn Hotplug>,
    kernel: Arc<dyn Kernel>,
    pdata: DpPlatformData,
    mode: Option<DisplayMode>,
    /// Configuration currently programmed / being trained.
    pub link_cfg: LinkConfig,
    /// Best configuration the sink and board allow.
    pub max_link_cfg: LinkConfig,
    sink_cap: [u8; dpcd::RECEIVER_CAP_SIZE],
    sink_cap_valid: bool,
}

impl DpLink {
    pub fn new(
        aux: Box<dyn AuxChannel>,
        sor_regs: Box<dyn SorRegisters>,
        hpd: Arc<dyn Hotplug>,
        kernel: Arc<dyn Kernel>,
        pdata: DpPlatformData,
    ) -> Self {
        let sor = Sor::new(sor_regs, kernel.clone(), pdata.portnum, pdata.xbar_ctrl);
        Self {
            dpcd: Dpcd::new(aux, kernel.clone()),
            sor,
            hpd,
            kernel,
            pdata,
            mode: None,
            link_cfg: LinkConfig::default(),
            max_link_cfg: LinkConfig::default(),
            sink_cap: [0; dpcd::RECEIVER_CAP_SIZE],
            sink_cap_valid: false,
        }
    }

    pub fn hpd_asserted(&self) -> bool {
        self.hpd.asserted()
    }

    pub fn dpcd(&mut self) -> &mut Dpcd {
        &mut self.dpcd
    }

    pub fn sor(&mut self) -> &mut Sor {
        &mut self.sor
    }

    pub fn sor_ref(&self) -> &Sor {
        &self.sor
    }

    pub fn kernel(&self) -> &dyn Kernel {
        self.kernel.as_ref()
    }

    pub fn kernel_handle(&self) -> Arc<dyn Kernel> {
        self.kernel.clone()
    }

    pub fn pdata(&self) -> &DpPlatformData {
        &self.pdata
    }

    pub fn mode(&self) -> Option<&DisplayMode> {
        self.mode.as_ref()
    }

    pub fn set_mode(&mut self, mode: DisplayMode) {
        self.mode = Some(mode);
    }

    /// Caches the receiver capability block.
    pub fn dpcd_init(&mut self) -> Result {
        let mut caps = [0u8; dpcd::RECEIVER_CAP_SIZE];
        self.dpcd.read_burst(dpcd::DPCD_REV, &mut caps)?;
        self.sink_cap = caps;
        self.sink_cap_valid = true;
        debug!("dp: sink DPCD rev {:#x}", caps[0]);
        Ok(())
    }

    pub fn invalidate_sink_cap(&mut self) {
        self.sink_cap_valid = false;
    }

    fn sink_cap_byte(&mut self, addr: u32) -> Result<u8> {
        if self.sink_cap_valid {
            Ok(self.sink_cap[addr as usize])
        } else {
            Ok(self.dpcd.read(addr)?)
        }
    }

    /// Reads the sink's capabilities, applies the board caps and computes the
    /// best link configuration for the current mode. Also becomes
    /// [`DpLink::max_link_cfg`].
    pub fn init_max_link_cfg(&mut self) -> Result<LinkConfig> {
        let mut cfg = LinkConfig::default();

        let lane_cap = self.sink_cap_byte(dpcd::MAX_LANE_COUNT)?;
        cfg.max_lane_count = match lane_cap & dpcd::LANE_COUNT_MASK {
            n if n >= 4 => 4,
            n if n >= 2 => 2,
            _ => 1,
        };
        if let Some(lanes) = self.pdata.lanes.filter(|&l| l > 0 && l < cfg.max_lane_count) {
            cfg.max_lane_count = lanes;
        }
        let lane_flags = MaxLaneCountCap::from_bits_truncate(lane_cap);
        cfg.tps3_supported = lane_flags.contains(MaxLaneCountCap::TPS3_SUPPORTED);
        cfg.support_enhanced_framing = lane_flags.contains(MaxLaneCountCap::ENHANCED_FRAMING);

        let spread = MaxDownspreadCap::from_bits_truncate(self.sink_cap_byte(dpcd::MAX_DOWNSPREAD)?);
        cfg.downspread = spread.contains(MaxDownspreadCap::DOWNSPREAD_0_5);
        cfg.support_fast_lt = spread.contains(MaxDownspreadCap::NO_AUX_HANDSHAKE);

        cfg.aux_rd_interval = self.dpcd.read(dpcd::TRAINING_AUX_RD_INTERVAL)?;

        cfg.max_link_bw = LinkRate::from_dpcd_clamped(self.sink_cap_byte(dpcd::MAX_LINK_RATE)?);
        if let Some(bw) = self.pdata.link_bw.filter(|&bw| bw < cfg.max_link_bw) {
            cfg.max_link_bw = bw;
        }

        let edp = EdpConfigCap::from_bits_truncate(self.dpcd.read(dpcd::EDP_CONFIGURATION_CAP)?);
        cfg.alt_scrambler_reset_cap = edp.contains(EdpConfigCap::ALT_SCRAMBLER_RESET);
        cfg.only_enhanced_framing = edp.contains(EdpConfigCap::FRAMING_CHANGE);
        cfg.edp_cap = edp.contains(EdpConfigCap::DISPLAY_CONTROL);

        cfg.bits_per_pixel = self.pdata.bits_per_pixel.unwrap_or(24);
        cfg.lane_count = cfg.max_lane_count;
        cfg.link_bw = cfg.max_link_bw;
        cfg.enhanced_framing = cfg.support_enhanced_framing;

        if let Some(mode) = self.mode {
            calc_config(&mode, &mut cfg);
        }

        info!(
            "dp: sink max {:?} x{}, tps3 {}, fast lt {}, aux_rd_interval {}",
            cfg.max_link_bw, cfg.max_lane_count, cfg.tps3_supported, cfg.support_fast_lt, cfg.aux_rd_interval
        );

        self.max_link_cfg = cfg;
        Ok(cfg)
    }

    /// Selects `tp` on both ends of the link.
    pub fn tpg(&mut self, tp: TrainingPattern, n_lanes: u8) -> Result {
        let ret = self.dpcd.write(dpcd::TRAINING_PATTERN_SET, tp.dpcd_value());
        self.sor.tpg(tp, n_lanes);
        Ok(ret?)
    }

    pub fn set_link_bandwidth(&mut self, link_bw: LinkRate) -> Result {
        self.sor.set_link_bandwidth(link_bw);
        self.dpcd.write(dpcd::LINK_BW_SET, link_bw.code())?;
        Ok(())
    }

    /// Powers the lanes and tells the sink the lane count.
    pub fn set_lane_count(&mut self, lane_count: u8) -> Result {
        let ret = self.sor.power_lanes(lane_count, true);
        self.dpcd
            .write_field(dpcd::LANE_COUNT_SET, dpcd::LANE_COUNT_MASK, lane_count)?;
        ret
    }

    pub fn set_enhanced_framing(&mut self, enable: bool) -> Result {
        self.sor.set_enhanced_framing(enable);
        self.dpcd
            .write_field(dpcd::LANE_COUNT_SET, 1 << 7, if enable { 1 << 7 } else { 0 })?;
        Ok(())
    }

    /// Applies the prod register sequence of `link_bw`.
    pub fn link_cal(&mut self, link_bw: LinkRate) {
        let Self { sor, pdata, .. } = self;
        sor.apply_prods(pdata.prods.for_rate(link_bw));
    }

    /// Programs link rate, lane count, prods and TU packing of
    /// [`DpLink::link_cfg`] on both ends.
    pub fn update_link_config(&mut self) -> Result {
        let cfg = self.link_cfg;
        let mut ret = self.set_link_bandwidth(cfg.link_bw);
        ret = ret.and(self.set_lane_count(cfg.lane_count));
        self.link_cal(cfg.link_bw);
        self.sor.tu_config(&cfg);
        if let Err(e) = &ret {
            warn!("dp: update link config: {e}");
        }
        ret
    }

    /// Sink power state, D0 when `on`, D3 otherwise.
    pub fn panel_power(&mut self, on: bool) -> Result {
        self.dpcd.write(dpcd::SET_POWER, if on { 1 } else { 2 })?;
        Ok(())
    }

    /// Checks the link status block after an IRQ_HPD. Returns whether the
    /// link is still trained and the service IRQ vector.
    pub fn link_status(&mut self) -> Result<(bool, DeviceServiceIrq)> {
        let mut status = [0u8; 6];
        self.dpcd.read_burst(dpcd::SINK_COUNT, &mut status)?;

        let mut stable = LaneAlignStatus::from_bits_truncate(status[4])
            .contains(LaneAlignStatus::INTERLANE_ALIGN_DONE);
        if self.link_cfg.lane_count >= 4 {
            stable &= status[3] & 0x77 == 0x77;
        }
        if self.link_cfg.lane_count >= 2 {
            stable &= status[2] & 0x77 == 0x77;
        }
        stable &= status[2] & 0x07 == 0x07;

        Ok((stable, DeviceServiceIrq::from_bits_truncate(status[1])))
    }

    /// Answers the sink's automated test request. Only link training tests
    /// are acked, anything else is nacked. Returns whether a link training
    /// test was requested.
    pub fn respond_test_request(&mut self) -> Result<bool> {
        let req = self.dpcd.read(dpcd::TEST_REQUEST)?;
        let link_training = req & dpcd::TEST_LINK_TRAINING != 0;
        let response = if link_training {
            dpcd::TEST_ACK
        } else {
            info!("dp: unsupported test request {req:#x}");
            dpcd::TEST_NAK
        };
        self.dpcd.write(dpcd::TEST_RESPONSE, response)?;
        Ok(link_training)
    }
}
