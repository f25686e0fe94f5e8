//! SOR (Serial Output Resource) 时序控制
//!
//! Register-level helpers for the DisplayPort transmitter: pattern generator,
//! lane power and precharge, link rate / lane count, per-lane drive levels,
//! TU configuration and the attach / detach super-state sequences.

use alloc::{boxed::Box, sync::Arc};
use core::time::Duration;

use dp_if::{LinkRate, TrainingPattern, host::SorRegisters};
use tock_registers::{
    LocalRegisterCopy, RegisterLongName,
    fields::{Field, FieldValue},
};

use crate::{
    calib::RegSequence,
    config::LinkConfig,
    err::*,
    osal::{Kernel, poll_timeout, sleep_range_us},
};

mod mmio;
pub mod reg;

pub use mmio::MmioSor;

use reg::*;

const SOR_POLL_INTERVAL: Duration = Duration::from_micros(100);
const SOR_TIMEOUT: Duration = Duration::from_millis(1000);
const SOR_ATTACH_TIMEOUT: Duration = Duration::from_millis(1000);
/// PLLs in the analog macro need up to 200us to settle after a rate change.
const LINK_SPEED_SETTLE_US: u64 = 300;
const LANE_SEQ_DELAY: u32 = 15;

pub struct Sor {
    regs: Box<dyn SorRegisters>,
    kernel: Arc<dyn Kernel>,
    portnum: usize,
    xbar_ctrl: [u8; 5],
    attached: bool,
}

impl Sor {
    pub fn new(
        regs: Box<dyn SorRegisters>,
        kernel: Arc<dyn Kernel>,
        portnum: usize,
        xbar_ctrl: [u8; 5],
    ) -> Self {
        Self {
            regs,
            kernel,
            portnum,
            xbar_ctrl,
            attached: false,
        }
    }

    pub fn writel(&mut self, reg: usize, val: u32) {
        self.regs.write(reg, val);
    }

    pub fn write_field(&mut self, reg: usize, mask: u32, val: u32) {
        let old = self.regs.read(reg);
        self.regs.write(reg, (old & !mask) | (val & mask));
    }

    fn read_reg<R: RegisterLongName>(&self, reg: usize) -> LocalRegisterCopy<u32, R> {
        LocalRegisterCopy::new(self.regs.read(reg))
    }

    fn modify<R: RegisterLongName>(&mut self, reg: usize, field: FieldValue<u32, R>) {
        let mut val = self.read_reg::<R>(reg);
        val.modify(field);
        self.regs.write(reg, val.get());
    }

    fn poll<R: RegisterLongName>(
        &self,
        reg: usize,
        field: Field<u32, R>,
        expected: u32,
        timeout: Duration,
    ) -> Result {
        let ok = poll_timeout(self.kernel.as_ref(), SOR_POLL_INTERVAL, timeout, || {
            self.read_reg::<R>(reg).read(field) == expected
        });
        if ok {
            Ok(())
        } else {
            error!("sor: timeout polling reg {reg:#x} for {expected:#x}");
            Err(DpError::SorTimeout { reg })
        }
    }

    pub fn portnum(&self) -> usize {
        self.portnum
    }

    pub fn xbar_ctrl(&self) -> &[u8; 5] {
        &self.xbar_ctrl
    }

    /// Physical lane carrying logical lane `lane`.
    pub fn physical_lane(&self, lane: usize) -> usize {
        self.xbar_ctrl.get(lane).copied().unwrap_or(0) as usize
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Programs the pattern generator for the first `n_lanes` lanes.
    pub fn tpg(&mut self, tp: TrainingPattern, n_lanes: u8) {
        let (coding, scrambled) = tp.coding();
        let mut lane = LocalRegisterCopy::<u32, DP_TPG::Register>::new(0);
        lane.modify(
            DP_TPG::LANE0_PATTERN.val(u8::from(tp) as u32)
                + DP_TPG::LANE0_CHANNELCODING.val(coding as u32)
                + DP_TPG::LANE0_SCRAMBLEREN.val(scrambled as u32),
        );
        let val = (0..n_lanes as u32)
            .map(|cnt| lane.get() << (TPG_LANE_SHIFT * cnt))
            .fold(0, |acc, v| acc | v);
        self.writel(DP_TPG, val);
    }

    /// `PD_TXD` / `COMODE_TXD` bitmap of the physical lanes used by the
    /// first `lane_count` logical lanes.
    pub fn pd_tx_bitmap(&self, lane_count: u8) -> u32 {
        let mut val = 0;
        for i in 0..lane_count as usize {
            match self.physical_lane(i) {
                0 => val |= 1 << 1,
                1 => val |= 1 << 2,
                2 => val |= 1 << 3,
                3 => val |= 1 << 0,
                other => error!("sor: incorrect lane {other} in crossbar"),
            }
        }
        val
    }

    /// Drives common mode on the active lanes for at least 10us.
    pub fn precharge_lanes(&mut self, lane_count: u8) {
        let pad = dp_padctl(self.portnum);
        let bitmap = self.pd_tx_bitmap(lane_count);
        self.modify(pad, DP_PADCTL::COMODE_TXD.val(bitmap));
        sleep_range_us(self.kernel.as_ref(), 20, 100);
        self.modify(pad, DP_PADCTL::COMODE_TXD.val(0));
    }

    pub fn set_lane_count(&mut self, lane_count: u8) {
        let field = match lane_count {
            0 => DP_LINKCTL::LANECOUNT::Zero,
            1 => DP_LINKCTL::LANECOUNT::One,
            2 => DP_LINKCTL::LANECOUNT::Two,
            4 => DP_LINKCTL::LANECOUNT::Four,
            _ => {
                error!("sor: invalid lane count {lane_count}");
                return;
            }
        };
        self.modify(dp_linkctl(self.portnum), field);
    }

    fn lane_sequencer(&mut self, power_up: bool) -> Result {
        self.poll(
            LANE_SEQ_CTL,
            LANE_SEQ_CTL::SETTING_NEW,
            LANE_SEQ_CTL::SETTING_NEW::Value::Done as u32,
            SOR_TIMEOUT,
        )?;

        let seq = if power_up {
            LANE_SEQ_CTL::SEQUENCE::Up + LANE_SEQ_CTL::NEW_POWER_STATE::PowerUp
        } else {
            LANE_SEQ_CTL::SEQUENCE::Down + LANE_SEQ_CTL::NEW_POWER_STATE::PowerDown
        };
        let mut val = LocalRegisterCopy::<u32, LANE_SEQ_CTL::Register>::new(0);
        val.modify(LANE_SEQ_CTL::SETTING_NEW::Trigger + LANE_SEQ_CTL::DELAY.val(LANE_SEQ_DELAY) + seq);
        self.writel(LANE_SEQ_CTL, val.get());

        self.poll(
            LANE_SEQ_CTL,
            LANE_SEQ_CTL::SETTING_NEW,
            LANE_SEQ_CTL::SETTING_NEW::Value::Done as u32,
            SOR_TIMEOUT,
        )
    }

    /// Powers the first `lane_count` lanes up, or every lane down.
    pub fn power_lanes(&mut self, lane_count: u8, power_up: bool) -> Result {
        if power_up {
            let bitmap = self.pd_tx_bitmap(lane_count);
            self.modify(dp_padctl(self.portnum), DP_PADCTL::PD_TXD.val(bitmap));
            self.set_lane_count(lane_count);
        }
        self.lane_sequencer(power_up)
    }

    pub fn set_link_bandwidth(&mut self, link_bw: LinkRate) {
        if self.attached {
            warn!("sor: changing link rate while attached");
        }
        self.modify(CLK_CNTRL, CLK_CNTRL::DP_LINK_SPEED.val(link_bw.code() as u32));
        sleep_range_us(self.kernel.as_ref(), LINK_SPEED_SETTLE_US, LINK_SPEED_SETTLE_US);
    }

    /// Reads back (lane count, link rate) from the hardware.
    pub fn read_link_config(&self) -> (u8, Option<LinkRate>) {
        let lanes = match self
            .read_reg::<DP_LINKCTL::Register>(dp_linkctl(self.portnum))
            .read(DP_LINKCTL::LANECOUNT)
        {
            0xf => 4,
            0x3 => 2,
            0x1 => 1,
            _ => 0,
        };
        let speed = self
            .read_reg::<CLK_CNTRL::Register>(CLK_CNTRL)
            .read(CLK_CNTRL::DP_LINK_SPEED);
        (lanes, LinkRate::try_from(speed as u8).ok())
    }

    pub fn config_xbar(&mut self) {
        let val = self
            .xbar_ctrl
            .iter()
            .enumerate()
            .fold(0u32, |acc, (i, &sel)| {
                acc | ((sel as u32 & 0x7) << (XBAR_SEL_SHIFT + XBAR_SEL_BITS * i as u32))
            });
        self.write_field(XBAR_CTRL, 0x7fff << XBAR_SEL_SHIFT, val);
        self.writel(XBAR_POL, 0);
    }

    pub fn port_enable(&mut self, enable: bool) {
        self.modify(dp_linkctl(self.portnum), DP_LINKCTL::ENABLE.val(enable as u32));
    }

    pub fn set_enhanced_framing(&mut self, enable: bool) {
        self.modify(
            dp_linkctl(self.portnum),
            DP_LINKCTL::ENHANCEDFRAME.val(enable as u32),
        );
    }

    pub fn set_idle_before_attach(&mut self, enable: bool) {
        self.modify(
            dp_config(self.portnum),
            DP_CONFIG::IDLE_BEFORE_ATTACH.val(enable as u32),
        );
    }

    /// Writes the calculated transfer-unit packing.
    pub fn tu_config(&mut self, cfg: &LinkConfig) {
        self.modify(dp_linkctl(self.portnum), DP_LINKCTL::TUSIZE.val(cfg.tu_size));

        let polarity = if cfg.activepolarity {
            DP_CONFIG::ACTIVESYM_POLARITY::Positive
        } else {
            DP_CONFIG::ACTIVESYM_POLARITY::Negative
        };
        self.modify(
            dp_config(self.portnum),
            DP_CONFIG::WATERMARK.val(cfg.watermark)
                + DP_CONFIG::ACTIVESYM_COUNT.val(cfg.active_count)
                + DP_CONFIG::ACTIVESYM_FRAC.val(cfg.active_frac)
                + polarity
                + DP_CONFIG::ACTIVESYM_CNTL::SET
                + DP_CONFIG::RD_RESET_VAL::Positive,
        );
    }

    fn lane_field(phys_lane: usize) -> Field<u32, LANE_LEVEL::Register> {
        match phys_lane {
            0 => LANE_LEVEL::LANE0,
            1 => LANE_LEVEL::LANE1,
            2 => LANE_LEVEL::LANE2,
            _ => LANE_LEVEL::LANE3,
        }
    }

    /// Register codes of one physical lane. `post_cursor` is skipped when
    /// `None`.
    pub fn set_lane_levels(
        &mut self,
        phys_lane: usize,
        pre_emphasis: u8,
        drive_current: u8,
        post_cursor: Option<u8>,
    ) {
        let field = Self::lane_field(phys_lane);
        self.modify(lane_preemphasis(self.portnum), field.val(pre_emphasis as u32));
        self.modify(lane_drive_current(self.portnum), field.val(drive_current as u32));
        if let Some(pc) = post_cursor {
            self.modify(lane_postcursor(self.portnum), field.val(pc as u32));
        }
    }

    pub fn lane_levels(&self, phys_lane: usize) -> (u8, u8, u8) {
        let field = Self::lane_field(phys_lane);
        let get = |reg| self.read_reg::<LANE_LEVEL::Register>(reg).read(field) as u8;
        (
            get(lane_preemphasis(self.portnum)),
            get(lane_drive_current(self.portnum)),
            get(lane_postcursor(self.portnum)),
        )
    }

    /// TX pull-up. `None` disables the pull-up.
    pub fn set_tx_pu(&mut self, tx_pu: Option<u8>) {
        let pad = dp_padctl(self.portnum);
        match tx_pu {
            Some(val) => self.modify(
                pad,
                DP_PADCTL::TX_PU_VALUE.val(val as u32) + DP_PADCTL::TX_PU::Enable,
            ),
            None => self.modify(pad, DP_PADCTL::TX_PU::Disable),
        }
    }

    pub fn apply_prods(&mut self, prods: &[RegSequence]) {
        for seq in prods {
            self.write_field(seq.reg, seq.mask, seq.val);
        }
    }

    fn super_update(&mut self) {
        self.writel(SUPER_STATE0, 0);
        self.writel(SUPER_STATE0, 1);
        self.writel(SUPER_STATE0, 0);
    }

    fn write_super_state(&mut self, opmode: FieldValue<u32, SUPER_STATE1::Register>, attached: bool) {
        let mut val = LocalRegisterCopy::<u32, SUPER_STATE1::Register>::new(0);
        val.modify(opmode + SUPER_STATE1::ATTACHED.val(attached as u32));
        self.writel(SUPER_STATE1, val.get());
        self.super_update();
    }

    /// Connects the SOR to the head and wakes it up.
    pub fn attach(&mut self) -> Result {
        if self.attached {
            return Ok(());
        }

        self.write_super_state(
            SUPER_STATE1::ASY_HEAD_OPMODE::Sleep + SUPER_STATE1::ASY_ORMODE::Safe,
            true,
        );
        self.poll(TEST, TEST::ATTACHED, 1, SOR_ATTACH_TIMEOUT)?;

        self.write_super_state(
            SUPER_STATE1::ASY_HEAD_OPMODE::Sleep + SUPER_STATE1::ASY_ORMODE::Normal,
            true,
        );
        self.write_super_state(
            SUPER_STATE1::ASY_HEAD_OPMODE::Awake + SUPER_STATE1::ASY_ORMODE::Normal,
            true,
        );
        self.poll(
            TEST,
            TEST::ACT_HEAD_OPMODE,
            TEST::ACT_HEAD_OPMODE::Value::Awake as u32,
            SOR_ATTACH_TIMEOUT,
        )?;

        self.attached = true;
        debug!("sor: attached");
        Ok(())
    }

    /// Puts the head to sleep in safe mode and detaches the SOR. Lane count
    /// and link rate may only change while detached.
    pub fn detach(&mut self) -> Result {
        if !self.attached {
            return Ok(());
        }

        self.write_super_state(
            SUPER_STATE1::ASY_HEAD_OPMODE::Sleep + SUPER_STATE1::ASY_ORMODE::Safe,
            false,
        );
        self.attached = false;
        self.poll(TEST, TEST::ATTACHED, 0, SOR_ATTACH_TIMEOUT)?;
        self.writel(STATE1, 0);
        debug!("sor: detached");
        Ok(())
    }
}
