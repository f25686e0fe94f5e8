//! DisplayPort 链路训练状态机
//!
//! One [`LinkTrainer`] per output. The state handlers run one at a time from
//! [`LinkTrainer::run_pending`] (or the [`LinkTrainer::run`] loop); every
//! handler picks the next state and a delay, and scheduling a run always
//! replaces the previously scheduled one.
//!
//! Hotplug and IRQ notifications are queued as [`LtEvent`]s and raise a
//! pending event. The next worker run drains the queue and restarts from
//! [`LtState::Reset`], after [`HPD_DROP_TIMEOUT`] when the last HPD edge it
//! saw was an unplug.

use alloc::sync::Arc;
use core::time::Duration;

use crossbeam::queue::SegQueue;
use dp_if::TrainingPattern;
use spin::Mutex;

use crate::{
    config::{calc_config, next_lower_link_config},
    dp::DpLink,
    osal::{Kernel, SpinWhile, sleep_range_us},
    sync::{Completion, CompletionWait},
};

pub mod lanes;
pub mod state;

pub use lanes::{LaneSettings, LtData, is_vs_already_max};
pub use state::LtState;

pub const CR_RETRY_LIMIT: u32 = 5;
pub const CE_RETRY_LIMIT: u32 = 5;
/// Debounce before restarting after the sink dropped HPD.
pub const HPD_DROP_TIMEOUT: Duration = Duration::from_millis(1500);
/// Upper bound callers wait for training to finish.
pub const LT_TIMEOUT: Duration = Duration::from_millis(10000);

type Transition = (LtState, Option<Duration>);

/// Notification queued for the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LtEvent {
    /// HPD edge seen by the hotplug interrupt.
    HotplugChanged(bool),
    /// Short HPD pulse, only sent by a plugged sink.
    IrqHpd,
    Retrain,
}

impl LtEvent {
    /// HPD level implied by the event, if any.
    fn hpd(self) -> Option<bool> {
        match self {
            Self::HotplugChanged(asserted) => Some(asserted),
            Self::IrqHpd => Some(true),
            Self::Retrain => None,
        }
    }
}

struct LinkInner {
    link: DpLink,
    lt: LtData,
}

struct LtControl {
    state: LtState,
    pending_evt: bool,
    force_disable: bool,
    force_trigger: bool,
    shutdown: bool,
    /// Kernel time the worker is due, `None` when nothing is scheduled.
    deadline: Option<Duration>,
}

pub struct LinkTrainer {
    /// Hardware and per-attempt data. Held for a whole handler.
    link: Mutex<LinkInner>,
    /// State and request flags. Always taken after `link`.
    ctrl: Mutex<LtControl>,
    events: SegQueue<LtEvent>,
    done: Completion,
    kernel: Arc<dyn Kernel>,
}

impl LinkTrainer {
    pub fn new(link: DpLink) -> Self {
        let kernel = link.kernel_handle();
        let lt = LtData::new(&link.link_cfg);
        Self {
            link: Mutex::new(LinkInner { link, lt }),
            ctrl: Mutex::new(LtControl {
                state: LtState::Reset,
                pending_evt: false,
                force_disable: false,
                force_trigger: false,
                shutdown: false,
                deadline: None,
            }),
            events: SegQueue::new(),
            done: Completion::new(),
            kernel,
        }
    }

    pub fn state(&self) -> LtState {
        self.ctrl.lock().state
    }

    /// Runs `f` on the link with the worker excluded.
    pub fn with_link<R>(&self, f: impl FnOnce(&mut DpLink) -> R) -> R {
        let mut inner = self.link.lock();
        f(&mut inner.link)
    }

    /// Snapshot of the per-attempt training data.
    pub fn lt_data(&self) -> LtData {
        self.link.lock().lt.clone()
    }

    /// Drops the proven configuration and the lane levels after the link
    /// was reprogrammed from outside.
    pub fn reset_training_data(&self) {
        let mut inner = self.link.lock();
        let LinkInner { link, lt } = &mut *inner;
        lt.sw_reset(&link.link_cfg);
        lt.tps = TrainingPattern::Disable;
    }

    /// Live CR + CE + alignment check against the sink, regardless of the
    /// state machine's view.
    pub fn get_status(&self) -> bool {
        let mut inner = self.link.lock();
        let LinkInner { link, lt } = &mut *inner;
        lt.lt_status(link)
    }

    /// Requests a fresh training pass.
    pub fn request_retrain(&self) {
        self.notify(LtEvent::Retrain);
    }

    /// Retrain even if the link currently looks trained.
    pub fn force_retrain(&self) {
        self.ctrl.lock().force_trigger = true;
        self.set_pending_evt();
    }

    /// Takes the link down at the next worker run. Consumed by the reset
    /// state.
    pub fn force_disable(&self) {
        self.ctrl.lock().force_disable = true;
        self.set_pending_evt();
    }

    pub fn notify_hotplug(&self, asserted: bool) {
        self.notify(LtEvent::HotplugChanged(asserted));
    }

    pub fn notify(&self, event: LtEvent) {
        self.events.push(event);
        self.set_pending_evt();
    }

    fn set_pending_evt(&self) {
        let mut ctrl = self.ctrl.lock();
        ctrl.pending_evt = true;
        self.done.reinit();
        self.sched_lt_work(&mut ctrl, Some(Duration::ZERO));
    }

    /// Blocks until the machine reaches `DonePass` or `DoneFail` after the
    /// last request. `false` on timeout; the machine keeps running.
    pub fn wait_for_completion(&self, timeout: Duration) -> bool {
        self.done.wait_timeout(self.kernel.as_ref(), timeout)
    }

    pub fn completion(&self) -> CompletionWait<'_> {
        self.done.wait()
    }

    /// Stops any further scheduling.
    pub fn shutdown(&self) {
        let mut ctrl = self.ctrl.lock();
        ctrl.shutdown = true;
        ctrl.deadline = None;
    }

    pub fn is_shutdown(&self) -> bool {
        self.ctrl.lock().shutdown
    }

    /// Time until the next scheduled worker run.
    pub fn next_run_in(&self) -> Option<Duration> {
        let deadline = self.ctrl.lock().deadline?;
        Some(deadline.saturating_sub(self.kernel.now()))
    }

    fn work_due(&self) -> bool {
        let ctrl = self.ctrl.lock();
        !ctrl.shutdown && ctrl.deadline.is_some_and(|d| d <= self.kernel.now())
    }

    /// Executes the scheduled worker run if it is due. Returns whether a run
    /// happened.
    pub fn run_pending(&self) -> bool {
        {
            let mut ctrl = self.ctrl.lock();
            match ctrl.deadline {
                Some(d) if !ctrl.shutdown && d <= self.kernel.now() => ctrl.deadline = None,
                _ => return false,
            }
        }
        self.lt_worker();
        true
    }

    /// Worker loop, returns after [`LinkTrainer::shutdown`].
    pub async fn run(&self) {
        loop {
            SpinWhile::new(|| !self.is_shutdown() && !self.work_due()).await;
            if self.is_shutdown() {
                break;
            }
            self.run_pending();
        }
    }

    fn sched_lt_work(&self, ctrl: &mut LtControl, delay: Option<Duration>) {
        ctrl.deadline = delay
            .filter(|_| !ctrl.shutdown)
            .map(|delay| self.kernel.now() + delay);
    }

    fn set_lt_state(&self, target: LtState, delay: Option<Duration>) {
        let mut ctrl = self.ctrl.lock();
        info!("dp lt: switching from state {} to state {}", ctrl.state, target);
        ctrl.state = target;

        if target.is_terminal() {
            self.done.complete_all();
        }

        // a pending event already has an immediate run scheduled
        if !ctrl.pending_evt {
            self.sched_lt_work(&mut ctrl, delay);
        }
    }

    fn lt_worker(&self) {
        let mut guard = self.link.lock();
        let inner = &mut *guard;

        let (pending_evt, state) = {
            let mut ctrl = self.ctrl.lock();
            let pending = ctrl.pending_evt;
            ctrl.pending_evt = false;
            (pending, ctrl.state)
        };
        // the latest edge wins over the sampled line
        let mut cur_hpd = inner.link.hpd_asserted();
        if pending_evt {
            while let Some(event) = self.events.pop() {
                debug!("dp lt: event {event:?}");
                if let Some(hpd) = event.hpd() {
                    cur_hpd = hpd;
                }
            }
        }

        info!("dp lt: state {state}, hpd {cur_hpd}, pending_lt_evt {pending_evt}");

        let (target, delay) = if pending_evt {
            self.handle_lt_hpd_evt(cur_hpd)
        } else {
            match state {
                LtState::Reset => self.reset_state(inner),
                LtState::FastLt => self.fast_lt_state(inner),
                LtState::ClockRecovery => self.clock_recovery_state(inner),
                LtState::ChannelEqualization => self.channel_equalization_state(inner),
                LtState::ReduceBitRate => self.reduce_bit_rate_state(inner),
                LtState::DoneFail | LtState::DonePass => {
                    warn!("dp lt: no state handler in state {state}");
                    return;
                }
            }
        };

        self.set_lt_state(target, delay);
    }

    fn handle_lt_hpd_evt(&self, cur_hpd: bool) -> Transition {
        let force_disable = self.ctrl.lock().force_disable;
        if !cur_hpd && !force_disable {
            (LtState::Reset, Some(HPD_DROP_TIMEOUT))
        } else {
            (LtState::Reset, Some(Duration::ZERO))
        }
    }

    fn lt_failed(&self, inner: &mut LinkInner) {
        let LinkInner { link, lt } = &mut *inner;
        if let Err(e) = link.sor().detach() {
            warn!("dp lt: detach: {e}");
        }
        lt.set_training_pattern(link, TrainingPattern::Disable);
        lt.reset(link);
    }

    fn lt_passed(&self, inner: &mut LinkInner) {
        let LinkInner { link, lt } = &mut *inner;
        lt.lt_config_valid = true;
        lt.set_training_pattern(link, TrainingPattern::Disable);
        if let Err(e) = link.sor().attach() {
            warn!("dp lt: attach: {e}");
        }
    }

    fn hpd_dropped(&self, inner: &mut LinkInner) -> Option<Transition> {
        if inner.link.hpd_asserted() {
            return None;
        }
        info!("dp lt: hpd deasserted, wait for sometime, then reset");
        self.lt_failed(inner);
        Some((LtState::Reset, Some(HPD_DROP_TIMEOUT)))
    }

    fn reset_state(&self, inner: &mut LinkInner) -> Transition {
        let cur_hpd = inner.link.hpd_asserted();
        let (force_disable, force_trigger) = {
            let ctrl = self.ctrl.lock();
            (ctrl.force_disable, ctrl.force_trigger)
        };

        if !cur_hpd || !inner.link.link_cfg.is_valid || force_disable {
            info!(
                "dp lt: cur_hpd: {}, link cfg valid: {}, force disable: {}",
                cur_hpd, inner.link.link_cfg.is_valid, force_disable
            );
            self.lt_failed(inner);
            let mut ctrl = self.ctrl.lock();
            ctrl.force_disable = false;
            ctrl.force_trigger = false;
            return (LtState::DoneFail, None);
        }

        if !force_trigger && inner.lt.lt_config_valid && inner.lt.lt_status(&mut inner.link) {
            info!("dp lt: link stable, do nothing");
            self.lt_passed(inner);
            return (LtState::DonePass, None);
        }
        self.ctrl.lock().force_trigger = false;

        let LinkInner { link, lt } = &mut *inner;

        // lane count and link rate only change while detached
        if let Err(e) = link.sor().detach() {
            warn!("dp lt: detach: {e}");
        }

        let target = if lt.lt_config_valid && lt.no_aux_handshake {
            LtState::FastLt
        } else {
            lt.reset(link);
            LtState::ClockRecovery
        };

        if lt.tps != TrainingPattern::Disable {
            warn!("dp lt: training pattern {:?} still enabled at reset", lt.tps);
        }

        let lanes = link.link_cfg.lane_count;
        link.sor().precharge_lanes(lanes);

        (target, Some(Duration::ZERO))
    }

    #[cfg(not(feature = "fast_lt_handshake"))]
    fn do_fast_lt(&self, inner: &mut LinkInner) -> bool {
        let LinkInner { link, lt } = &mut *inner;

        lt.set_training_pattern(link, TrainingPattern::Tps1);
        sleep_range_us(link.kernel(), 500, 600);

        let eq_pattern = if lt.tps3_supported {
            TrainingPattern::Tps3
        } else {
            TrainingPattern::Tps2
        };
        lt.set_training_pattern(link, eq_pattern);
        sleep_range_us(link.kernel(), 500, 600);

        lt.lt_status(link)
    }

    #[cfg(feature = "fast_lt_handshake")]
    fn do_fast_lt(&self, inner: &mut LinkInner) -> bool {
        let LinkInner { link, lt } = &mut *inner;

        lt.set_training_pattern(link, TrainingPattern::Tps1);
        lt.apply_lane_settings(link);
        lt.wait_aux_training(link, true);
        if !lt.clock_recovery_status(link) {
            return false;
        }

        let eq_pattern = if lt.tps3_supported {
            TrainingPattern::Tps3
        } else {
            TrainingPattern::Tps2
        };
        lt.set_training_pattern(link, eq_pattern);
        lt.wait_aux_training(link, false);

        lt.lt_status(link)
    }

    fn fast_lt_state(&self, inner: &mut LinkInner) -> Transition {
        if let Some(t) = self.hpd_dropped(inner) {
            return t;
        }

        let transition = if self.do_fast_lt(inner) {
            self.lt_passed(inner);
            (LtState::DonePass, None)
        } else {
            inner.lt.reset(&mut inner.link);
            (LtState::ClockRecovery, Some(Duration::ZERO))
        };

        info!(
            "dp lt: fast link training {}",
            if transition.0 == LtState::DonePass { "pass" } else { "fail" }
        );
        transition
    }

    fn reduce_bit_rate_state(&self, inner: &mut LinkInner) -> Transition {
        if let Some(t) = self.hpd_dropped(inner) {
            return t;
        }

        inner.link.link_cfg.is_valid = false;
        let mode = inner.link.mode().copied();
        let mut cfg = inner.link.link_cfg;

        let next = next_lower_link_config(&cfg).and_then(|(bw, lanes)| {
            cfg.link_bw = bw;
            cfg.lane_count = lanes;
            calc_config(&mode?, &mut cfg).then_some(cfg)
        });

        let Some(mut cfg) = next else {
            info!("dp lt: bit rate already lowest");
            self.lt_failed(inner);
            return (LtState::DoneFail, None);
        };

        cfg.is_valid = true;
        inner.link.link_cfg = cfg;
        if let Err(e) = inner.link.update_link_config() {
            warn!("dp lt: update link config: {e}");
        }

        inner.lt.n_lanes = cfg.lane_count;
        inner.lt.link_bw = cfg.link_bw;

        info!(
            "dp lt: retry CR, lanes: {}, link_bw: {:#x} ({} kbps)",
            cfg.lane_count,
            cfg.link_bw.code(),
            cfg.link_bandwidth_kbps()
        );
        (LtState::ClockRecovery, Some(Duration::ZERO))
    }

    fn channel_equalization_state(&self, inner: &mut LinkInner) -> Transition {
        if let Some(t) = self.hpd_dropped(inner) {
            return t;
        }

        let LinkInner { link, lt } = &mut *inner;

        let eq_pattern = if lt.tps3_supported {
            TrainingPattern::Tps3
        } else {
            TrainingPattern::Tps2
        };
        lt.set_training_pattern(link, eq_pattern);
        lt.wait_aux_training(link, false);

        if !lt.clock_recovery_status(link) {
            lt.sw_reset(&link.link_cfg);
            info!("dp lt: CR lost");
            return (LtState::ReduceBitRate, Some(Duration::ZERO));
        }

        if lt.channel_eq_status(link) {
            info!("dp lt: CE done");
            self.lt_passed(inner);
            return (LtState::DonePass, None);
        }
        info!("dp lt: CE not done");

        lt.ce_retry += 1;
        if lt.ce_retry > CE_RETRY_LIMIT + 1 {
            info!("dp lt: CE retry limit {} reached", lt.ce_retry - 2);
            lt.sw_reset(&link.link_cfg);
            return (LtState::ReduceBitRate, Some(Duration::ZERO));
        }

        if let Err(e) = lt.requested_lane_settings(link) {
            warn!("dp lt: read adjust request: {e}");
        }
        lt.apply_lane_settings(link);

        info!("dp lt: CE retry");
        (LtState::ChannelEqualization, Some(Duration::ZERO))
    }

    fn clock_recovery_state(&self, inner: &mut LinkInner) -> Transition {
        if let Some(t) = self.hpd_dropped(inner) {
            return t;
        }

        let LinkInner { link, lt } = &mut *inner;

        lt.set_training_pattern(link, TrainingPattern::Tps1);
        lt.apply_lane_settings(link);
        lt.wait_aux_training(link, true);

        if lt.clock_recovery_status(link) {
            lt.cr_retry = 0;
            info!("dp lt: CR done");
            return (LtState::ChannelEqualization, Some(Duration::ZERO));
        }
        info!("dp lt: CR not done");

        let vs_temp = lt.lanes.drive_current;
        if let Err(e) = lt.requested_lane_settings(link) {
            warn!("dp lt: read adjust request: {e}");
        }

        if vs_temp == lt.lanes.drive_current {
            let vs_max = is_vs_already_max(lt.n_lanes, &vs_temp, &lt.lanes.drive_current);
            // retry counter only advances when swing is not at max
            let give_up = vs_max || {
                let limit_hit = lt.cr_retry >= CR_RETRY_LIMIT - 1;
                lt.cr_retry += 1;
                limit_hit
            };
            if give_up {
                info!(
                    "dp lt: CR retry limit {} {}reached",
                    lt.cr_retry,
                    if vs_max { "for max vs " } else { "" }
                );
                lt.sw_reset(&link.link_cfg);
                return (LtState::ReduceBitRate, Some(Duration::ZERO));
            }
        } else {
            lt.cr_retry = 1;
        }

        info!("dp lt: CR retry");
        (LtState::ClockRecovery, Some(Duration::ZERO))
    }
}
