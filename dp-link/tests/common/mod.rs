#![allow(dead_code)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use dp_link::{
    AuxChannel, AuxReply, AuxRequest, DisplayMode, DpLink, DpPlatformData, Hotplug, Kernel,
    LinkTrainer, LtState, SorRegisters, err::AuxError, sor::reg,
};

pub fn init_log() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Debug)
        .is_test(true)
        .try_init();
}

/// Time only moves when someone sleeps.
#[derive(Default)]
pub struct VirtualClock {
    ns: AtomicU64,
}

impl VirtualClock {
    pub fn advance(&self, d: Duration) {
        self.ns.fetch_add(d.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Kernel for VirtualClock {
    fn delay(&self, duration: Duration) {
        self.advance(duration);
    }

    fn now(&self) -> Duration {
        Duration::from_nanos(self.ns.load(Ordering::SeqCst))
    }
}

pub struct StdKernel {
    start: Instant,
}

impl StdKernel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start: Instant::now(),
        })
    }
}

impl Kernel for StdKernel {
    fn delay(&self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}

pub struct SimHotplug(AtomicBool);

impl SimHotplug {
    pub fn new(asserted: bool) -> Arc<Self> {
        Arc::new(Self(AtomicBool::new(asserted)))
    }

    pub fn set(&self, asserted: bool) {
        self.0.store(asserted, Ordering::SeqCst);
    }
}

impl Hotplug for SimHotplug {
    fn asserted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct SorState {
    pub regs: Vec<u32>,
    pub writes: Vec<(usize, u32)>,
}

/// SOR register file. Super-state writes show up in `TEST` at once and the
/// lane sequencer finishes immediately.
#[derive(Clone)]
pub struct FakeSor(pub Arc<Mutex<SorState>>);

impl FakeSor {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(SorState {
            regs: vec![0; 0x100],
            writes: Vec::new(),
        })))
    }

    pub fn reg(&self, offset: usize) -> u32 {
        self.0.lock().unwrap().regs[offset]
    }

    pub fn writes_to(&self, offset: usize) -> usize {
        self.0
            .lock()
            .unwrap()
            .writes
            .iter()
            .filter(|(r, _)| *r == offset)
            .count()
    }

    pub fn attached(&self) -> bool {
        self.reg(reg::TEST) & (1 << 10) != 0
    }
}

impl SorRegisters for FakeSor {
    fn read(&self, offset: usize) -> u32 {
        self.0.lock().unwrap().regs[offset]
    }

    fn write(&mut self, offset: usize, val: u32) {
        let mut s = self.0.lock().unwrap();
        s.writes.push((offset, val));
        match offset {
            reg::SUPER_STATE1 => {
                let attached = (val >> 3) & 1;
                let opmode = (val >> 4) & 3;
                let test = s.regs[reg::TEST] & !(0x7 << 8);
                s.regs[reg::TEST] = test | (attached << 10) | (opmode << 8);
                s.regs[offset] = val;
            }
            reg::LANE_SEQ_CTL => s.regs[offset] = val & !(1 << 31),
            _ => s.regs[offset] = val,
        }
    }
}

/// What the sink sees of the link while computing its status.
#[derive(Debug, Clone, Copy)]
pub struct LinkView {
    pub link_bw: u8,
    pub lanes: u8,
    pub pattern: u8,
    pub vs: [u8; 4],
    pub pe: [u8; 4],
}

type Policy<T> = Box<dyn Fn(&LinkView) -> T + Send>;

pub struct SinkState {
    pub dpcd: Vec<u8>,
    pub cr: Policy<bool>,
    pub ce: Policy<bool>,
    /// Requested (swing, pre-emphasis), same for every lane.
    pub adjust: Policy<(u8, u8)>,
    /// Replies returned before normal handling, one per transaction.
    pub script: VecDeque<Result<AuxReply, AuxError>>,
    pub transfers: Vec<(AuxRequest, u32, usize)>,
    /// (LINK_BW_SET, lane count) of every lane-level update sent with TPS1.
    pub cr_attempts: Vec<(u8, u8)>,
}

impl SinkState {
    fn view(&self) -> LinkView {
        let mut vs = [0; 4];
        let mut pe = [0; 4];
        for lane in 0..4 {
            let set = self.dpcd[0x103 + lane];
            vs[lane] = set & 0x3;
            pe[lane] = (set >> 3) & 0x3;
        }
        LinkView {
            link_bw: self.dpcd[0x100],
            lanes: self.dpcd[0x101] & 0x1f,
            pattern: self.dpcd[0x102] & 0xf,
            vs,
            pe,
        }
    }

    fn refresh_status(&mut self) {
        let view = self.view();
        let cr = (self.cr)(&view);
        let ce = cr && (self.ce)(&view);
        let nibble = if ce { 0x7 } else if cr { 0x1 } else { 0x0 };
        self.dpcd[0x202] = nibble | (nibble << 4);
        self.dpcd[0x203] = nibble | (nibble << 4);
        self.dpcd[0x204] = ce as u8;

        let (vs, pe) = (self.adjust)(&view);
        let req = (vs & 0x3) | ((pe & 0x3) << 2);
        self.dpcd[0x206] = req | (req << 4);
        self.dpcd[0x207] = req | (req << 4);
    }
}

/// DPCD of a sink whose training outcome is decided by `cr` / `ce`.
#[derive(Clone)]
pub struct SimSink(pub Arc<Mutex<SinkState>>);

impl SimSink {
    pub fn new(max_link_rate: u8, max_lanes: u8) -> Self {
        let mut dpcd = vec![0u8; 0x1000];
        dpcd[0x000] = 0x12;
        dpcd[0x001] = max_link_rate;
        dpcd[0x002] = max_lanes | 0x80;
        dpcd[0x003] = 0x01;
        Self(Arc::new(Mutex::new(SinkState {
            dpcd,
            cr: Box::new(|_| true),
            ce: Box::new(|_| true),
            adjust: Box::new(|_| (0, 0)),
            script: VecDeque::new(),
            transfers: Vec::new(),
            cr_attempts: Vec::new(),
        })))
    }

    pub fn with_fast_lt(self) -> Self {
        self.0.lock().unwrap().dpcd[0x003] |= 1 << 6;
        self
    }

    /// Advertises TPS3 and post-cursor2 support.
    pub fn with_tps3(self) -> Self {
        self.0.lock().unwrap().dpcd[0x002] |= 1 << 6;
        self
    }

    pub fn set_cr(&self, f: impl Fn(&LinkView) -> bool + Send + 'static) {
        self.0.lock().unwrap().cr = Box::new(f);
    }

    pub fn set_ce(&self, f: impl Fn(&LinkView) -> bool + Send + 'static) {
        self.0.lock().unwrap().ce = Box::new(f);
    }

    pub fn set_adjust(&self, f: impl Fn(&LinkView) -> (u8, u8) + Send + 'static) {
        self.0.lock().unwrap().adjust = Box::new(f);
    }

    pub fn push_reply(&self, reply: Result<AuxReply, AuxError>) {
        self.0.lock().unwrap().script.push_back(reply);
    }

    pub fn dpcd(&self, addr: usize) -> u8 {
        self.0.lock().unwrap().dpcd[addr]
    }

    pub fn set_dpcd(&self, addr: usize, val: u8) {
        self.0.lock().unwrap().dpcd[addr] = val;
    }

    pub fn writes_to(&self, addr: u32) -> usize {
        self.0
            .lock()
            .unwrap()
            .transfers
            .iter()
            .filter(|(req, a, _)| *req == AuxRequest::Write && *a == addr)
            .count()
    }

    pub fn transfers(&self) -> Vec<(AuxRequest, u32, usize)> {
        self.0.lock().unwrap().transfers.clone()
    }

    pub fn cr_attempts(&self) -> Vec<(u8, u8)> {
        self.0.lock().unwrap().cr_attempts.clone()
    }

    pub fn cr_attempts_at(&self, link_bw: u8, lanes: u8) -> usize {
        self.cr_attempts()
            .iter()
            .filter(|&&c| c == (link_bw, lanes))
            .count()
    }
}

impl AuxChannel for SimSink {
    fn transfer(
        &mut self,
        req: AuxRequest,
        addr: u32,
        data: &mut [u8],
    ) -> Result<AuxReply, AuxError> {
        let mut s = self.0.lock().unwrap();
        s.transfers.push((req, addr, data.len()));

        match s.script.pop_front() {
            Some(Ok(AuxReply::Ack(_))) | None => {}
            Some(other) => return other,
        }

        let start = addr as usize;
        let end = start + data.len();
        match req {
            AuxRequest::Read => {
                if start <= 0x207 && end > 0x202 {
                    s.refresh_status();
                }
                data.copy_from_slice(&s.dpcd[start..end]);
            }
            AuxRequest::Write => {
                s.dpcd[start..end].copy_from_slice(data);
                if start == 0x103 && s.dpcd[0x102] & 0xf == 1 {
                    let view = s.view();
                    s.cr_attempts.push((view.link_bw, view.lanes));
                }
            }
        }
        Ok(AuxReply::Ack(data.len()))
    }
}

pub struct Rig {
    pub sink: SimSink,
    pub sor: FakeSor,
    pub hpd: Arc<SimHotplug>,
}

impl Rig {
    pub fn new(sink: SimSink) -> Self {
        Self {
            sink,
            sor: FakeSor::new(),
            hpd: SimHotplug::new(true),
        }
    }

    pub fn link(&self, kernel: Arc<dyn Kernel>) -> DpLink {
        self.link_with(kernel, DpPlatformData::default())
    }

    pub fn link_with(&self, kernel: Arc<dyn Kernel>, pdata: DpPlatformData) -> DpLink {
        DpLink::new(
            Box::new(self.sink.clone()),
            Box::new(self.sor.clone()),
            self.hpd.clone(),
            kernel,
            pdata,
        )
    }

    /// Link with sink caps read and the best configuration for `mode`
    /// selected, ready for a trainer.
    pub fn configured_link(&self, kernel: Arc<dyn Kernel>, mode: DisplayMode) -> DpLink {
        self.configured_link_with(kernel, mode, DpPlatformData::default())
    }

    pub fn configured_link_with(
        &self,
        kernel: Arc<dyn Kernel>,
        mode: DisplayMode,
        pdata: DpPlatformData,
    ) -> DpLink {
        let mut link = self.link_with(kernel, pdata);
        link.set_mode(mode);
        link.dpcd_init().unwrap();
        let max = link.init_max_link_cfg().unwrap();
        link.link_cfg = max;
        link
    }
}

/// Runs scheduled work until nothing is scheduled, sleeping on `kernel` in
/// between. Returns the state after every run.
pub fn drive(trainer: &LinkTrainer, kernel: &dyn Kernel) -> Vec<LtState> {
    let mut states = Vec::new();
    while let Some(wait) = trainer.next_run_in() {
        kernel.delay(wait);
        if trainer.run_pending() {
            states.push(trainer.state());
        }
        assert!(states.len() < 500, "trainer never settled: {states:?}");
    }
    states
}

/// One scheduled run.
pub fn step(trainer: &LinkTrainer, kernel: &dyn Kernel) -> LtState {
    let wait = trainer.next_run_in().expect("nothing scheduled");
    kernel.delay(wait);
    assert!(trainer.run_pending());
    trainer.state()
}

pub fn mode_5gbps() -> DisplayMode {
    DisplayMode {
        pclk: 208_333_333,
        h_active: 1920,
        h_front_porch: 48,
        h_back_porch: 80,
        h_sync_width: 32,
        v_active: 1200,
        ..Default::default()
    }
}

pub fn mode_vga() -> DisplayMode {
    DisplayMode {
        pclk: 25_175_000,
        h_active: 640,
        h_front_porch: 16,
        h_back_porch: 48,
        h_sync_width: 96,
        v_active: 480,
        v_front_porch: 10,
        v_back_porch: 33,
        v_sync_width: 2,
    }
}
