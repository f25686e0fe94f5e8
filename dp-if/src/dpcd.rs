//! DPCD 地址与位域定义 (DisplayPort 1.2 / eDP 1.3)

use bitflags::bitflags;
use num_enum::{IntoPrimitive, TryFromPrimitive};

// 接收端能力
pub const DPCD_REV: u32 = 0x000;
pub const MAX_LINK_RATE: u32 = 0x001;
pub const MAX_LANE_COUNT: u32 = 0x002;
pub const MAX_DOWNSPREAD: u32 = 0x003;
pub const EDP_CONFIGURATION_CAP: u32 = 0x00d;
pub const TRAINING_AUX_RD_INTERVAL: u32 = 0x00e;

/// Bytes 0x000..0x00f read in one go by `dpcd_init`.
pub const RECEIVER_CAP_SIZE: usize = 0x10;

// 链路配置
pub const LINK_BW_SET: u32 = 0x100;
pub const LANE_COUNT_SET: u32 = 0x101;
pub const TRAINING_PATTERN_SET: u32 = 0x102;
pub const TRAINING_LANE0_SET: u32 = 0x103;
pub const DOWNSPREAD_CTRL: u32 = 0x107;
pub const MAIN_LINK_CHANNEL_CODING_SET: u32 = 0x108;
pub const EDP_CONFIGURATION_SET: u32 = 0x10a;
pub const TRAINING_LANE0_1_SET2: u32 = 0x10f;

// 链路状态
pub const SINK_COUNT: u32 = 0x200;
pub const DEVICE_SERVICE_IRQ_VECTOR: u32 = 0x201;
pub const LANE0_1_STATUS: u32 = 0x202;
pub const LANE2_3_STATUS: u32 = 0x203;
pub const LANE_ALIGN_STATUS_UPDATED: u32 = 0x204;
pub const SINK_STATUS: u32 = 0x205;
pub const ADJUST_REQUEST_LANE0_1: u32 = 0x206;
pub const ADJUST_REQUEST_LANE2_3: u32 = 0x207;
pub const ADJUST_REQUEST_POST_CURSOR2: u32 = 0x20c;

pub const TEST_REQUEST: u32 = 0x218;
pub const TEST_RESPONSE: u32 = 0x260;
pub const SOURCE_IEEE_OUI: u32 = 0x300;
pub const SET_POWER: u32 = 0x600;

/// Largest voltage swing / pre-emphasis / post-cursor2 level.
pub const MAX_LEVEL: u8 = 3;

/// `LANE_COUNT_SET` bits 4:0.
pub const LANE_COUNT_MASK: u8 = 0x1f;
/// `TRAINING_PATTERN_SET` bit 5.
pub const TRAINING_PATTERN_SCRAMBLING_DISABLE: u8 = 1 << 5;
/// `MAIN_LINK_CHANNEL_CODING_SET` value for 8b/10b.
pub const CHANNEL_CODING_8B10B: u8 = 0x01;
/// `TEST_REQUEST` bit 0.
pub const TEST_LINK_TRAINING: u8 = 1 << 0;
pub const TEST_ACK: u8 = 1 << 0;
pub const TEST_NAK: u8 = 1 << 1;

bitflags! {
    /// `MAX_LANE_COUNT` (0x002) 的标志位
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MaxLaneCountCap: u8 {
        const TPS3_SUPPORTED = 1 << 6;
        const ENHANCED_FRAMING = 1 << 7;
    }

    /// `MAX_DOWNSPREAD` (0x003)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MaxDownspreadCap: u8 {
        const DOWNSPREAD_0_5 = 1 << 0;
        /// The sink can train without AUX handshake (fast link training).
        const NO_AUX_HANDSHAKE = 1 << 6;
    }

    /// `EDP_CONFIGURATION_CAP` (0x00d)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct EdpConfigCap: u8 {
        const ALT_SCRAMBLER_RESET = 1 << 0;
        const FRAMING_CHANGE = 1 << 1;
        const DISPLAY_CONTROL = 1 << 3;
    }

    /// Status nibble of one lane in `LANE0_1_STATUS` / `LANE2_3_STATUS`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LaneStatus: u8 {
        const CR_DONE = 1 << 0;
        const CHANNEL_EQ_DONE = 1 << 1;
        const SYMBOL_LOCKED = 1 << 2;
    }

    /// `LANE_ALIGN_STATUS_UPDATED` (0x204)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct LaneAlignStatus: u8 {
        const INTERLANE_ALIGN_DONE = 1 << 0;
        const LINK_STATUS_UPDATED = 1 << 7;
    }

    /// `DEVICE_SERVICE_IRQ_VECTOR` (0x201)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceServiceIrq: u8 {
        const REMOTE_CONTROL = 1 << 0;
        const AUTOMATED_TEST = 1 << 1;
        const CP_IRQ = 1 << 2;
        const MCCS_IRQ = 1 << 3;
        const SINK_SPECIFIC = 1 << 6;
    }
}

impl LaneStatus {
    /// Pulls the nibble of `lane` out of the status bytes starting at 0x202.
    pub fn of_lane(status: &[u8], lane: usize) -> Self {
        let byte = status.get(lane / 2).copied().unwrap_or(0);
        Self::from_bits_truncate(byte >> (4 * (lane & 1)))
    }

    pub fn channel_eq_locked(&self) -> bool {
        self.contains(Self::CHANNEL_EQ_DONE | Self::SYMBOL_LOCKED)
    }
}

/// `TRAINING_LANEx_SET` 的取值
///
/// bits 1:0 voltage swing, bit 2 max swing reached, bits 4:3 pre-emphasis,
/// bit 5 max pre-emphasis reached.
pub fn training_lane_set(vs: u8, pe: u8) -> u8 {
    let mut val = (vs & 0x3) | ((pe & 0x3) << 3);
    if vs >= MAX_LEVEL.saturating_sub(pe) {
        val |= 1 << 2;
    }
    if pe >= MAX_LEVEL.saturating_sub(vs) {
        val |= 1 << 5;
    }
    val
}

/// Nibble of `TRAINING_LANEx_1_SET2` for one lane: level in bits 1:0, max
/// reached in bit 2.
pub fn post_cursor2_set(pc: u8) -> u8 {
    let mut val = pc & 0x3;
    if pc >= MAX_LEVEL {
        val |= 1 << 2;
    }
    val
}

/// Decodes `ADJUST_REQUEST_LANEx_y` bytes into per-lane (swing, pre-emphasis)
/// requests. Even lanes use the low nibble, odd lanes the high one.
pub fn adjust_request(bytes: &[u8], lane: usize) -> (u8, u8) {
    let byte = bytes.get(lane / 2).copied().unwrap_or(0);
    let nibble = byte >> (4 * (lane & 1));
    (nibble & 0x3, (nibble >> 2) & 0x3)
}

/// Lane `lane`'s request from `ADJUST_REQUEST_POST_CURSOR2`.
pub fn adjust_request_post_cursor2(byte: u8, lane: usize) -> u8 {
    (byte >> (2 * lane)) & 0x3
}

/// Main link rate, in DPCD `LINK_BW_SET` encoding (multiples of 0.27 Gbps).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum LinkRate {
    /// 1.62 Gbps
    Rbr = 0x06,
    /// 2.7 Gbps
    Hbr = 0x0a,
    /// 5.4 Gbps
    Hbr2 = 0x14,
}

impl LinkRate {
    /// Clamps a raw `MAX_LINK_RATE` value to the nearest supported rate at or
    /// below it. Anything under HBR reads as RBR.
    pub fn from_dpcd_clamped(raw: u8) -> Self {
        if raw >= Self::Hbr2 as u8 {
            Self::Hbr2
        } else if raw >= Self::Hbr as u8 {
            Self::Hbr
        } else {
            Self::Rbr
        }
    }

    pub fn code(self) -> u8 {
        self.into()
    }

    /// Link symbol clock in Hz (one 10-bit symbol per clock per lane).
    pub fn link_clock_hz(self) -> u64 {
        27_000_000 * self.code() as u64
    }

    /// Raw per-lane bit rate in kbps.
    pub fn lane_kbps(self) -> u64 {
        270_000 * self.code() as u64
    }
}

/// Training / test pattern selector, shared by DPCD `TRAINING_PATTERN_SET`
/// and the SOR pattern generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum TrainingPattern {
    Disable = 0,
    Tps1 = 1,
    Tps2 = 2,
    Tps3 = 3,
    D102 = 4,
    SblErrRate = 5,
    Prbs7 = 6,
    Custom = 7,
    Hbr2Compliance = 8,
}

impl TrainingPattern {
    /// (8b/10b channel coding, scrambling) used by the source while sending
    /// this pattern.
    pub fn coding(self) -> (bool, bool) {
        match self {
            Self::Disable | Self::SblErrRate | Self::Hbr2Compliance => (true, true),
            Self::Tps1 | Self::Tps2 | Self::Tps3 | Self::D102 => (true, false),
            Self::Prbs7 | Self::Custom => (false, false),
        }
    }

    /// Value for DPCD `TRAINING_PATTERN_SET`. Scrambling is disabled for
    /// every pattern except [`TrainingPattern::Disable`].
    pub fn dpcd_value(self) -> u8 {
        match self {
            Self::Disable => self.into(),
            _ => u8::from(self) | TRAINING_PATTERN_SCRAMBLING_DISABLE,
        }
    }
}
