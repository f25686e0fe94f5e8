//! 板级校准数据
//!
//! Maps (post-cursor2, voltage swing, pre-emphasis) levels to the register
//! codes programmed into the SOR lane level registers, and holds the per-rate
//! prod register sequences applied whenever the link rate changes.

use alloc::vec::Vec;

use dp_if::LinkRate;
use dp_if::dpcd::MAX_LEVEL;

/// Register codes for one level combination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaneCodes {
    pub pre_emphasis: u8,
    pub drive_current: u8,
    pub post_cursor: u8,
    /// Maximum TX pull-up for this combination.
    pub tx_pu: u8,
}

/// Indexed `[post_cursor2][voltage_swing][pre_emphasis]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneCalibration {
    pub table: [[[LaneCodes; 4]; 4]; 4],
}

impl LaneCalibration {
    pub fn codes(&self, pc: u8, vs: u8, pe: u8) -> LaneCodes {
        let idx = |v: u8| (v.min(MAX_LEVEL)) as usize;
        self.table[idx(pc)][idx(vs)][idx(pe)]
    }
}

const DEFAULT_DRIVE_CURRENT: [[u8; 4]; 4] = [
    [0x13, 0x19, 0x1e, 0x28],
    [0x1e, 0x25, 0x2d, 0x00],
    [0x28, 0x32, 0x00, 0x00],
    [0x3c, 0x00, 0x00, 0x00],
];

const DEFAULT_PRE_EMPHASIS: [[u8; 4]; 4] = [
    [0x00, 0x09, 0x13, 0x25],
    [0x00, 0x0f, 0x1e, 0x00],
    [0x00, 0x14, 0x00, 0x00],
    [0x00, 0x00, 0x00, 0x00],
];

const DEFAULT_TX_PU: [[u8; 4]; 4] = [
    [0x20, 0x30, 0x40, 0x60],
    [0x30, 0x40, 0x60, 0x00],
    [0x40, 0x60, 0x00, 0x00],
    [0x60, 0x00, 0x00, 0x00],
];

impl Default for LaneCalibration {
    /// Reference board values. Level combinations with swing plus
    /// pre-emphasis above 3 are not allowed and stay zero.
    fn default() -> Self {
        let mut table = [[[LaneCodes::default(); 4]; 4]; 4];
        for (pc, plane) in table.iter_mut().enumerate() {
            for vs in 0..4 {
                for pe in 0..4 - vs {
                    plane[vs][pe] = LaneCodes {
                        pre_emphasis: DEFAULT_PRE_EMPHASIS[vs][pe],
                        drive_current: DEFAULT_DRIVE_CURRENT[vs][pe],
                        post_cursor: (pc as u8) * 0x10,
                        tx_pu: DEFAULT_TX_PU[vs][pe],
                    };
                }
            }
        }
        Self { table }
    }
}

/// 寄存器配置项：对 `reg` 中 `mask` 选中的位写入 `val`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegSequence {
    pub reg: usize,
    pub mask: u32,
    pub val: u32,
}

/// Prod settings per link rate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProdSettings {
    pub rbr: Vec<RegSequence>,
    pub hbr: Vec<RegSequence>,
    pub hbr2: Vec<RegSequence>,
}

impl ProdSettings {
    pub fn for_rate(&self, rate: LinkRate) -> &[RegSequence] {
        match rate {
            LinkRate::Rbr => &self.rbr,
            LinkRate::Hbr => &self.hbr,
            LinkRate::Hbr2 => &self.hbr2,
        }
    }
}
