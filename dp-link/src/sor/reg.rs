//! SOR 寄存器定义
//!
//! Offsets are 32-bit word indices into the SOR aperture.

use tock_registers::register_bitfields;

pub const SUPER_STATE0: usize = 0x01;
pub const SUPER_STATE1: usize = 0x02;
pub const STATE0: usize = 0x03;
pub const STATE1: usize = 0x04;
pub const CLK_CNTRL: usize = 0x13;
pub const TEST: usize = 0x16;
pub const PLL1: usize = 0x18;
pub const PLL3: usize = 0x1a;
pub const LANE_SEQ_CTL: usize = 0x21;
pub const XBAR_CTRL: usize = 0x23;
pub const XBAR_POL: usize = 0x24;
pub const DP_TPG: usize = 0x6d;

pub const fn dp_linkctl(port: usize) -> usize {
    0x4c + port
}

/// Per-lane drive current (voltage swing) codes.
pub const fn lane_drive_current(port: usize) -> usize {
    0x4e + port
}

pub const fn lane_preemphasis(port: usize) -> usize {
    0x52 + port
}

pub const fn lane_postcursor(port: usize) -> usize {
    0x56 + port
}

pub const fn dp_config(port: usize) -> usize {
    0x58 + port
}

pub const fn dp_padctl(port: usize) -> usize {
    0x5c + port
}

/// Width of one crossbar select in `XBAR_CTRL`.
pub const XBAR_SEL_BITS: u32 = 3;
/// Bit of lane 0's select in `XBAR_CTRL`.
pub const XBAR_SEL_SHIFT: u32 = 2;

/// Per-lane stride in `DP_TPG`.
pub const TPG_LANE_SHIFT: u32 = 8;

register_bitfields![u32,
    pub SUPER_STATE0 [
        /// Latch the ASY state written to `SUPER_STATE1`
        UPDATE OFFSET(0) NUMBITS(1) []
    ],

    pub SUPER_STATE1 [
        /// Requested head operating mode
        ASY_HEAD_OPMODE OFFSET(4) NUMBITS(2) [
            Sleep = 0,
            Snooze = 1,
            Awake = 2
        ],
        ASY_ORMODE OFFSET(2) NUMBITS(1) [
            Safe = 0,
            Normal = 1
        ],
        ATTACHED OFFSET(3) NUMBITS(1) []
    ],

    pub CLK_CNTRL [
        /// Link rate, in DPCD `LINK_BW_SET` encoding
        DP_LINK_SPEED OFFSET(2) NUMBITS(5) [
            G1_62 = 0x06,
            G2_7 = 0x0a,
            G5_4 = 0x14
        ],
        DP_CLK_SEL OFFSET(0) NUMBITS(2) [
            SingleDpClk = 2,
            DiffDpClk = 3
        ]
    ],

    pub TEST [
        ATTACHED OFFSET(10) NUMBITS(1) [],
        /// Head operating mode currently in effect
        ACT_HEAD_OPMODE OFFSET(8) NUMBITS(2) [
            Sleep = 0,
            Snooze = 1,
            Awake = 2
        ]
    ],

    pub PLL1 [
        LOADADJ OFFSET(20) NUMBITS(4) [],
        TMDS_TERM OFFSET(8) NUMBITS(1) []
    ],

    pub PLL3 [
        PLLVDD_MODE OFFSET(13) NUMBITS(1) [
            V1_8 = 0,
            V3_3 = 1
        ]
    ],

    pub LANE_SEQ_CTL [
        /// Write 1 to start the sequencer, reads back 0 when done
        SETTING_NEW OFFSET(31) NUMBITS(1) [
            Done = 0,
            Trigger = 1
        ],
        SEQ_STATE OFFSET(28) NUMBITS(1) [
            Idle = 0,
            Busy = 1
        ],
        SEQUENCE OFFSET(20) NUMBITS(1) [
            Up = 0,
            Down = 1
        ],
        NEW_POWER_STATE OFFSET(16) NUMBITS(1) [
            PowerUp = 0,
            PowerDown = 1
        ],
        DELAY OFFSET(12) NUMBITS(4) []
    ],

    pub DP_LINKCTL [
        ENABLE OFFSET(0) NUMBITS(1) [],
        TUSIZE OFFSET(2) NUMBITS(7) [],
        ENHANCEDFRAME OFFSET(14) NUMBITS(1) [],
        LANECOUNT OFFSET(16) NUMBITS(5) [
            Zero = 0,
            One = 1,
            Two = 3,
            Four = 0xf
        ]
    ],

    pub DP_CONFIG [
        WATERMARK OFFSET(0) NUMBITS(6) [],
        ACTIVESYM_COUNT OFFSET(8) NUMBITS(7) [],
        ACTIVESYM_FRAC OFFSET(16) NUMBITS(4) [],
        ACTIVESYM_POLARITY OFFSET(24) NUMBITS(1) [
            Negative = 0,
            Positive = 1
        ],
        ACTIVESYM_CNTL OFFSET(26) NUMBITS(1) [],
        IDLE_BEFORE_ATTACH OFFSET(27) NUMBITS(1) [],
        RD_RESET_VAL OFFSET(31) NUMBITS(1) [
            Negative = 0,
            Positive = 1
        ]
    ],

    pub DP_PADCTL [
        /// Lane power, 1 = powered. Physical lane 3 sits at bit 0.
        PD_TXD OFFSET(0) NUMBITS(4) [],
        /// Common-mode precharge, same lane layout as `PD_TXD`
        COMODE_TXD OFFSET(4) NUMBITS(4) [],
        TX_PU_VALUE OFFSET(8) NUMBITS(8) [],
        TX_PU OFFSET(22) NUMBITS(1) [
            Disable = 0,
            Enable = 1
        ]
    ],

    pub LANE_LEVEL [
        /// Byte of each physical lane in the drive current / pre-emphasis /
        /// post-cursor registers
        LANE2 OFFSET(0) NUMBITS(8) [],
        LANE1 OFFSET(8) NUMBITS(8) [],
        LANE0 OFFSET(16) NUMBITS(8) [],
        LANE3 OFFSET(24) NUMBITS(8) []
    ],

    pub DP_TPG [
        LANE0_PATTERN OFFSET(0) NUMBITS(4) [],
        LANE0_SCRAMBLEREN OFFSET(4) NUMBITS(1) [],
        LANE0_CHANNELCODING OFFSET(6) NUMBITS(1) []
    ]
];
