use core::fmt::Display;

use num_enum::{IntoPrimitive, TryFromPrimitive};

/// Link training state. The numbering is what the worker logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum LtState {
    Reset = 0,
    FastLt = 1,
    ClockRecovery = 2,
    ChannelEqualization = 3,
    DoneFail = 4,
    DonePass = 5,
    ReduceBitRate = 6,
}

impl LtState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Reset => "Reset",
            Self::FastLt => "fast lt",
            Self::ClockRecovery => "clock recovery",
            Self::ChannelEqualization => "channel equalization",
            Self::DoneFail => "link training fail/disable",
            Self::DonePass => "link training pass",
            Self::ReduceBitRate => "reduce bit rate",
        }
    }

    /// `DonePass` and `DoneFail` have no handler and release waiters.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::DonePass | Self::DoneFail)
    }
}

impl Display for LtState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} ({})", u8::from(*self), self.name())
    }
}
