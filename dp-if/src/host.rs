use alloc::boxed::Box;

use crate::err::AuxError;

/// Native AUX request type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxRequest {
    Read,
    Write,
}

/// Reply of one native AUX transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxReply {
    /// Sink acked, with the number of bytes actually transferred.
    Ack(usize),
    Nack,
    Defer,
}

/// AUX 通道控制器
///
/// One call is one native AUX transaction of at most [`AUX_MAX_PAYLOAD`]
/// bytes. Retrying DEFER / NACK is done by the caller.
pub trait AuxChannel: Send + 'static {
    fn transfer(
        &mut self,
        req: AuxRequest,
        addr: u32,
        data: &mut [u8],
    ) -> Result<AuxReply, AuxError>;
}

pub const AUX_MAX_PAYLOAD: usize = 16;

/// 32-bit SOR register file, addressed by word index.
pub trait SorRegisters: Send + 'static {
    fn read(&self, reg: usize) -> u32;
    fn write(&mut self, reg: usize, val: u32);
}

/// Hot-plug-detect line of the sink.
pub trait Hotplug: Send + Sync + 'static {
    fn asserted(&self) -> bool;
}

#[derive(thiserror::Error, Debug)]
pub enum DpError {
    #[error("AUX error: {0}")]
    Aux(#[from] AuxError),
    #[error("Timeout")]
    Timeout,
    #[error("SOR register {reg:#x} poll timed out")]
    SorTimeout { reg: usize },
    #[error("No display mode set")]
    NoMode,
    #[error("Link configuration not valid for this mode")]
    InvalidLinkConfig,
    #[error("Link training failed")]
    LinkTrainingFailed,
    #[error("Output not enabled")]
    NotEnabled,
    #[error("Other error: {0}")]
    Other(#[from] Box<dyn core::error::Error + Send + Sync>),
}
