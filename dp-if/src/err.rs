/// 单次 AUX 事务的失败原因
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuxError {
    #[error("AUX transaction timed out")]
    Timeout,
    #[error("AUX receive error")]
    Receive,
    #[error("AUX transaction NACKed by sink")]
    Nack,
    #[error("AUX defer retries exhausted")]
    DeferLimit,
    #[error("sink not plugged")]
    NotPlugged,
    #[error("invalid AUX transfer size {0}")]
    InvalidSize(usize),
}

impl AuxError {
    /// Errors the retry layer is allowed to retry without waiting for DEFER.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Receive | Self::Nack)
    }
}
