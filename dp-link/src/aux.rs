//! DPCD access over the AUX channel with the usual DEFER / NACK retries.

use alloc::{boxed::Box, sync::Arc};

use dp_if::err::AuxError;
use dp_if::host::{AUX_MAX_PAYLOAD, AuxChannel, AuxReply, AuxRequest};

use crate::osal::{Kernel, sleep_range_us};

/// Retries allowed after the sink answers DEFER.
pub const AUX_DEFER_MAX_TRIES: u32 = 7;
/// Retries allowed after a timeout, receive error or NACK.
pub const AUX_TIMEOUT_MAX_TRIES: u32 = 2;
const AUX_RETRY_SLEEP_US: u64 = 400;

pub struct Dpcd {
    aux: Box<dyn AuxChannel>,
    kernel: Arc<dyn Kernel>,
}

impl Dpcd {
    pub fn new(aux: Box<dyn AuxChannel>, kernel: Arc<dyn Kernel>) -> Self {
        Self { aux, kernel }
    }

    fn transaction(
        &mut self,
        req: AuxRequest,
        addr: u32,
        data: &mut [u8],
    ) -> Result<usize, AuxError> {
        if data.is_empty() || data.len() > AUX_MAX_PAYLOAD {
            return Err(AuxError::InvalidSize(data.len()));
        }

        let mut defer_retries = 0;
        let mut timeout_retries = 0;
        loop {
            let err = match self.aux.transfer(req, addr, data) {
                Ok(AuxReply::Ack(n)) => return Ok(n.min(data.len())),
                Ok(AuxReply::Defer) => {
                    defer_retries += 1;
                    if defer_retries > AUX_DEFER_MAX_TRIES {
                        return Err(AuxError::DeferLimit);
                    }
                    AuxError::DeferLimit
                }
                Ok(AuxReply::Nack) => {
                    timeout_retries += 1;
                    if timeout_retries > AUX_TIMEOUT_MAX_TRIES {
                        return Err(AuxError::Nack);
                    }
                    AuxError::Nack
                }
                Err(e) if e.is_retryable() => {
                    timeout_retries += 1;
                    if timeout_retries > AUX_TIMEOUT_MAX_TRIES {
                        return Err(e);
                    }
                    e
                }
                Err(e) => return Err(e),
            };
            debug!("dp: aux {req:?} @{addr:#x} retry after {err:?}");
            sleep_range_us(self.kernel.as_ref(), AUX_RETRY_SLEEP_US, AUX_RETRY_SLEEP_US + 100);
        }
    }

    pub fn read(&mut self, addr: u32) -> Result<u8, AuxError> {
        let mut buf = [0u8; 1];
        self.read_burst(addr, &mut buf)?;
        Ok(buf[0])
    }

    pub fn write(&mut self, addr: u32, val: u8) -> Result<(), AuxError> {
        self.write_burst(addr, &[val])
    }

    /// Reads `buf.len()` bytes, split into AUX-sized chunks.
    pub fn read_burst(&mut self, addr: u32, buf: &mut [u8]) -> Result<(), AuxError> {
        let mut done = 0;
        while done < buf.len() {
            let end = (done + AUX_MAX_PAYLOAD).min(buf.len());
            let n = self.transaction(AuxRequest::Read, addr + done as u32, &mut buf[done..end])?;
            if n == 0 {
                return Err(AuxError::Receive);
            }
            done += n;
        }
        Ok(())
    }

    pub fn write_burst(&mut self, addr: u32, data: &[u8]) -> Result<(), AuxError> {
        let mut done = 0;
        let mut chunk = [0u8; AUX_MAX_PAYLOAD];
        while done < data.len() {
            let len = (data.len() - done).min(AUX_MAX_PAYLOAD);
            chunk[..len].copy_from_slice(&data[done..done + len]);
            let n = self.transaction(AuxRequest::Write, addr + done as u32, &mut chunk[..len])?;
            if n == 0 {
                return Err(AuxError::Receive);
            }
            done += n;
        }
        Ok(())
    }

    /// Read-modify-write of the bits selected by `mask`.
    pub fn write_field(&mut self, addr: u32, mask: u8, val: u8) -> Result<(), AuxError> {
        let old = self.read(addr)?;
        self.write(addr, (old & !mask) | (val & mask))
    }
}
