use core::ptr::NonNull;

use dp_if::host::SorRegisters;

/// 内存映射的 SOR 寄存器窗口
pub struct MmioSor {
    base: usize,
}

// The aperture is owned by this driver instance.
unsafe impl Send for MmioSor {}

impl MmioSor {
    /// # Safety
    ///
    /// 调用者必须确保 `base` 指向有效的 SOR 寄存器区域，且在实例存活期间不被其他代码访问
    pub unsafe fn new(base: NonNull<u8>) -> Self {
        Self {
            base: base.as_ptr() as usize,
        }
    }

    #[inline]
    fn addr(&self, reg: usize) -> usize {
        self.base + reg * 4
    }
}

impl SorRegisters for MmioSor {
    fn read(&self, reg: usize) -> u32 {
        let addr = self.addr(reg) as *const u32;
        unsafe { addr.read_volatile() }
    }

    fn write(&mut self, reg: usize, val: u32) {
        let addr = self.addr(reg) as *mut u32;
        unsafe {
            addr.write_volatile(val);
        }
    }
}
