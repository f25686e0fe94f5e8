//! Display timing consumed by the link configuration calculator.

/// One display timing. Only the horizontal fields and the pixel clock feed the
/// link calculation, the vertical fields are carried for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayMode {
    /// Pixel clock in Hz.
    pub pclk: u64,
    pub h_active: u32,
    pub h_front_porch: u32,
    pub h_back_porch: u32,
    pub h_sync_width: u32,
    pub v_active: u32,
    pub v_front_porch: u32,
    pub v_back_porch: u32,
    pub v_sync_width: u32,
}

impl DisplayMode {
    pub fn h_blank(&self) -> u32 {
        self.h_front_porch + self.h_back_porch + self.h_sync_width
    }

    pub fn h_total(&self) -> u32 {
        self.h_active + self.h_blank()
    }

    pub fn v_total(&self) -> u32 {
        self.v_active + self.v_front_porch + self.v_back_porch + self.v_sync_width
    }

    /// Raw pixel payload in bits per second for the given colour depth.
    pub fn payload_bps(&self, bits_per_pixel: u32) -> u64 {
        self.pclk * bits_per_pixel as u64
    }

    /// 1920x1080@60, CEA-861 timing.
    pub const fn cea_1080p60() -> Self {
        Self {
            pclk: 148_500_000,
            h_active: 1920,
            h_front_porch: 88,
            h_back_porch: 148,
            h_sync_width: 44,
            v_active: 1080,
            v_front_porch: 4,
            v_back_porch: 36,
            v_sync_width: 5,
        }
    }

    /// 3840x2160@60 with CVT reduced blanking.
    pub const fn cvt_rb_2160p60() -> Self {
        Self {
            pclk: 533_250_000,
            h_active: 3840,
            h_front_porch: 48,
            h_back_porch: 80,
            h_sync_width: 32,
            v_active: 2160,
            v_front_porch: 3,
            v_back_porch: 54,
            v_sync_width: 5,
        }
    }
}
