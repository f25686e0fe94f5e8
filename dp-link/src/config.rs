//! 链路配置计算
//!
//! Derives the transfer-unit packing (TU size, active symbols, fraction,
//! polarity), the watermark and the blanking symbol counts that let a display
//! mode be carried over a given lane count and link rate.

use dp_if::{DisplayMode, LinkRate};

/// Fixed-point precision factor of the calculation.
const PRECISION: u64 = 100_000;
const MAX_WATERMARK: u32 = 30;

/// (rate, lanes) pairs tried while reducing the link, in order.
pub const LINK_CONFIG_PRIORITY: [(LinkRate, u8); 9] = [
    (LinkRate::Hbr2, 4),
    (LinkRate::Hbr, 4),
    (LinkRate::Rbr, 4),
    (LinkRate::Hbr2, 2),
    (LinkRate::Hbr, 2),
    (LinkRate::Rbr, 2),
    (LinkRate::Hbr2, 1),
    (LinkRate::Hbr, 1),
    (LinkRate::Rbr, 1),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// Set only when the calculator accepted this configuration.
    pub is_valid: bool,

    // 接收端能力
    pub max_lane_count: u8,
    pub max_link_bw: LinkRate,
    pub support_enhanced_framing: bool,
    pub tps3_supported: bool,
    /// No-AUX-handshake link training supported.
    pub support_fast_lt: bool,
    pub aux_rd_interval: u8,
    pub downspread: bool,
    pub alt_scrambler_reset_cap: bool,
    pub only_enhanced_framing: bool,
    pub edp_cap: bool,

    // 当前链路
    pub lane_count: u8,
    pub link_bw: LinkRate,
    pub enhanced_framing: bool,
    pub bits_per_pixel: u32,

    // 计算结果
    pub tu_size: u32,
    pub active_count: u32,
    pub active_frac: u32,
    pub activepolarity: bool,
    pub watermark: u32,
    pub hblank_sym: u32,
    pub vblank_sym: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            is_valid: false,
            max_lane_count: 0,
            max_link_bw: LinkRate::Rbr,
            support_enhanced_framing: false,
            tps3_supported: false,
            support_fast_lt: false,
            aux_rd_interval: 0,
            downspread: false,
            alt_scrambler_reset_cap: false,
            only_enhanced_framing: false,
            edp_cap: false,
            lane_count: 0,
            link_bw: LinkRate::Rbr,
            enhanced_framing: false,
            bits_per_pixel: 24,
            tu_size: 64,
            active_count: 0,
            active_frac: 0,
            activepolarity: false,
            watermark: 0,
            hblank_sym: 0,
            vblank_sym: 0,
        }
    }
}

impl LinkConfig {
    /// Total raw bandwidth of the current link in kbps.
    pub fn link_bandwidth_kbps(&self) -> u64 {
        self.link_bw.lane_kbps() * self.lane_count as u64
    }

    /// Index of the current (rate, lanes) pair in [`LINK_CONFIG_PRIORITY`].
    pub fn priority_index(&self) -> Option<usize> {
        LINK_CONFIG_PRIORITY
            .iter()
            .position(|&(bw, lanes)| bw == self.link_bw && lanes == self.lane_count)
    }
}

/// Next entry of [`LINK_CONFIG_PRIORITY`] after the current (rate, lanes)
/// pair that fits inside the sink's maximum rate and lane count.
///
/// `None` when the current pair is not on the ladder or nothing below it fits.
pub fn next_lower_link_config(cfg: &LinkConfig) -> Option<(LinkRate, u8)> {
    let idx = cfg.priority_index()?;
    LINK_CONFIG_PRIORITY[idx + 1..]
        .iter()
        .copied()
        .find(|&(bw, lanes)| bw <= cfg.max_link_bw && lanes <= cfg.max_lane_count)
}

/// Fills the TU / watermark / blanking fields of `cfg` for `mode` at the
/// configured rate, lane count and colour depth.
///
/// Returns whether the link can carry the mode. `cfg.is_valid` mirrors the
/// result. The packing fields are still written when only the watermark check
/// fails.
pub fn calc_config(mode: &DisplayMode, cfg: &mut LinkConfig) -> bool {
    let f = PRECISION;
    let link_rate = cfg.link_bw.link_clock_hz();
    let lanes = cfg.lane_count as u64;
    let bpp = cfg.bits_per_pixel as u64;
    let pclk = mode.pclk;

    cfg.is_valid = false;

    if link_rate == 0 || lanes == 0 || pclk == 0 || bpp == 0 {
        return false;
    }

    if pclk * bpp >= link_rate * 8 * lanes {
        debug!(
            "dp: mode needs {} bps, link {:?} x{} carries {} bps",
            pclk * bpp,
            cfg.link_bw,
            lanes,
            link_rate * 8 * lanes
        );
        return false;
    }

    let num_linkclk_line = link_rate * mode.h_active as u64 / pclk;
    let ratio_f = pclk * bpp * f / 8 / (link_rate * lanes);

    let mut activefrac: u64 = 0;
    let mut lowest_neg_error_f = 64 * f;
    let mut lowest_neg_tusize = 64u64;
    let mut lowest_neg_activecount = 0u64;
    let mut lowest_neg_activepolarity = false;
    let mut lowest_neg_activefrac = 0u64;

    for tu in (32..=64u64).rev() {
        let activesym_f = ratio_f * tu;
        let activecount_f = activesym_f / f * f;
        let mut frac_f = activesym_f - activecount_f;
        let activecount = activecount_f / f;

        let mut activepolarity = if frac_f < f / 2 {
            false
        } else {
            frac_f = f - frac_f;
            true
        };

        // activefrac 在 frac_f 为 0 时沿用上一轮的值
        if frac_f != 0 {
            let inv_frac_f = f * f / frac_f;
            activefrac = if inv_frac_f > 15 * f {
                if activepolarity { 1 } else { 15 }
            } else if activepolarity {
                inv_frac_f / f + 1
            } else {
                inv_frac_f / f
            };
        }

        if activefrac == 1 {
            activepolarity = false;
        }

        let approx_value_f = if activepolarity {
            if activefrac != 0 {
                (activecount_f + (activefrac * f - f) * f) / (activefrac * f)
            } else {
                activecount_f + f
            }
        } else if activefrac != 0 {
            activecount_f + f / activefrac
        } else {
            activecount_f
        };

        let (accumulated_error_f, neg) = if activesym_f < approx_value_f {
            (num_linkclk_line * ((approx_value_f - activesym_f) / tu), true)
        } else {
            (num_linkclk_line * ((activesym_f - approx_value_f) / tu), false)
        };

        if (neg && lowest_neg_error_f > accumulated_error_f) || accumulated_error_f == 0 {
            lowest_neg_error_f = accumulated_error_f;
            lowest_neg_tusize = tu;
            lowest_neg_activecount = activecount;
            lowest_neg_activepolarity = activepolarity;
            lowest_neg_activefrac = activefrac;

            if accumulated_error_f == 0 {
                break;
            }
        }
    }

    if lowest_neg_activefrac == 0 {
        cfg.activepolarity = false;
        cfg.active_count = if lowest_neg_activepolarity {
            lowest_neg_activecount as u32
        } else {
            (lowest_neg_activecount as u32).saturating_sub(1)
        };
        cfg.tu_size = lowest_neg_tusize as u32;
        cfg.active_frac = 1;
    } else {
        cfg.activepolarity = lowest_neg_activepolarity;
        cfg.active_count = lowest_neg_activecount as u32;
        cfg.tu_size = lowest_neg_tusize as u32;
        cfg.active_frac = lowest_neg_activefrac as u32;
    }

    debug!(
        "dp: sor configuration: polarity: {} active count: {} tu size: {}, active frac: {}",
        cfg.activepolarity as u8, cfg.active_count, cfg.tu_size, cfg.active_frac
    );

    let watermark_f = ratio_f * cfg.tu_size as u64 * (f - ratio_f) / f;
    cfg.watermark = ((watermark_f + lowest_neg_error_f) / f) as u32 + cfg.bits_per_pixel / 4 - 1;
    let num_symbols_per_line = mode.h_active * cfg.bits_per_pixel / (8 * cfg.lane_count as u32);

    if cfg.watermark > MAX_WATERMARK {
        debug!("dp: sor setting: unable to get a good tusize, force watermark to 30");
        cfg.watermark = MAX_WATERMARK;
        return false;
    } else if cfg.watermark > num_symbols_per_line {
        debug!("dp: sor setting: force watermark to the number of symbols in the line");
        cfg.watermark = num_symbols_per_line;
        return false;
    }

    let h_blank = (mode.h_back_porch + mode.h_front_porch + mode.h_sync_width) as i64 - 7;
    let hblank_sym = h_blank * link_rate as i64 / pclk as i64
        - 3 * cfg.enhanced_framing as i64
        - 12 / lanes as i64;
    cfg.hblank_sym = hblank_sym.max(0) as u32;

    let vblank_sym = (mode.h_active as i64 - 25) * link_rate as i64 / pclk as i64
        - 36 / lanes as i64
        - 4;
    cfg.vblank_sym = vblank_sym.max(0) as u32;

    cfg.is_valid = true;
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(link_bw: LinkRate, lane_count: u8) -> LinkConfig {
        LinkConfig {
            max_lane_count: 4,
            max_link_bw: LinkRate::Hbr2,
            lane_count,
            link_bw,
            enhanced_framing: true,
            ..Default::default()
        }
    }

    fn mode_5gbps() -> DisplayMode {
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

    #[test]
    fn calc_1080p_hbr2_x4() {
        let mut c = cfg(LinkRate::Hbr2, 4);
        assert!(calc_config(&DisplayMode::cea_1080p60(), &mut c));
        assert!(c.is_valid);
        assert_eq!(c.tu_size, 64);
        assert_eq!(c.active_count, 13);
        assert_eq!(c.active_frac, 5);
        assert!(!c.activepolarity);
        assert_eq!(c.watermark, 15);
        assert_eq!(c.hblank_sym, 986);
        assert_eq!(c.vblank_sym, 6877);
    }

    #[test]
    fn calc_rejects_rate_at_capacity() {
        // 54 MHz at 24 bpp exactly fills one RBR lane
        let mode = DisplayMode {
            pclk: 54_000_000,
            h_active: 640,
            h_front_porch: 16,
            h_back_porch: 48,
            h_sync_width: 96,
            ..Default::default()
        };
        let mut c = cfg(LinkRate::Rbr, 1);
        assert!(!calc_config(&mode, &mut c));
        assert!(!c.is_valid);
    }

    #[test]
    fn calc_rejects_zero_inputs() {
        let mut c = cfg(LinkRate::Hbr2, 0);
        assert!(!calc_config(&DisplayMode::cea_1080p60(), &mut c));
        let mut c = cfg(LinkRate::Hbr2, 4);
        assert!(!calc_config(&DisplayMode::default(), &mut c));
        c.bits_per_pixel = 0;
        assert!(!calc_config(&DisplayMode::cea_1080p60(), &mut c));
    }

    #[test]
    fn calc_4k_needs_full_link() {
        let mode = DisplayMode::cvt_rb_2160p60();
        let mut c = cfg(LinkRate::Hbr2, 4);
        assert!(calc_config(&mode, &mut c));
        assert_eq!(c.tu_size, 46);
        assert_eq!(c.watermark, 14);
        for &(bw, lanes) in &LINK_CONFIG_PRIORITY[1..] {
            let mut c = cfg(bw, lanes);
            assert!(!calc_config(&mode, &mut c), "{bw:?} x{lanes}");
        }
    }

    #[test]
    fn calc_5gbps_mode_fits_down_to_hbr2_x2() {
        let mode = mode_5gbps();
        let expect = [true, true, true, true, false, false, false, false, false];
        for (&(bw, lanes), ok) in LINK_CONFIG_PRIORITY.iter().zip(expect) {
            let mut c = cfg(bw, lanes);
            assert_eq!(calc_config(&mode, &mut c), ok, "{bw:?} x{lanes}");
            assert_eq!(c.is_valid, ok);
            if ok {
                assert!(c.watermark <= 30);
                assert!((32..=64).contains(&c.tu_size));
            }
        }
    }

    #[test]
    fn valid_configs_carry_the_payload() {
        let mode = mode_5gbps();
        for &(bw, lanes) in LINK_CONFIG_PRIORITY.iter() {
            let mut c = cfg(bw, lanes);
            if calc_config(&mode, &mut c) {
                assert!(mode.payload_bps(24) < bw.link_clock_hz() * 8 * lanes as u64);
            }
        }
    }

    #[test]
    fn ladder_walks_down_within_sink_caps() {
        let mut c = cfg(LinkRate::Hbr2, 4);
        let mut seen = 0;
        let mut last = c.priority_index();
        while let Some((bw, lanes)) = next_lower_link_config(&c) {
            c.link_bw = bw;
            c.lane_count = lanes;
            let idx = c.priority_index();
            assert!(idx > last);
            last = idx;
            seen += 1;
        }
        assert_eq!(seen, 8);
        assert_eq!((c.link_bw, c.lane_count), (LinkRate::Rbr, 1));
    }

    #[test]
    fn ladder_skips_entries_above_caps() {
        let mut c = cfg(LinkRate::Hbr, 2);
        c.max_link_bw = LinkRate::Hbr;
        c.max_lane_count = 2;
        assert_eq!(next_lower_link_config(&c), Some((LinkRate::Rbr, 2)));
        c.link_bw = LinkRate::Rbr;
        assert_eq!(next_lower_link_config(&c), Some((LinkRate::Hbr, 1)));
    }

    #[test]
    fn ladder_rejects_off_table_pairs() {
        let c = cfg(LinkRate::Hbr2, 3);
        assert_eq!(next_lower_link_config(&c), None);
        let c = cfg(LinkRate::Rbr, 1);
        assert_eq!(next_lower_link_config(&c), None);
    }

    #[test]
    fn common_modes_fit_some_ladder_entry() {
        let hd = DisplayMode {
            pclk: 74_250_000,
            h_active: 1280,
            h_front_porch: 110,
            h_back_porch: 220,
            h_sync_width: 40,
            v_active: 720,
            ..Default::default()
        };
        let vga = DisplayMode {
            pclk: 25_175_000,
            h_active: 640,
            h_front_porch: 16,
            h_back_porch: 48,
            h_sync_width: 96,
            v_active: 480,
            ..Default::default()
        };
        let modes = [vga, hd, DisplayMode::cea_1080p60(), mode_5gbps(), DisplayMode::cvt_rb_2160p60()];
        for mode in modes {
            let fits = LINK_CONFIG_PRIORITY.iter().filter(|&&(bw, lanes)| {
                let mut c = cfg(bw, lanes);
                calc_config(&mode, &mut c) && c.watermark <= MAX_WATERMARK
            });
            assert!(fits.count() >= 1, "{}x{}", mode.h_active, mode.v_active);
        }

        // VGA fits everywhere, 720p everywhere but RBR x1
        let count = |mode: &DisplayMode| {
            LINK_CONFIG_PRIORITY
                .iter()
                .filter(|&&(bw, lanes)| calc_config(mode, &mut cfg(bw, lanes)))
                .count()
        };
        assert_eq!(count(&vga), 9);
        assert_eq!(count(&hd), 8);
    }
}
