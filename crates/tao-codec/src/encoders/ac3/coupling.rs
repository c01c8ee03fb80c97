//! 声道耦合.
//!
//! 耦合起点以上的高频部分由各参与声道相加成单一耦合声道,
//! 每个参与声道只发送每频带的能量比例 (耦合坐标).

use super::coef::CoefType;
use super::config::Ac3Setup;
use super::context::{Ac3Frame, CplCoords};
use super::dsp::{Ac3Dsp, extract_exponent};
use super::tables::{
    AC3_MAX_CHANNELS, AC3_MAX_COEFS, AC3_MAX_CPL_SUBBANDS, CPL_CH, CPL_FIRST_BIN,
    CPL_SUBBAND_SIZE, DEFAULT_CPL_BAND_STRUCT, LFE_COEFS,
};

/// 建立期确定的耦合布局
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouplingSetup {
    /// 起始子带 (0..=15)
    pub start_band: usize,
    /// 结束子带 (不含)
    pub end_band: usize,
    pub num_subbands: usize,
    /// 合并后的频带数
    pub num_bands: usize,
    /// 各频带的系数数
    pub band_sizes: [usize; AC3_MAX_CPL_SUBBANDS],
    pub start_freq: usize,
    pub end_freq: usize,
}

impl CouplingSetup {
    /// 由起始子带与带宽码建立耦合布局, 起始子带被限制在结束子带之前
    pub fn new(start_band: u8, bandwidth_code: u8) -> Self {
        let end_band = usize::from(bandwidth_code) / 4 + 3;
        let start_band = usize::from(start_band).min(end_band - 1).min(15);

        let mut band_sizes = [0; AC3_MAX_CPL_SUBBANDS];
        let mut num_bands = 0;
        for sb in start_band..end_band {
            if sb > start_band && DEFAULT_CPL_BAND_STRUCT[sb] != 0 {
                band_sizes[num_bands - 1] += CPL_SUBBAND_SIZE;
            } else {
                band_sizes[num_bands] = CPL_SUBBAND_SIZE;
                num_bands += 1;
            }
        }

        Self {
            start_band,
            end_band,
            num_subbands: end_band - start_band,
            num_bands,
            band_sizes,
            start_freq: start_band * CPL_SUBBAND_SIZE + CPL_FIRST_BIN,
            end_freq: end_band * CPL_SUBBAND_SIZE + CPL_FIRST_BIN,
        }
    }
}

/// 决定各块的耦合参与情况与各声道的结束系数
pub(super) fn compute_coupling_strategy<T: CoefType>(frame: &mut Ac3Frame<T>, setup: &Ac3Setup) {
    let fbw = setup.fbw_channels;
    let mut got_cpl_snr = false;
    let mut num_cpl_blocks = 0;

    for blk in 0..frame.num_blocks {
        let (prev, rest) = frame.blocks.split_at_mut(blk);
        let block = &mut rest[0];
        let prev = prev.last();

        block.channel_in_cpl = [false; AC3_MAX_CHANNELS];
        if setup.cpl.is_some() {
            block.channel_in_cpl[1..=fbw].fill(true);
        }
        block.num_cpl_channels = block.channel_in_cpl.iter().filter(|&&c| c).count();
        block.cpl_in_use = block.num_cpl_channels > 1;
        if !block.cpl_in_use {
            block.channel_in_cpl = [false; AC3_MAX_CHANNELS];
            block.num_cpl_channels = 0;
        } else {
            num_cpl_blocks += 1;
        }

        block.new_cpl_strategy = prev.is_none_or(|p| {
            p.cpl_in_use != block.cpl_in_use || p.channel_in_cpl != block.channel_in_cpl
        });
        block.new_cpl_leak = block.new_cpl_strategy;

        block.new_snr_offsets = blk == 0 || (block.cpl_in_use && !got_cpl_snr);
        got_cpl_snr |= block.cpl_in_use;
    }
    frame.cpl_on = num_cpl_blocks > 0;

    let fbw_end = setup.fbw_end_freq();
    for block in frame.blocks.iter_mut() {
        block.new_cpl_coords = [false; AC3_MAX_CHANNELS];
        block.start_freq = [0; AC3_MAX_CHANNELS];
        block.end_freq = [0; AC3_MAX_CHANNELS];
        if let Some(cpl) = &setup.cpl {
            block.start_freq[CPL_CH] = cpl.start_freq;
            block.end_freq[CPL_CH] = cpl.end_freq;
        }
        for ch in 1..=fbw {
            block.end_freq[ch] = match &setup.cpl {
                Some(cpl) if block.channel_in_cpl[ch] => cpl.start_freq,
                _ => fbw_end,
            };
        }
        if let Some(lfe) = setup.lfe_channel() {
            block.end_freq[lfe] = LFE_COEFS;
        }
    }
}

type BandArray<E> = [[E; AC3_MAX_CPL_SUBBANDS]; AC3_MAX_CHANNELS];

/// 生成耦合声道系数并计算量化后的耦合坐标
pub(super) fn apply_channel_coupling<T: CoefType>(
    frame: &mut Ac3Frame<T>,
    setup: &Ac3Setup,
    dsp: &dyn Ac3Dsp,
) {
    let Some(cpl) = setup.cpl.as_ref() else {
        return;
    };
    let fbw = setup.fbw_channels;
    let nblk = frame.num_blocks;
    let num_bands = cpl.num_bands;
    let (start, end) = (cpl.start_freq, cpl.end_freq);

    // 参与声道相加得到耦合声道
    for blk in 0..nblk {
        let block = &frame.blocks[blk];
        let mut sum = [T::default(); AC3_MAX_COEFS];
        if block.cpl_in_use {
            for ch in (1..=fbw).filter(|&ch| block.channel_in_cpl[ch]) {
                let coef = frame.mdct_coef.get(blk, ch);
                for (s, &c) in sum[start..end].iter_mut().zip(&coef[start..end]) {
                    *s = *s + c;
                }
            }
            for s in sum[start..end].iter_mut() {
                *s = s.clip();
            }
        }
        frame.mdct_coef.get_mut(blk, CPL_CH).copy_from_slice(&sum);
    }

    // 各频带能量
    let mut energy: Vec<BandArray<T::Energy>> = vec![Default::default(); nblk];
    for blk in 0..nblk {
        let block = &frame.blocks[blk];
        if !block.cpl_in_use {
            continue;
        }
        for ch in (CPL_CH..=fbw).filter(|&ch| ch == CPL_CH || block.channel_in_cpl[ch]) {
            let coef = frame.mdct_coef.get(blk, ch);
            let mut i = start;
            for (bnd, &size) in cpl.band_sizes[..num_bands].iter().enumerate() {
                for &v in &coef[i..i + size] {
                    energy[blk][ch][bnd] += v.energy();
                }
                i += size;
            }
        }
    }

    let mut coords: Vec<BandArray<T>> = vec![Default::default(); nblk];
    for blk in 0..nblk {
        let block = &frame.blocks[blk];
        if !block.cpl_in_use {
            continue;
        }
        for ch in (1..=fbw).filter(|&ch| block.channel_in_cpl[ch]) {
            for bnd in 0..num_bands {
                coords[blk][ch][bnd] = T::cpl_coord(energy[blk][ch][bnd], energy[blk][CPL_CH][bnd]);
            }
        }
    }

    // 决定哪些块重发坐标
    for blk in 0..nblk {
        let (prev, rest) = frame.blocks.split_at_mut(blk);
        let block = &mut rest[0];
        block.new_cpl_coords = [false; AC3_MAX_CHANNELS];
        if !block.cpl_in_use {
            continue;
        }
        let prev = match prev.last() {
            Some(p) if p.cpl_in_use => p,
            _ => {
                block.new_cpl_coords[1..=fbw].fill(true);
                continue;
            }
        };
        for ch in (1..=fbw).filter(|&ch| block.channel_in_cpl[ch]) {
            block.new_cpl_coords[ch] = if !prev.channel_in_cpl[ch] {
                true
            } else {
                let mut diff = T::Energy::default();
                for bnd in 0..num_bands {
                    diff += coords[blk - 1][ch][bnd].abs_diff(coords[blk][ch][bnd]);
                }
                T::exceeds_coord_threshold(diff, num_bands)
            };
        }
    }

    // 复用坐标的块把能量累加到首块后重新计算
    for ch in 1..=fbw {
        let mut blk = 0;
        while blk < nblk {
            if !frame.blocks[blk].channel_in_cpl[ch] {
                blk += 1;
                continue;
            }
            let mut energy_ch = energy[blk][ch];
            let mut energy_cpl = energy[blk][CPL_CH];
            let mut blk1 = blk + 1;
            while blk1 < nblk && !frame.blocks[blk1].new_cpl_coords[ch] {
                if frame.blocks[blk1].channel_in_cpl[ch] {
                    for bnd in 0..num_bands {
                        energy_ch[bnd] += energy[blk1][ch][bnd];
                        energy_cpl[bnd] += energy[blk1][CPL_CH][bnd];
                    }
                }
                blk1 += 1;
            }
            for bnd in 0..num_bands {
                coords[blk][ch][bnd] = T::cpl_coord(energy_ch[bnd], energy_cpl[bnd]);
            }
            blk = blk1;
        }
    }

    for (blk, block) in frame.blocks.iter_mut().enumerate() {
        if !block.cpl_in_use {
            continue;
        }
        for ch in (1..=fbw).filter(|&ch| block.new_cpl_coords[ch]) {
            block.cpl_coords[ch] = quantize_coords::<T>(&coords[blk][ch][..num_bands], dsp);
        }
    }
}

/// 把一组耦合坐标量化为主指数 + 每频带指数/尾数
fn quantize_coords<T: CoefType>(coords: &[T], dsp: &dyn Ac3Dsp) -> CplCoords {
    let n = coords.len();
    let mut clipped = [T::default(); AC3_MAX_CPL_SUBBANDS];
    for (dst, &c) in clipped.iter_mut().zip(coords) {
        *dst = c.clip();
    }
    let mut fixed = [0i32; AC3_MAX_CPL_SUBBANDS];
    T::to_fixed24(dsp, &mut fixed[..n], &clipped[..n]);

    let mut exps = [0u8; AC3_MAX_CPL_SUBBANDS];
    for (e, &f) in exps.iter_mut().zip(&fixed[..n]) {
        *e = extract_exponent(f);
    }

    let min_exp = i32::from(exps[..n].iter().copied().min().unwrap_or(24));
    let max_exp = i32::from(exps[..n].iter().copied().max().unwrap_or(24));
    let mut master_exp = ((max_exp - 15 + 2) / 3).max(0);
    while min_exp < master_exp * 3 {
        master_exp -= 1;
    }

    let mut out = CplCoords {
        master_exp: master_exp as u8,
        ..CplCoords::default()
    };
    for bnd in 0..n {
        let exp = (i32::from(exps[bnd]) - master_exp * 3).clamp(0, 15);
        let shift = 5 + exp + master_exp * 3;
        let mut mant = (i64::from(fixed[bnd]) << shift) >> 24;
        if exp == 15 {
            mant >>= 1;
        } else {
            mant -= 16;
        }
        out.exp[bnd] = exp as u8;
        out.mant[bnd] = mant.clamp(0, 15) as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoders::ac3::dsp::PortableDsp;

    #[test]
    fn test_默认耦合布局() {
        let cpl = CouplingSetup::new(11, 60);
        assert_eq!(cpl.end_band, 18);
        assert_eq!(cpl.num_subbands, 7);
        assert_eq!(cpl.start_freq, 169);
        assert_eq!(cpl.end_freq, 253);
        // 子带 12 另起一带, 13..18 并入其中
        assert_eq!(cpl.num_bands, 2);
        assert_eq!(&cpl.band_sizes[..2], &[12, 72]);
        assert_eq!(cpl.band_sizes[..cpl.num_bands].iter().sum::<usize>(), cpl.end_freq - cpl.start_freq);
    }

    #[test]
    fn test_起始子带受带宽限制() {
        let cpl = CouplingSetup::new(11, 12);
        assert_eq!(cpl.end_band, 6);
        assert_eq!(cpl.start_band, 5);
        assert_eq!(cpl.num_bands, 1);
    }

    #[test]
    fn test_坐标量化可还原() {
        let dsp = PortableDsp;
        // 浮点坐标为 sqrt(能量比) / 8
        let coords = [0.0625f32, 0.125, 0.01, 0.0];
        let q = quantize_coords::<f32>(&coords, &dsp);
        for (bnd, &c) in coords.iter().enumerate() {
            let decoded = q.value(bnd);
            assert!(q.exp[bnd] <= 15 && q.mant[bnd] <= 15);
            assert!(
                (decoded - f64::from(c)).abs() <= f64::from(c) * 0.07 + 1e-6,
                "band {bnd}: {decoded} vs {c}"
            );
        }
        assert!(q.master_exp <= 3);
    }

    #[test]
    fn test_耦合能量为零的坐标量化() {
        let dsp = PortableDsp;

        // 定点: 1 << 20, 即 0.0625
        let coords = [i32::cpl_coord(0, 0), i32::cpl_coord(12_345, 0), i32::cpl_coord(1 << 40, 0)];
        let q = quantize_coords::<i32>(&coords, &dsp);
        assert!(q.master_exp <= 3);
        for bnd in 0..coords.len() {
            assert!(q.exp[bnd] <= 15 && q.mant[bnd] <= 15);
            assert_eq!((q.exp[bnd], q.mant[bnd]), (3, 0));
            assert_eq!(q.value(bnd), 0.0625);
        }

        // 浮点: 0.125
        let coords = [f32::cpl_coord(0.0, 0.0), f32::cpl_coord(3.5, 0.0)];
        let q = quantize_coords::<f32>(&coords, &dsp);
        assert!(q.master_exp <= 3);
        for bnd in 0..coords.len() {
            assert!(q.exp[bnd] <= 15 && q.mant[bnd] <= 15);
            assert_eq!(q.value(bnd), 0.125);
        }

        // 与零坐标及满幅坐标混合时主指数仍受最小指数约束
        let coords = [f32::cpl_coord(1.0, 0.0), 0.0, f32::COEF_MAX];
        let q = quantize_coords::<f32>(&coords, &dsp);
        assert_eq!(q.master_exp, 0);
        assert!(q.exp[..3].iter().all(|&e| e <= 15));
        assert!(q.mant[..3].iter().all(|&m| m <= 15));
        assert_eq!(q.value(0), 0.125);
        assert_eq!(q.value(1), 0.0);
    }
}
