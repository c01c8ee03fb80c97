//! AC-3 编码热点内核的能力接口.
//!
//! 编码器构造时选定一次实现, 之后每次调用都走同一张表.
//! 默认的 [`PortableDsp`] 是纯标量实现, 平台相关的优化版本可以实现同一 trait 替换.

use super::tables::{AC3_MAX_COEFS, BAND_START_TAB, BAP_BITS, BAP_TAB, BIN_TO_BAND_TAB};

/// 位分配 SNR 偏移哨兵: 所有 bap 置零
pub const MUTE_SNR_OFFSET: i32 = -960;

/// AC-3 编码 DSP 内核
pub trait Ac3Dsp: Send + Sync {
    /// 实现名称, 用于日志
    fn name(&self) -> &'static str;

    /// 对复用块序列取逐系数最小指数, 结果写回首块
    ///
    /// `exp` 以首块开头, 各块间隔 `AC3_MAX_COEFS`.
    fn exponent_min(&self, exp: &mut [u8], num_reuse_blocks: usize, nb_coefs: usize);

    /// 由 24 位定点系数提取指数
    fn extract_exponents(&self, exp: &mut [u8], coef: &[i32]);

    /// 浮点系数转 24 位定点
    fn float_to_fixed24(&self, dst: &mut [i32], src: &[f32]);

    /// 由掩蔽曲线和 PSD 计算 [start, end) 的 bap
    #[allow(clippy::too_many_arguments)]
    fn bit_alloc_calc_bap(
        &self,
        mask: &[i16],
        psd: &[i16],
        start: usize,
        end: usize,
        snr_offset: i32,
        floor: i32,
        bap: &mut [u8],
    );

    /// 累加 bap 直方图
    fn update_bap_counts(&self, counts: &mut [u16; 16], bap: &[u8]);

    /// 由各块 bap 直方图计算尾数总位数
    fn compute_mantissa_size(&self, counts: &[[u16; 16]]) -> usize;

    /// 计算 L^2, R^2, (L+R)^2, (L-R)^2 (定点)
    fn sum_square_butterfly_i32(&self, left: &[i32], right: &[i32]) -> [i64; 4];

    /// 计算 L^2, R^2, (L+R)^2, (L-R)^2 (浮点)
    fn sum_square_butterfly_f32(&self, left: &[f32], right: &[f32]) -> [f32; 4];
}

/// 可移植标量实现
#[derive(Debug, Default, Clone, Copy)]
pub struct PortableDsp;

impl Ac3Dsp for PortableDsp {
    fn name(&self) -> &'static str {
        "portable"
    }

    fn exponent_min(&self, exp: &mut [u8], num_reuse_blocks: usize, nb_coefs: usize) {
        if num_reuse_blocks == 0 {
            return;
        }
        let (head, rest) = exp.split_at_mut(AC3_MAX_COEFS);
        for blk in 0..num_reuse_blocks {
            let other = &rest[blk * AC3_MAX_COEFS..blk * AC3_MAX_COEFS + nb_coefs];
            for (e, &o) in head[..nb_coefs].iter_mut().zip(other) {
                if o < *e {
                    *e = o;
                }
            }
        }
    }

    fn extract_exponents(&self, exp: &mut [u8], coef: &[i32]) {
        for (e, &c) in exp.iter_mut().zip(coef) {
            *e = extract_exponent(c);
        }
    }

    fn float_to_fixed24(&self, dst: &mut [i32], src: &[f32]) {
        for (d, &s) in dst.iter_mut().zip(src) {
            *d = (s * 16_777_216.0).round() as i32;
        }
    }

    fn bit_alloc_calc_bap(
        &self,
        mask: &[i16],
        psd: &[i16],
        start: usize,
        end: usize,
        snr_offset: i32,
        floor: i32,
        bap: &mut [u8],
    ) {
        if snr_offset == MUTE_SNR_OFFSET {
            bap.fill(0);
            return;
        }
        if start >= end {
            return;
        }

        let mut bin = start;
        let mut band = BIN_TO_BAND_TAB[start] as usize;
        loop {
            let m = ((i32::from(mask[band]) - snr_offset - floor).max(0) & 0x1FE0) + floor;
            band += 1;
            let band_end = (BAND_START_TAB[band] as usize).min(end);
            while bin < band_end {
                let address = ((i32::from(psd[bin]) - m) >> 5).clamp(0, 63);
                bap[bin] = BAP_TAB[address as usize];
                bin += 1;
            }
            if band_end >= end {
                break;
            }
        }
    }

    fn update_bap_counts(&self, counts: &mut [u16; 16], bap: &[u8]) {
        for &b in bap {
            counts[b as usize] += 1;
        }
    }

    fn compute_mantissa_size(&self, counts: &[[u16; 16]]) -> usize {
        counts
            .iter()
            .map(|cnt| {
                let cnt = cnt.map(usize::from);
                // bap 1: 3 个尾数共 5 位; bap 2: 3 个共 7 位; bap 4: 2 个共 7 位
                let mut bits = cnt[1] / 3 * 5;
                bits += (cnt[2] / 3 + cnt[4] / 2) * 7;
                bits += cnt[3] * 3;
                bits += (5..16)
                    .map(|b| cnt[b] * usize::from(BAP_BITS[b]))
                    .sum::<usize>();
                bits
            })
            .sum()
    }

    fn sum_square_butterfly_i32(&self, left: &[i32], right: &[i32]) -> [i64; 4] {
        let mut sum = [0i64; 4];
        for (&l, &r) in left.iter().zip(right) {
            let (l, r) = (i64::from(l), i64::from(r));
            let md = l + r;
            let sd = l - r;
            sum[0] += l * l;
            sum[1] += r * r;
            sum[2] += md * md;
            sum[3] += sd * sd;
        }
        sum
    }

    fn sum_square_butterfly_f32(&self, left: &[f32], right: &[f32]) -> [f32; 4] {
        let mut sum = [0f32; 4];
        for (&l, &r) in left.iter().zip(right) {
            let md = l + r;
            let sd = l - r;
            sum[0] += l * l;
            sum[1] += r * r;
            sum[2] += md * md;
            sum[3] += sd * sd;
        }
        sum
    }
}

/// 单个 24 位定点系数的指数: 0 映射为 24, 否则为 23 - floor(log2|c|)
#[inline]
pub fn extract_exponent(coef: i32) -> u8 {
    let v = coef.unsigned_abs().min(COEF_ABS_MAX);
    if v == 0 {
        24
    } else {
        (23 - v.ilog2() as i32).clamp(0, 24) as u8
    }
}

const COEF_ABS_MAX: u32 = (1 << 24) - 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_指数提取() {
        assert_eq!(extract_exponent(0), 24);
        assert_eq!(extract_exponent(1), 23);
        assert_eq!(extract_exponent(-1), 23);
        assert_eq!(extract_exponent(0x7F_FFFF), 1);
        assert_eq!(extract_exponent(0x80_0000), 0);
        assert_eq!(extract_exponent(i32::MIN), 0);
    }

    #[test]
    fn test_指数可由量级反推() {
        // 量级 2^(23-e) 重新提取应得到相同指数
        for coef in [1, 3, 77, 4095, 65_537, -123_456, 9_999_999, -16_777_215] {
            let e = extract_exponent(coef);
            let class = 1i32 << (23 - i32::from(e));
            assert_eq!(extract_exponent(class), e);
            assert_eq!(extract_exponent(-class), e);
        }
    }

    #[test]
    fn test_指数最小值() {
        let dsp = PortableDsp;
        let mut exp = vec![10u8; AC3_MAX_COEFS * 3];
        exp[AC3_MAX_COEFS + 5] = 3;
        exp[2 * AC3_MAX_COEFS + 6] = 4;
        exp[2 * AC3_MAX_COEFS + 200] = 1;
        dsp.exponent_min(&mut exp, 2, 100);
        assert_eq!(exp[5], 3);
        assert_eq!(exp[6], 4);
        assert_eq!(exp[7], 10);
        // 超出 nb_coefs 的部分不参与
        assert_eq!(exp[200], 10);
    }

    #[test]
    fn test_静音哨兵清零bap() {
        let dsp = PortableDsp;
        let mask = [0i16; 50];
        let psd = [3072i16; AC3_MAX_COEFS];
        let mut bap = [9u8; AC3_MAX_COEFS];
        dsp.bit_alloc_calc_bap(&mask, &psd, 0, 253, MUTE_SNR_OFFSET, -2048, &mut bap);
        assert!(bap.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_尾数位数统计() {
        let dsp = PortableDsp;
        let mut counts = [[0u16; 16]; 1];
        counts[0][1] = 2 + 3;
        counts[0][2] = 2 + 1;
        counts[0][4] = 1 + 1;
        counts[0][5] = 2;
        counts[0][15] = 1;
        // bap1: 5/3=1 组 -> 5, bap2: 3/3=1 组, bap4: 2/2=1 组 -> 14, bap5: 8, bap15: 16
        assert_eq!(dsp.compute_mantissa_size(&counts), 5 + 14 + 8 + 16);
    }

    #[test]
    fn test_和差平方() {
        let dsp = PortableDsp;
        let s = dsp.sum_square_butterfly_i32(&[3, 1], &[1, 1]);
        assert_eq!(s, [10, 2, 20, 4]);
        let f = dsp.sum_square_butterfly_f32(&[0.5], &[0.5]);
        assert_eq!(f, [0.25, 0.25, 1.0, 0.0]);
    }
}
