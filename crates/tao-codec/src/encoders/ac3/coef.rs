//! 频谱系数数值类型.
//!
//! 同一套编码算法分别以 24 位定点 (`i32`) 和单精度浮点 (`f32`) 实例化,
//! 两者只在裁剪边界、耦合坐标计算与重发阈值上不同.

use std::fmt;
use std::ops::{Add, AddAssign};

use super::dsp::Ac3Dsp;
use super::tables::COEF_MAX_FIXED;

/// 频谱系数类型
pub trait CoefType:
    Copy + Default + PartialOrd + Add<Output = Self> + fmt::Debug + Send + Sync + 'static
{
    /// 能量累加类型
    type Energy: Copy + Default + PartialOrd + AddAssign + fmt::Debug;

    /// 类型名称, 用于日志
    const NAME: &'static str;
    /// 系数下界
    const COEF_MIN: Self;
    /// 系数上界
    const COEF_MAX: Self;
    /// 耦合坐标平均绝对差超过该值时重发坐标
    const CPL_COORD_THRESHOLD: Self::Energy;

    /// 裁剪到可编码范围
    #[inline]
    fn clip(self) -> Self {
        if self < Self::COEF_MIN {
            Self::COEF_MIN
        } else if self > Self::COEF_MAX {
            Self::COEF_MAX
        } else {
            self
        }
    }

    /// 平方能量
    fn energy(self) -> Self::Energy;

    /// 两个坐标的绝对差
    fn abs_diff(self, other: Self) -> Self::Energy;

    /// 绝对差之和的均值是否超过重发阈值
    fn exceeds_coord_threshold(diff_sum: Self::Energy, num_bands: usize) -> bool;

    /// 由声道能量与耦合声道能量计算耦合坐标
    fn cpl_coord(energy_ch: Self::Energy, energy_cpl: Self::Energy) -> Self;

    /// 转为 24 位定点
    fn to_fixed24(dsp: &dyn Ac3Dsp, dst: &mut [i32], src: &[Self]);

    /// L^2, R^2, (L+R)^2, (L-R)^2
    fn sum_square_butterfly(dsp: &dyn Ac3Dsp, left: &[Self], right: &[Self]) -> [Self::Energy; 4];
}

impl CoefType for i32 {
    type Energy = i64;

    const NAME: &'static str = "fixed";
    const COEF_MIN: Self = -COEF_MAX_FIXED;
    const COEF_MAX: Self = COEF_MAX_FIXED;
    const CPL_COORD_THRESHOLD: i64 = 503_317;

    fn energy(self) -> i64 {
        let v = i64::from(self);
        v * v
    }

    fn abs_diff(self, other: Self) -> i64 {
        (i64::from(self) - i64::from(other)).abs()
    }

    fn exceeds_coord_threshold(diff_sum: i64, num_bands: usize) -> bool {
        diff_sum / num_bands.max(1) as i64 > Self::CPL_COORD_THRESHOLD
    }

    fn cpl_coord(energy_ch: i64, energy_cpl: i64) -> Self {
        if energy_cpl <= i64::from(COEF_MAX_FIXED) {
            return 1 << 20;
        }
        let coord = energy_ch as u64 / (energy_cpl as u64 >> 24);
        let coord = coord.min(1 << 30) as u32;
        let coord = (coord.isqrt() << 9) as i32;
        coord.min(COEF_MAX_FIXED)
    }

    fn to_fixed24(_dsp: &dyn Ac3Dsp, dst: &mut [i32], src: &[Self]) {
        dst.copy_from_slice(src);
    }

    fn sum_square_butterfly(dsp: &dyn Ac3Dsp, left: &[Self], right: &[Self]) -> [i64; 4] {
        dsp.sum_square_butterfly_i32(left, right)
    }
}

impl CoefType for f32 {
    type Energy = f32;

    const NAME: &'static str = "float";
    const COEF_MIN: Self = -(COEF_MAX_FIXED as f32) / 16_777_216.0;
    const COEF_MAX: Self = COEF_MAX_FIXED as f32 / 16_777_216.0;
    const CPL_COORD_THRESHOLD: f32 = 0.03;

    fn energy(self) -> f32 {
        self * self
    }

    fn abs_diff(self, other: Self) -> f32 {
        (self - other).abs()
    }

    fn exceeds_coord_threshold(diff_sum: f32, num_bands: usize) -> bool {
        diff_sum / num_bands.max(1) as f32 > Self::CPL_COORD_THRESHOLD
    }

    fn cpl_coord(energy_ch: f32, energy_cpl: f32) -> Self {
        let mut coord = 0.125f32;
        if energy_cpl > 0.0 {
            coord *= (energy_ch / energy_cpl).sqrt();
        }
        coord.min(Self::COEF_MAX)
    }

    fn to_fixed24(dsp: &dyn Ac3Dsp, dst: &mut [i32], src: &[Self]) {
        dsp.float_to_fixed24(dst, src);
    }

    fn sum_square_butterfly(dsp: &dyn Ac3Dsp, left: &[Self], right: &[Self]) -> [f32; 4] {
        dsp.sum_square_butterfly_f32(left, right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_定点耦合坐标() {
        // 耦合能量过小时返回固定值
        assert_eq!(i32::cpl_coord(123, 0), 1 << 20);
        // 声道能量等于耦合能量: 0.125 * 2^24
        let e = 1i64 << 40;
        assert_eq!(i32::cpl_coord(e, e), 1 << 21);
        // 比值极大时钳位
        assert_eq!(i32::cpl_coord(i64::MAX / 2, 1 << 25), COEF_MAX_FIXED);
    }

    #[test]
    fn test_浮点耦合坐标() {
        assert_eq!(f32::cpl_coord(1.0, 0.0), 0.125);
        assert!((f32::cpl_coord(4.0, 1.0) - 0.25).abs() < 1e-6);
        assert_eq!(f32::cpl_coord(1e12, 1.0), f32::COEF_MAX);
    }

    #[test]
    fn test_系数裁剪() {
        assert_eq!((1i32 << 25).clip(), COEF_MAX_FIXED);
        assert_eq!((-(1i32 << 25)).clip(), -COEF_MAX_FIXED);
        assert_eq!(2.0f32.clip(), f32::COEF_MAX);
        assert_eq!(0.5f32.clip(), 0.5);
    }

    #[test]
    fn test_坐标重发阈值() {
        assert!(!i32::exceeds_coord_threshold(503_317 * 4, 4));
        assert!(i32::exceeds_coord_threshold(503_318 * 4, 4));
        assert!(f32::exceeds_coord_threshold(0.31, 10));
        assert!(!f32::exceeds_coord_threshold(0.29, 10));
    }
}
