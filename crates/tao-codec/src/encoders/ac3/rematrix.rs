//! 立体声重矩阵: 按频带在 L/R 与 (L+R)/2, (L-R)/2 之间选择能量更小的表示.

use super::coef::CoefType;
use super::config::{Ac3Setup, ChannelMode};
use super::context::Ac3Frame;
use super::dsp::Ac3Dsp;
use super::tables::{CPL_CH, REMATRIX_BAND_TAB};

/// 耦合起点决定可用的重矩阵频带数
pub fn num_rematrixing_bands(cpl_in_use: bool, cpl_start_freq: usize) -> usize {
    let mut bands = 4;
    if cpl_in_use {
        bands -= usize::from(cpl_start_freq <= 61);
        bands -= usize::from(cpl_start_freq == 37);
    }
    bands
}

/// 决定各块各频带是否重矩阵
pub(super) fn compute_rematrixing_strategy<T: CoefType>(
    frame: &mut Ac3Frame<T>,
    setup: &Ac3Setup,
    dsp: &dyn Ac3Dsp,
) {
    if setup.channel_mode != ChannelMode::Stereo {
        return;
    }
    let cpl_start = setup.start_freq(CPL_CH);

    for blk in 0..frame.num_blocks {
        let (prev, rest) = frame.blocks.split_at_mut(blk);
        let block = &mut rest[0];
        let prev = prev.last();

        block.new_rematrixing_strategy = prev.is_none();
        block.num_rematrixing_bands = num_rematrixing_bands(block.cpl_in_use, cpl_start);
        if block.cpl_in_use && prev.is_some_and(|p| p.num_rematrixing_bands != block.num_rematrixing_bands) {
            block.new_rematrixing_strategy = true;
        }
        block.rematrixing_flags = [false; 4];
        if !setup.rematrixing_enabled {
            continue;
        }

        let nb_coefs = block.end_freq[1].min(block.end_freq[2]);
        let left = frame.mdct_coef.get(blk, 1);
        let right = frame.mdct_coef.get(blk, 2);
        for bnd in 0..block.num_rematrixing_bands {
            let start = REMATRIX_BAND_TAB[bnd];
            let end = nb_coefs.min(REMATRIX_BAND_TAB[bnd + 1]);
            let [l, r, sum, diff] = T::sum_square_butterfly(dsp, &left[start..end], &right[start..end]);
            let mid_side = if sum < diff { sum } else { diff };
            let left_right = if l < r { l } else { r };
            block.rematrixing_flags[bnd] = mid_side < left_right;
            if prev.is_some_and(|p| p.rematrixing_flags[bnd] != block.rematrixing_flags[bnd]) {
                block.new_rematrixing_strategy = true;
            }
        }
    }
}

/// 对定点系数应用重矩阵
pub(super) fn apply_rematrixing<T: CoefType>(frame: &mut Ac3Frame<T>, setup: &Ac3Setup) {
    if !setup.rematrixing_enabled {
        return;
    }
    for blk in 0..frame.num_blocks {
        let block = &frame.blocks[blk];
        let nb_coefs = block.end_freq[1].min(block.end_freq[2]);
        for bnd in (0..block.num_rematrixing_bands).filter(|&b| block.rematrixing_flags[b]) {
            let start = REMATRIX_BAND_TAB[bnd];
            let end = nb_coefs.min(REMATRIX_BAND_TAB[bnd + 1]);
            for i in start..end {
                let lt = frame.fixed_coef.get(blk, 1)[i];
                let rt = frame.fixed_coef.get(blk, 2)[i];
                frame.fixed_coef.get_mut(blk, 1)[i] = (lt + rt) >> 1;
                frame.fixed_coef.get_mut(blk, 2)[i] = (lt - rt) >> 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_重矩阵频带数() {
        assert_eq!(num_rematrixing_bands(false, 37), 4);
        assert_eq!(num_rematrixing_bands(true, 169), 4);
        assert_eq!(num_rematrixing_bands(true, 61), 3);
        assert_eq!(num_rematrixing_bands(true, 37), 2);
    }
}
