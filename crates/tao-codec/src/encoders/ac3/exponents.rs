//! 指数提取、策略选择与分组编码.
//!
//! 每个声道先按块间指数差决定哪些块复用前一块的指数,
//! 复用序列的首块取整段的逐系数最小值, 再施加相邻差 ±2 的差分约束.
//! 分组方式在约束后的指数上选取: 能无损表示的最粗分组 (D45 > D25 > D15).

use super::coef::CoefType;
use super::config::Ac3Setup;
use super::context::{Ac3Frame, ExpStrategy};
use super::dsp::Ac3Dsp;
use super::tables::{
    AC3_MAX_BLOCKS, AC3_MAX_CHANNELS, AC3_MAX_COEFS, CPL_CH, EXP_DIFF_THRESHOLD,
};

/// 7 位分组码个数 (每个码含 3 个差分)
pub fn exponent_groups(nb_exps: usize, strategy: ExpStrategy, cpl: bool) -> usize {
    let grp = 3 * strategy.group_size();
    if cpl {
        nb_exps / grp
    } else {
        (nb_exps + grp - 4) / grp
    }
}

/// 由定点系数提取所有有效 (块, 声道) 的指数, 返回整帧是否静音
pub(super) fn extract_exponents<T: CoefType>(
    frame: &mut Ac3Frame<T>,
    setup: &Ac3Setup,
    dsp: &dyn Ac3Dsp,
) -> bool {
    let mut silent = true;
    for ch in frame.channel_range() {
        let start = setup.start_freq(ch);
        for blk in 0..frame.num_blocks {
            let exp = frame.exp.get_mut(blk, ch);
            dsp.extract_exponents(exp, frame.fixed_coef.get(blk, ch));
            if ch == CPL_CH && !frame.blocks[blk].cpl_in_use {
                continue;
            }
            let end = frame.blocks[blk].end_freq[ch];
            silent &= exp[start..end].iter().all(|&e| e == 24);
        }
    }
    silent
}

/// 决定各块发送新指数还是复用
///
/// 结果中 `D15` 仅表示 "新指数", 实际分组在 [`encode_exponents`] 中确定.
pub(super) fn compute_exp_strategy<T: CoefType>(frame: &mut Ac3Frame<T>, setup: &Ac3Setup) {
    frame.exp_strategy = [[ExpStrategy::Reuse; AC3_MAX_BLOCKS]; AC3_MAX_CHANNELS];
    frame.exp_ref_block = [[0; AC3_MAX_BLOCKS]; AC3_MAX_CHANNELS];
    for ch in frame.channel_range() {
        let start = setup.start_freq(ch);
        frame.exp_strategy[ch][0] = ExpStrategy::D15;

        for blk in 1..frame.num_blocks {
            let cur = &frame.blocks[blk];
            let prev = &frame.blocks[blk - 1];
            let forced = if ch == CPL_CH {
                if !prev.cpl_in_use {
                    Some(ExpStrategy::D15)
                } else if !cur.cpl_in_use {
                    Some(ExpStrategy::Reuse)
                } else {
                    None
                }
            } else if cur.channel_in_cpl[ch] != prev.channel_in_cpl[ch] {
                Some(ExpStrategy::D15)
            } else {
                None
            };
            if let Some(strategy) = forced {
                frame.exp_strategy[ch][blk] = strategy;
                continue;
            }

            let end = cur.end_freq[ch];
            let cur_exp = &frame.exp.get(blk, ch)[start..end];
            let prev_exp = &frame.exp.get(blk - 1, ch)[start..end];
            let diff: u32 = cur_exp
                .iter()
                .zip(prev_exp)
                .map(|(&a, &b)| u32::from(a.abs_diff(b)))
                .sum();

            let threshold = if ch == CPL_CH {
                EXP_DIFF_THRESHOLD * (end - start) as u32 / AC3_MAX_COEFS as u32
            } else {
                EXP_DIFF_THRESHOLD
            };
            frame.exp_strategy[ch][blk] = if diff > threshold {
                ExpStrategy::D15
            } else {
                ExpStrategy::Reuse
            };
        }
    }
}

/// 合并复用序列、施加差分约束并确定分组方式
pub(super) fn encode_exponents<T: CoefType>(
    frame: &mut Ac3Frame<T>,
    setup: &Ac3Setup,
    dsp: &dyn Ac3Dsp,
) {
    let lfe = setup.lfe_channel();
    for ch in frame.channel_range() {
        let cpl = ch == CPL_CH;
        let start = setup.start_freq(ch);
        let mut blk = 0;
        while blk < frame.num_blocks {
            if cpl && !frame.blocks[blk].cpl_in_use {
                frame.exp_strategy[ch][blk] = ExpStrategy::Reuse;
                frame.exp_ref_block[ch][blk] = blk;
                blk += 1;
                continue;
            }

            frame.exp_ref_block[ch][blk] = blk;
            let mut blk1 = blk + 1;
            while blk1 < frame.num_blocks && frame.exp_strategy[ch][blk1] == ExpStrategy::Reuse {
                frame.exp_ref_block[ch][blk1] = blk;
                blk1 += 1;
            }
            let num_reuse_blocks = blk1 - blk - 1;

            dsp.exponent_min(
                frame.exp.blocks_from_mut(blk, ch),
                num_reuse_blocks,
                AC3_MAX_COEFS,
            );

            let end = frame.blocks[blk].end_freq[ch];
            frame.exp_strategy[ch][blk] = encode_exponents_blk_ch(
                frame.exp.get_mut(blk, ch),
                start,
                end,
                cpl,
                Some(ch) == lfe,
            );
            blk = blk1;
        }
    }
}

/// 对单个 (块, 声道) 的指数施加约束并选取分组
///
/// 返回值保证: 按所选分组展开后的指数在 [start, end) 内与约束后的全分辨率指数一致.
pub fn encode_exponents_blk_ch(
    exp: &mut [u8],
    start: usize,
    end: usize,
    cpl: bool,
    is_lfe: bool,
) -> ExpStrategy {
    let nb_exps = end - start;
    replicate_tail(exp, end);
    constrain_exponents(exp, start, nb_exps, ExpStrategy::D15, cpl);
    if is_lfe {
        return ExpStrategy::D15;
    }

    let strategy = [ExpStrategy::D45, ExpStrategy::D25]
        .into_iter()
        .find(|&s| groups_uniform(exp, start, end, s.group_size(), cpl))
        .unwrap_or(ExpStrategy::D15);
    if strategy != ExpStrategy::D15 {
        replicate_tail(exp, end);
        constrain_exponents(exp, start, nb_exps, strategy, cpl);
    }
    strategy
}

/// 范围外的尾部复制最后一个有效指数, 使越界分组不会拉低有效指数
fn replicate_tail(exp: &mut [u8], end: usize) {
    let last = exp[end - 1];
    exp[end..AC3_MAX_COEFS].fill(last);
}

/// 每组内的有效指数是否全部相同
fn groups_uniform(exp: &[u8], start: usize, end: usize, group_size: usize, cpl: bool) -> bool {
    // 非耦合声道的 DC 指数单独发送
    let first = if cpl { start } else { start + 1 };
    exp[first..end]
        .chunks(group_size)
        .all(|group| group.iter().all(|&e| e == group[0]))
}

/// 分组取最小值, DC 限幅, 相邻差限制在 ±2 内, 再展开回全分辨率
fn constrain_exponents(
    exp: &mut [u8],
    start: usize,
    nb_exps: usize,
    strategy: ExpStrategy,
    cpl: bool,
) {
    let g = strategy.group_size();
    let nb_groups = exponent_groups(nb_exps, strategy, cpl) * 3;
    let c = usize::from(cpl);
    let e = &mut exp[start..];

    if g > 1 {
        let mut k = 1 - c;
        for i in 1..=nb_groups {
            let min = e[k..k + g].iter().copied().min().unwrap_or(24);
            e[i - c] = min;
            k += g;
        }
    }

    if !cpl && e[0] > 15 {
        e[0] = 15;
    }

    let last = nb_groups - c;
    for i in 1..=last {
        e[i] = e[i].min(e[i - 1] + 2);
    }
    for i in (0..last).rev() {
        e[i] = e[i].min(e[i + 1] + 2);
    }

    if g > 1 {
        for i in (1..=nb_groups).rev() {
            let v = e[i - c];
            let lo = (i - 1) * g + 1 - c;
            e[lo..lo + g].fill(v);
        }
    }

    if cpl {
        // 耦合声道的参考绝对指数位于 start - 1, 只能取偶数
        exp[start - 1] = exp[start] & !1;
    }
}

/// 将非复用块的指数打包为 7 位分组码, 返回指数总位数
pub(super) fn group_exponents<T: CoefType>(frame: &mut Ac3Frame<T>, setup: &Ac3Setup) -> usize {
    let mut bits = 0;
    for ch in frame.channel_range() {
        let cpl = ch == CPL_CH;
        let start = setup.start_freq(ch);
        for blk in 0..frame.num_blocks {
            let strategy = frame.exp_strategy[ch][blk];
            if strategy == ExpStrategy::Reuse || !frame.channel_active(blk, ch) {
                continue;
            }
            let end = frame.blocks[blk].end_freq[ch];
            let nb_groups = exponent_groups(end - start, strategy, cpl);
            let g = strategy.group_size();

            let exp = frame.exp.get(blk, ch);
            let grouped = frame.grouped_exp.get_mut(blk, ch);
            let mut p = start - usize::from(cpl);
            let mut exp1 = exp[p];
            grouped[0] = exp1;
            p += 1;
            for code in grouped[1..=nb_groups].iter_mut() {
                let mut deltas = [0u8; 3];
                for d in deltas.iter_mut() {
                    let exp0 = exp1;
                    exp1 = exp[p];
                    p += g;
                    *d = exp1 + 2 - exp0;
                }
                *code = (deltas[0] * 5 + deltas[1]) * 5 + deltas[2];
            }
            bits += 4 + nb_groups * 7;
        }
    }
    bits
}
