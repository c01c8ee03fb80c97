//! 位分配: 掩蔽曲线 + SNR 偏移 -> bap, 并在定码率约束下搜索最大 SNR 偏移.

use log::{error, trace};
use tao_core::{TaoError, TaoResult};

use super::coef::CoefType;
use super::config::Ac3Setup;
use super::context::{Ac3Frame, ExpStrategy};
use super::dsp::Ac3Dsp;
use super::masking::{DbaMode, calc_mask, calc_psd};

/// 合并 SNR 偏移 (coarse << 4 | fine) 的上限
pub const MAX_SNR_OFFSET: i32 = 1023;

/// 对所有发送新指数的 (块, 声道) 计算 PSD 与掩蔽曲线
pub(super) fn bit_alloc_masking<T: CoefType>(
    frame: &mut Ac3Frame<T>,
    setup: &Ac3Setup,
) -> TaoResult<()> {
    let lfe = setup.lfe_channel();
    for blk in 0..frame.num_blocks {
        for ch in frame.channel_range() {
            if frame.exp_strategy[ch][blk] == ExpStrategy::Reuse || !frame.channel_active(blk, ch) {
                continue;
            }
            let start = setup.start_freq(ch);
            let end = frame.blocks[blk].end_freq[ch];
            calc_psd(
                frame.exp.get(blk, ch),
                start,
                end,
                frame.psd.get_mut(blk, ch),
                frame.band_psd.get_mut(blk, ch),
            );

            let dba = match &setup.dba[ch] {
                Some(segs) if blk == 0 => DbaMode::New(segs),
                Some(_) => DbaMode::Reuse,
                None => DbaMode::None,
            };
            calc_mask(
                &setup.bit_alloc,
                frame.band_psd.get(blk, ch),
                start,
                end,
                setup.fast_gain,
                Some(ch) == lfe,
                dba,
                &mut frame.dba_state[ch],
                frame.mask.get_mut(blk, ch),
            )?;
        }
    }
    Ok(())
}

/// 以给定 SNR 偏移计算所有 bap, 返回尾数总位数
pub(super) fn bit_alloc<T: CoefType>(
    frame: &mut Ac3Frame<T>,
    setup: &Ac3Setup,
    dsp: &dyn Ac3Dsp,
    snr_offset: i32,
) -> usize {
    let snr = (snr_offset - 240) * 4;
    let floor = setup.bit_alloc.floor;
    for blk in 0..frame.num_blocks {
        for ch in frame.channel_range() {
            // 复用指数的块同样复用首块的 bap
            if frame.exp_strategy[ch][blk] == ExpStrategy::Reuse || !frame.channel_active(blk, ch) {
                continue;
            }
            dsp.bit_alloc_calc_bap(
                frame.mask.get(blk, ch),
                frame.psd.get(blk, ch),
                setup.start_freq(ch),
                frame.blocks[blk].end_freq[ch],
                snr,
                floor,
                frame.bap.get_mut(blk, ch),
            );
        }
    }
    count_mantissa_bits(frame, setup, dsp)
}

/// 统计各块的 bap 直方图并换算为尾数位数
fn count_mantissa_bits<T: CoefType>(
    frame: &mut Ac3Frame<T>,
    setup: &Ac3Setup,
    dsp: &dyn Ac3Dsp,
) -> usize {
    for blk in 0..frame.num_blocks {
        let mut counts = [0u16; 16];
        // 分组尾数按整组计数
        counts[1] = 2;
        counts[2] = 2;
        counts[4] = 1;
        for ch in frame.channel_range() {
            if !frame.channel_active(blk, ch) {
                continue;
            }
            let start = setup.start_freq(ch);
            let end = frame.blocks[blk].end_freq[ch];
            let ref_blk = frame.exp_ref_block[ch][blk];
            dsp.update_bap_counts(&mut counts, &frame.bap.get(ref_blk, ch)[start..end]);
        }
        frame.mant_counts[blk] = counts;
    }
    dsp.compute_mantissa_size(&frame.mant_counts)
}

/// 定码率 SNR 偏移搜索
///
/// 先从上一帧的粗偏移按 64 递减直到放得下, 再以 64/16/4/1 的步长逐级上探.
/// 静音帧直接使用偏移 0 (bap 全零).
pub(super) fn cbr_bit_allocation<T: CoefType>(
    frame: &mut Ac3Frame<T>,
    setup: &Ac3Setup,
    dsp: &dyn Ac3Dsp,
    silent: bool,
) -> TaoResult<()> {
    let used = frame.frame_bits + frame.exponent_bits;
    let budget = 8 * frame.frame_size;
    if used > budget {
        error!(
            "边信息与指数共 {used} 位, 超出帧容量 {budget} 位 (帧头 {}, 指数 {})",
            frame.frame_bits, frame.exponent_bits
        );
        return Err(TaoError::BitAllocation(format!(
            "边信息与指数共 {used} 位, 超出帧容量 {budget} 位"
        )));
    }
    let bits_left = budget - used;

    let snr_offset = if silent {
        bit_alloc(frame, setup, dsp, 0);
        0
    } else {
        search_snr_offset(frame, setup, dsp, bits_left)?
    };

    frame.mantissa_bits = count_mantissa_bits(frame, setup, dsp);
    frame.coarse_snr_offset = (snr_offset >> 4) as u8;
    for ch in frame.channel_range() {
        frame.fine_snr_offset[ch] = (snr_offset & 0xF) as u8;
    }
    trace!(
        "SNR 偏移 {snr_offset} (粗 {}, 细 {}), 尾数 {} 位, 剩余 {} 位",
        frame.coarse_snr_offset,
        snr_offset & 0xF,
        frame.mantissa_bits,
        bits_left - frame.mantissa_bits
    );
    Ok(())
}

/// 返回满足预算的最大 SNR 偏移, 其 bap 留在 `frame.bap` 中
fn search_snr_offset<T: CoefType>(
    frame: &mut Ac3Frame<T>,
    setup: &Ac3Setup,
    dsp: &dyn Ac3Dsp,
    bits_left: usize,
) -> TaoResult<i32> {
    let prev = (i32::from(frame.coarse_snr_offset) << 4) | i32::from(frame.fine_snr_offset[1]);
    if prev == MAX_SNR_OFFSET && bit_alloc(frame, setup, dsp, MAX_SNR_OFFSET) <= bits_left {
        return Ok(MAX_SNR_OFFSET);
    }

    let mut snr_offset = i32::from(frame.coarse_snr_offset) << 4;
    while bit_alloc(frame, setup, dsp, snr_offset) > bits_left {
        if snr_offset == 0 {
            error!("SNR 偏移降至 0 仍超出剩余 {bits_left} 位");
            return Err(TaoError::BitAllocation(format!(
                "SNR 偏移降至 0 仍超出剩余 {bits_left} 位"
            )));
        }
        snr_offset = (snr_offset - 64).max(0);
    }

    // 上探期间 bap_trial 保存当前最优解, 试算写入 bap
    std::mem::swap(&mut frame.bap, &mut frame.bap_trial);
    let mut incr = 64;
    while incr > 0 {
        while snr_offset + incr <= MAX_SNR_OFFSET
            && bit_alloc(frame, setup, dsp, snr_offset + incr) <= bits_left
        {
            snr_offset += incr;
            std::mem::swap(&mut frame.bap, &mut frame.bap_trial);
        }
        incr >>= 2;
    }
    std::mem::swap(&mut frame.bap, &mut frame.bap_trial);
    Ok(snr_offset)
}
