//! 尾数量化.
//!
//! bap 1/2/4 的对称量化值按 3/3/2 个一组打包进组内首个位置,
//! 组内其余位置写入 128 作为占位. 分组跨声道延续, 但不跨块.

use super::coef::CoefType;
use super::config::Ac3Setup;
use super::context::{Ac3Frame, Plane};
use super::tables::CPL_CH;

/// 分组占位值
pub const GROUP_FOLLOWER: i16 = 128;

/// 对称量化: 返回 0..levels
#[inline]
pub fn sym_quant(c: i32, e: u8, levels: i32) -> i16 {
    let v = ((i64::from(levels) * i64::from(c)) >> (24 - u32::from(e))) + i64::from(levels);
    (v >> 1) as i16
}

/// 非对称量化: 返回 qbits 位二进制补码范围内的值
#[inline]
pub fn asym_quant(c: i32, e: u8, qbits: u32) -> i16 {
    let c = i64::from(c) << e;
    let c = ((c >> (24 - qbits)) + 1) >> 1;
    let m = 1i64 << (qbits - 1);
    c.clamp(-m, m - 1) as i16
}

/// 正在填充的分组: 首元素位置及已放入个数
#[derive(Debug, Clone, Copy, Default)]
struct PendingGroup {
    ch: usize,
    idx: usize,
    count: u8,
}

impl PendingGroup {
    /// 放入一个量化值, 返回该位置应写入的值
    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        qmant: &mut Plane<i16>,
        blk: usize,
        ch: usize,
        idx: usize,
        v: i16,
        levels: i16,
        size: u8,
    ) -> i16 {
        if self.count == 0 {
            *self = Self { ch, idx, count: 1 };
            let weight = if size == 3 { levels * levels } else { levels };
            return v * weight;
        }
        let weight = if size == 3 && self.count == 1 { levels } else { 1 };
        qmant.get_mut(blk, self.ch)[self.idx] += v * weight;
        self.count = (self.count + 1) % size;
        GROUP_FOLLOWER
    }
}

#[derive(Debug, Default)]
struct BlockGroups {
    mant1: PendingGroup,
    mant2: PendingGroup,
    mant4: PendingGroup,
}

/// 量化所有块的尾数
pub(super) fn quantize_mantissas<T: CoefType>(frame: &mut Ac3Frame<T>, setup: &Ac3Setup) {
    for blk in 0..frame.num_blocks {
        let block = &frame.blocks[blk];
        let mut order = Vec::with_capacity(frame.channels + 1);
        let mut got_cpl = !block.cpl_in_use;
        for ch in 1..=frame.channels {
            order.push(ch);
            if !got_cpl && block.channel_in_cpl[ch] {
                order.push(CPL_CH);
                got_cpl = true;
            }
        }

        let mut groups = BlockGroups::default();
        for ch in 0..=frame.channels {
            frame.qmant.get_mut(blk, ch).fill(0);
        }
        for ch in order {
            let end = frame.blocks[blk].end_freq[ch];
            let ref_blk = frame.exp_ref_block[ch][blk];
            for i in setup.start_freq(ch)..end {
                let c = frame.fixed_coef.get(blk, ch)[i];
                let e = frame.exp.get(ref_blk, ch)[i];
                let bap = frame.bap.get(ref_blk, ch)[i];
                let v = match bap {
                    0 => 0,
                    1 => {
                        let q = sym_quant(c, e, 3);
                        groups.mant1.push(&mut frame.qmant, blk, ch, i, q, 3, 3)
                    }
                    2 => {
                        let q = sym_quant(c, e, 5);
                        groups.mant2.push(&mut frame.qmant, blk, ch, i, q, 5, 3)
                    }
                    3 => sym_quant(c, e, 7),
                    4 => {
                        let q = sym_quant(c, e, 11);
                        groups.mant4.push(&mut frame.qmant, blk, ch, i, q, 11, 2)
                    }
                    5 => sym_quant(c, e, 15),
                    14 => asym_quant(c, e, 14),
                    15 => asym_quant(c, e, 16),
                    b => asym_quant(c, e, u32::from(b) - 1),
                };
                frame.qmant.get_mut(blk, ch)[i] = v;
            }
        }
    }
}
