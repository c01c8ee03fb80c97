//! 帧头与边信息位数统计, 以及 44.1 kHz 系列的帧长填充.

use super::coef::CoefType;
use super::config::{Ac3Setup, ChannelMode};
use super::context::{Ac3Frame, ExpStrategy};
use super::tables::FRAME_SIZE_TAB;

/// 与帧内容无关的固定位数 (同步信息、BSI、各块固定字段、辅助数据与 CRC)
pub fn count_frame_bits_fixed(setup: &Ac3Setup) -> usize {
    let fbw = setup.fbw_channels;
    let nblk = setup.num_blocks;
    let lfe = usize::from(setup.lfe_on);

    // syncword
    let mut bits = 16;
    if setup.eac3 {
        // BSI: strmtyp..bsid 以及 dialnorm 等
        bits += 35;
        bits += 1 + 1;
        if nblk != 6 {
            bits += 1;
        }
        bits += 1;
        // audfrm
        if nblk == 6 {
            bits += 2;
        }
        bits += 10;
        bits += nblk * 2 * fbw;
        bits += nblk * lfe;
        if setup.num_blks_code != 3 {
            bits += 1;
        } else {
            bits += fbw * 5;
        }
        bits += 10;
        if nblk != 1 {
            bits += 1;
        }
    } else {
        bits += 49;
        bits += mix_level_bits(setup.channel_mode);
    }

    for blk in 0..nblk {
        if !setup.eac3 {
            // blksw + dithflag
            bits += 2 * fbw;
        }
        // dynrnge
        bits += 1;
        if setup.eac3 {
            // spxstre
            bits += 1;
        } else {
            // cplstre
            bits += 1;
            // chexpstr + lfeexpstr
            bits += 2 * fbw + lfe;
            // baie
            bits += 1;
            if blk == 0 {
                bits += 2 + 2 + 2 + 2 + 3;
            }
        }
        // snroffste / convsnroffste
        bits += 1;
        if !setup.eac3 {
            // deltbaie + skiple
            bits += 2;
        }
    }

    // auxdatae + crcrsv + crc2
    bits + 1 + 1 + 16
}

/// AC-3 BSI 中随声道模式出现的 cmixlev / surmixlev / dsurmod
fn mix_level_bits(mode: ChannelMode) -> usize {
    let mut bits = 0;
    if mode.has_center() {
        bits += 2;
    }
    if mode.has_surround() {
        bits += 2;
    }
    if mode == ChannelMode::Stereo {
        bits += 2;
    }
    bits
}

/// 随帧内容变化的边信息位数 (耦合、重矩阵、带宽、SNR 偏移、DBA、元数据)
pub(super) fn count_frame_bits<T: CoefType>(frame: &Ac3Frame<T>, setup: &Ac3Setup) -> usize {
    let fbw = setup.fbw_channels;
    let stereo = setup.channel_mode == ChannelMode::Stereo;
    let mut bits = 0;

    if setup.eac3 {
        if setup.channel_mode != ChannelMode::Mono {
            bits += 1;
            for block in &frame.blocks[1..] {
                bits += 1;
                if block.new_cpl_strategy {
                    bits += 1;
                }
            }
        }
        if frame.cpl_on {
            bits += frame.blocks.iter().filter(|b| b.cpl_in_use).count() * 2;
        }
    } else {
        let meta = &setup.metadata;
        if meta.audio_production_info.is_some() {
            bits += 7;
        }
        if setup.bitstream_id == 6 {
            bits += 14 * usize::from(meta.extended_bsi_1.is_some());
            bits += 14 * usize::from(meta.extended_bsi_2.is_some());
        }
    }

    let (num_subbands, num_cpl_bands) = setup
        .cpl
        .as_ref()
        .map_or((0, 0), |c| (c.num_subbands, c.num_bands));

    for (blk, block) in frame.blocks.iter().enumerate() {
        if block.new_cpl_strategy {
            if !setup.eac3 {
                bits += 1;
            }
            if block.cpl_in_use {
                if setup.eac3 {
                    bits += 1;
                }
                if !setup.eac3 || !stereo {
                    bits += fbw;
                }
                if stereo {
                    // phsflginu
                    bits += 1;
                }
                // cplbegf + cplendf
                bits += 4 + 4;
                if setup.eac3 {
                    bits += 1;
                } else {
                    bits += num_subbands - 1;
                }
            }
        }

        if block.cpl_in_use {
            for ch in (1..=fbw).filter(|&ch| block.channel_in_cpl[ch]) {
                bits += 1;
                if block.new_cpl_coords[ch] {
                    bits += 2 + (4 + 4) * num_cpl_bands;
                }
            }
        }

        if stereo {
            if !setup.eac3 || blk > 0 {
                bits += 1;
            }
            if block.new_rematrixing_strategy {
                bits += block.num_rematrixing_bands;
            }
        }

        for ch in 1..=fbw {
            if frame.exp_strategy[ch][blk] != ExpStrategy::Reuse {
                if !block.channel_in_cpl[ch] {
                    // chbwcod
                    bits += 6;
                }
                // gainrng
                bits += 2;
            }
        }

        if !setup.eac3 && block.cpl_in_use {
            bits += 2;
        }

        if !setup.eac3 && block.new_snr_offsets {
            bits += 6 + (setup.channels + usize::from(block.cpl_in_use)) * (4 + 3);
        }

        if block.cpl_in_use {
            bits += 1;
            if block.new_cpl_leak {
                bits += 3 + 3;
            }
        }

        if blk == 0 && !setup.eac3 && setup.has_delta_bit_alloc() {
            bits += delta_bit_alloc_bits(setup, block.cpl_in_use);
        }
    }
    bits
}

/// 首块发送的 DBA 字段位数: 每声道 2 位模式, 新段另计段数与段内容
fn delta_bit_alloc_bits(setup: &Ac3Setup, cpl_in_use: bool) -> usize {
    let mut bits = if cpl_in_use { 2 } else { 0 };
    bits += 2 * setup.fbw_channels;
    for segs in setup.dba.iter().flatten() {
        bits += 3 + segs.len() * (5 + 4 + 3);
    }
    bits
}

/// 帧长控制: 44.1 kHz 系列的 AC-3 帧在最小帧长与多 1 字之间交替,
/// 使长期平均码率等于标称码率.
#[derive(Debug, Default, Clone)]
pub struct FrameSizer {
    bits_written: u64,
    samples_written: u64,
}

impl FrameSizer {
    /// 返回下一帧的 (字节数, 写入码流的帧长码)
    pub fn next_frame(&mut self, setup: &Ac3Setup) -> (usize, u16) {
        if setup.eac3 || setup.sr_code != 1 {
            return (setup.frame_size_min, setup.frame_size_code);
        }

        let bit_rate = u64::from(setup.bit_rate);
        let sample_rate = u64::from(setup.sample_rate);
        while self.bits_written >= bit_rate && self.samples_written >= sample_rate {
            self.bits_written -= bit_rate;
            self.samples_written -= sample_rate;
        }
        let pad = self.bits_written * sample_rate < self.samples_written * bit_rate;
        let frame_size = setup.frame_size_min + 2 * usize::from(pad);
        self.bits_written += frame_size as u64 * 8;
        self.samples_written += 256 * setup.num_blocks as u64;

        let code = setup.frame_size_code + u16::from(pad);
        debug_assert_eq!(
            2 * FRAME_SIZE_TAB[code as usize][setup.sr_code] as usize,
            frame_size
        );
        (frame_size, code)
    }
}
