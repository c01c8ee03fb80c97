//! 帧级上下文: 按 (块, 声道) 索引的定长缓冲区.
//!
//! 所有数组在编码器构造时按声道数和块数一次性分配, 之后每帧复用.
//! 存储按 [声道][块][元素] 排列, 同一声道的各块在内存中连续,
//! 便于对复用块序列做逐系数最小值.

use std::ops::Range;

use super::coef::CoefType;
use super::config::Ac3Setup;
use super::masking::DbaState;
use super::tables::{
    AC3_CRITICAL_BANDS, AC3_MAX_BLOCKS, AC3_MAX_CHANNELS, AC3_MAX_COEFS, AC3_MAX_CPL_SUBBANDS,
    CPL_CH, MAX_GROUPED_EXPS,
};

/// 定长平面缓冲区
#[derive(Debug, Clone)]
pub struct Plane<T> {
    num_blocks: usize,
    stride: usize,
    data: Vec<T>,
}

impl<T: Copy + Default> Plane<T> {
    pub fn new(num_channels: usize, num_blocks: usize, stride: usize) -> Self {
        Self {
            num_blocks,
            stride,
            data: vec![T::default(); num_channels * num_blocks * stride],
        }
    }

    #[inline]
    fn offset(&self, blk: usize, ch: usize) -> usize {
        (ch * self.num_blocks + blk) * self.stride
    }

    #[inline]
    pub fn get(&self, blk: usize, ch: usize) -> &[T] {
        let off = self.offset(blk, ch);
        &self.data[off..off + self.stride]
    }

    #[inline]
    pub fn get_mut(&mut self, blk: usize, ch: usize) -> &mut [T] {
        let off = self.offset(blk, ch);
        &mut self.data[off..off + self.stride]
    }

    /// 从 `blk` 开始到该声道最后一块的连续区域
    pub fn blocks_from_mut(&mut self, blk: usize, ch: usize) -> &mut [T] {
        let off = self.offset(blk, ch);
        let end = self.offset(0, ch + 1);
        &mut self.data[off..end]
    }

    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }
}

/// 指数策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpStrategy {
    /// 复用之前块的指数
    #[default]
    Reuse,
    /// 全分辨率
    D15,
    /// 每 2 个系数共用一个指数
    D25,
    /// 每 4 个系数共用一个指数
    D45,
}

impl ExpStrategy {
    /// 码流中的 2 位编码
    pub const fn code(self) -> u8 {
        match self {
            Self::Reuse => 0,
            Self::D15 => 1,
            Self::D25 => 2,
            Self::D45 => 3,
        }
    }

    /// 每组系数数
    pub const fn group_size(self) -> usize {
        match self {
            Self::Reuse | Self::D15 => 1,
            Self::D25 => 2,
            Self::D45 => 4,
        }
    }
}

/// 单声道单块的耦合坐标
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CplCoords {
    /// 主指数 (0..=3)
    pub master_exp: u8,
    /// 每频带指数 (0..=15)
    pub exp: [u8; AC3_MAX_CPL_SUBBANDS],
    /// 每频带尾数 (0..=15)
    pub mant: [u8; AC3_MAX_CPL_SUBBANDS],
}

impl CplCoords {
    /// 解码端还原的坐标值 (未乘以 8 的增益)
    pub fn value(&self, bnd: usize) -> f64 {
        let exp = i32::from(self.exp[bnd]);
        let mant = f64::from(self.mant[bnd]);
        let scale = (-(exp + 3 * i32::from(self.master_exp)) as f64).exp2();
        if exp == 15 {
            mant / 16.0 * scale
        } else {
            (mant + 16.0) / 32.0 * scale
        }
    }
}

/// 单块决策
#[derive(Debug, Clone, Default)]
pub struct Ac3Block {
    /// 本块是否使用耦合
    pub cpl_in_use: bool,
    /// 各声道是否参与耦合
    pub channel_in_cpl: [bool; AC3_MAX_CHANNELS],
    pub num_cpl_channels: usize,
    /// 是否发送新的耦合策略
    pub new_cpl_strategy: bool,
    /// 是否发送新的耦合泄漏参数
    pub new_cpl_leak: bool,
    /// 各声道是否发送新的耦合坐标
    pub new_cpl_coords: [bool; AC3_MAX_CHANNELS],
    /// 各声道的耦合坐标 (仅 `new_cpl_coords` 为真时有效)
    pub cpl_coords: [CplCoords; AC3_MAX_CHANNELS],
    /// 是否发送 SNR 偏移
    pub new_snr_offsets: bool,
    /// 各声道起始系数, 仅耦合声道非零
    pub start_freq: [usize; AC3_MAX_CHANNELS],
    /// 各声道结束系数 (不含)
    pub end_freq: [usize; AC3_MAX_CHANNELS],
    /// 是否发送新的重矩阵标志
    pub new_rematrixing_strategy: bool,
    pub num_rematrixing_bands: usize,
    pub rematrixing_flags: [bool; 4],
}

impl Ac3Block {
    /// 声道在本块实际编码的系数范围, 未使用耦合时耦合声道为空
    pub fn coef_range(&self, ch: usize) -> Range<usize> {
        if ch == CPL_CH && !self.cpl_in_use {
            return 0..0;
        }
        self.start_freq[ch]..self.end_freq[ch]
    }
}

/// 一帧的全部编码决策与中间数组
#[derive(Debug)]
pub struct Ac3Frame<T: CoefType> {
    pub(super) num_blocks: usize,
    /// 全带宽 + LFE 声道数 (不含耦合声道)
    pub(super) channels: usize,
    pub(super) cpl_on: bool,
    pub(super) blocks: Vec<Ac3Block>,

    pub(super) mdct_coef: Plane<T>,
    pub(super) fixed_coef: Plane<i32>,
    pub(super) exp: Plane<u8>,
    pub(super) grouped_exp: Plane<u8>,
    pub(super) psd: Plane<i16>,
    pub(super) band_psd: Plane<i16>,
    pub(super) mask: Plane<i16>,
    /// 当前最优 bap
    pub(super) bap: Plane<u8>,
    /// 搜索中的试算 bap
    pub(super) bap_trial: Plane<u8>,
    pub(super) qmant: Plane<i16>,

    pub(super) exp_strategy: [[ExpStrategy; AC3_MAX_BLOCKS]; AC3_MAX_CHANNELS],
    pub(super) exp_ref_block: [[usize; AC3_MAX_BLOCKS]; AC3_MAX_CHANNELS],
    pub(super) mant_counts: Vec<[u16; 16]>,
    pub(super) dba_state: [DbaState; AC3_MAX_CHANNELS],

    pub(super) frame_size: usize,
    pub(super) frame_size_code: u16,
    pub(super) frame_bits: usize,
    pub(super) exponent_bits: usize,
    pub(super) mantissa_bits: usize,
    pub(super) coarse_snr_offset: u8,
    pub(super) fine_snr_offset: [u8; AC3_MAX_CHANNELS],
}

impl<T: CoefType> Ac3Frame<T> {
    pub(super) fn new(setup: &Ac3Setup) -> Self {
        let nch = setup.channels + 1;
        let nblk = setup.num_blocks;
        Self {
            num_blocks: nblk,
            channels: setup.channels,
            cpl_on: false,
            blocks: vec![Ac3Block::default(); nblk],
            mdct_coef: Plane::new(nch, nblk, AC3_MAX_COEFS),
            fixed_coef: Plane::new(nch, nblk, AC3_MAX_COEFS),
            exp: Plane::new(nch, nblk, AC3_MAX_COEFS),
            grouped_exp: Plane::new(nch, nblk, MAX_GROUPED_EXPS),
            psd: Plane::new(nch, nblk, AC3_MAX_COEFS),
            band_psd: Plane::new(nch, nblk, AC3_CRITICAL_BANDS),
            mask: Plane::new(nch, nblk, AC3_CRITICAL_BANDS),
            bap: Plane::new(nch, nblk, AC3_MAX_COEFS),
            bap_trial: Plane::new(nch, nblk, AC3_MAX_COEFS),
            qmant: Plane::new(nch, nblk, AC3_MAX_COEFS),
            exp_strategy: [[ExpStrategy::Reuse; AC3_MAX_BLOCKS]; AC3_MAX_CHANNELS],
            exp_ref_block: [[0; AC3_MAX_BLOCKS]; AC3_MAX_CHANNELS],
            mant_counts: vec![[0; 16]; nblk],
            dba_state: Default::default(),
            frame_size: setup.frame_size_min,
            frame_size_code: setup.frame_size_code,
            frame_bits: 0,
            exponent_bits: 0,
            mantissa_bits: 0,
            coarse_snr_offset: 40,
            fine_snr_offset: [0; AC3_MAX_CHANNELS],
        }
    }

    /// 本帧处理的声道范围: 启用耦合时包含耦合声道 0
    pub(super) fn channel_range(&self) -> std::ops::RangeInclusive<usize> {
        usize::from(!self.cpl_on)..=self.channels
    }

    /// 声道在本块是否有效 (耦合声道仅在使用耦合的块中有效)
    pub(super) fn channel_active(&self, blk: usize, ch: usize) -> bool {
        ch != CPL_CH || self.blocks[blk].cpl_in_use
    }

    pub fn num_blocks(&self) -> usize {
        self.num_blocks
    }

    /// 全带宽 + LFE 声道数
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// 本帧是否启用耦合
    pub fn cpl_on(&self) -> bool {
        self.cpl_on
    }

    pub fn block(&self, blk: usize) -> &Ac3Block {
        &self.blocks[blk]
    }

    pub fn exp_strategy(&self, ch: usize, blk: usize) -> ExpStrategy {
        self.exp_strategy[ch][blk]
    }

    /// 复用块指向的首块
    pub fn exp_ref_block(&self, ch: usize, blk: usize) -> usize {
        self.exp_ref_block[ch][blk]
    }

    /// 解码端看到的全分辨率指数 (取自首块)
    pub fn exponents(&self, blk: usize, ch: usize) -> &[u8] {
        self.exp.get(self.exp_ref_block[ch][blk], ch)
    }

    /// 分组后的指数码: 首元素为绝对指数, 其后每个 7 位码含 3 个差分.
    /// 复用块返回 `None`.
    pub fn grouped_exponents(&self, blk: usize, ch: usize) -> Option<&[u8]> {
        (self.exp_strategy[ch][blk] != ExpStrategy::Reuse).then(|| self.grouped_exp.get(blk, ch))
    }

    /// 本块的 bap, 只含 [`Ac3Block::coef_range`] 内的系数;
    /// 复用块与首块共享同一存储
    pub fn bap(&self, blk: usize, ch: usize) -> &[u8] {
        let ref_blk = self.exp_ref_block[ch][blk];
        &self.bap.get(ref_blk, ch)[self.blocks[ref_blk].coef_range(ch)]
    }

    /// 量化后的尾数, 与 [`Ac3Frame::bap`] 同范围; 分组打包的后续位置为 128
    pub fn mantissas(&self, blk: usize, ch: usize) -> &[i16] {
        &self.qmant.get(blk, ch)[self.blocks[blk].coef_range(ch)]
    }

    /// 24 位定点系数 (已应用耦合与重矩阵)
    pub fn fixed_coefs(&self, blk: usize, ch: usize) -> &[i32] {
        self.fixed_coef.get(blk, ch)
    }

    pub fn coarse_snr_offset(&self) -> u8 {
        self.coarse_snr_offset
    }

    pub fn fine_snr_offset(&self, ch: usize) -> u8 {
        self.fine_snr_offset[ch]
    }

    /// 合并的 10 位 SNR 偏移
    pub fn snr_offset(&self) -> u16 {
        (u16::from(self.coarse_snr_offset) << 4) | u16::from(self.fine_snr_offset[1])
    }

    /// 帧长 (字节)
    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    /// 写入码流的帧长码
    pub fn frame_size_code(&self) -> u16 {
        self.frame_size_code
    }

    /// 头部与边信息位数
    pub fn frame_bits(&self) -> usize {
        self.frame_bits
    }

    pub fn exponent_bits(&self) -> usize {
        self.exponent_bits
    }

    pub fn mantissa_bits(&self) -> usize {
        self.mantissa_bits
    }

    /// 帧内已用总位数
    pub fn total_bits(&self) -> usize {
        self.frame_bits + self.exponent_bits + self.mantissa_bits
    }

    /// 各块的 bap 直方图
    pub fn mantissa_counts(&self, blk: usize) -> &[u16; 16] {
        &self.mant_counts[blk]
    }
}
