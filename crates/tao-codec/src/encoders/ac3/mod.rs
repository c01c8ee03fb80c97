//! AC-3 / E-AC-3 编码器的心理声学与位分配核心.
//!
//! 输入为每块每声道 256 个 MDCT 系数 (AC-3 声道顺序), 输出为写码流所需的全部决策:
//! 指数策略与分组指数、耦合坐标、重矩阵标志、SNR 偏移、bap 与量化尾数.
//! 每帧处理流程:
//!
//! 1. 帧长调整与输入裁剪
//! 2. 耦合策略, 生成耦合声道与耦合坐标
//! 3. 重矩阵策略, 转为 24 位定点并应用重矩阵
//! 4. 指数提取, 复用判决, 约束与分组
//! 5. 边信息位数统计
//! 6. PSD / 掩蔽曲线, 定码率 SNR 偏移搜索
//! 7. 尾数量化
//!
//! 同一实现以 `i32` 定点和 `f32` 浮点两种系数类型实例化.

mod bit_alloc;
mod coef;
mod config;
mod context;
mod coupling;
pub mod dsp;
mod exponents;
mod frame_bits;
mod mantissa;
pub mod masking;
mod rematrix;
pub mod tables;
#[cfg(test)]
mod tests;

use log::{debug, trace};
use tao_core::{TaoError, TaoResult};

pub use bit_alloc::MAX_SNR_OFFSET;
pub use coef::CoefType;
pub use config::{
    Ac3EncoderConfig, Ac3Metadata, Ac3Setup, AudioProductionInfo, BitAllocCodes, ChannelMode,
    CouplingMode, ExtendedBsi1, ExtendedBsi2,
};
pub use context::{Ac3Block, Ac3Frame, CplCoords, ExpStrategy};
pub use coupling::CouplingSetup;
pub use dsp::{Ac3Dsp, PortableDsp};
pub use frame_bits::{FrameSizer, count_frame_bits_fixed};
pub use mantissa::{GROUP_FOLLOWER, asym_quant, sym_quant};
pub use masking::{BitAllocParams, DbaSegment};

use tables::AC3_MAX_COEFS;

/// AC-3 编码核心
pub struct Ac3Encoder<T: CoefType> {
    setup: Ac3Setup,
    dsp: Box<dyn Ac3Dsp>,
    frame: Ac3Frame<T>,
    sizer: FrameSizer,
    /// 每帧固定的头部与边信息位数
    frame_bits_fixed: usize,
    frame_count: u64,
}

/// 24 位定点系数编码器
pub type Ac3FixedEncoder = Ac3Encoder<i32>;
/// 浮点系数编码器
pub type Ac3FloatEncoder = Ac3Encoder<f32>;

impl<T: CoefType> Ac3Encoder<T> {
    /// 使用可移植 DSP 创建编码器
    pub fn new(config: &Ac3EncoderConfig) -> TaoResult<Self> {
        Self::with_dsp(config, Box::new(PortableDsp))
    }

    /// 使用指定 DSP 实现创建编码器
    pub fn with_dsp(config: &Ac3EncoderConfig, dsp: Box<dyn Ac3Dsp>) -> TaoResult<Self> {
        let setup = config.build_setup()?;
        let frame_bits_fixed = count_frame_bits_fixed(&setup);
        debug!(
            "创建编码核心: {} 系数, DSP {}, 帧长 {} 字节, 固定位数 {}",
            T::NAME,
            dsp.name(),
            setup.frame_size_min,
            frame_bits_fixed,
        );
        Ok(Self {
            frame: Ac3Frame::new(&setup),
            setup,
            dsp,
            sizer: FrameSizer::default(),
            frame_bits_fixed,
            frame_count: 0,
        })
    }

    /// 建立期派生的参数
    pub fn setup(&self) -> &Ac3Setup {
        &self.setup
    }

    /// 每帧输入系数个数 (块数 x 声道数 x 256)
    pub fn coefs_per_frame(&self) -> usize {
        self.setup.num_blocks * self.setup.channels * AC3_MAX_COEFS
    }

    /// 已编码帧数
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// 把按声道布局顺序排列的系数重排为 AC-3 声道顺序
    ///
    /// 两者都按 [块][声道][256] 排列.
    pub fn reorder_to_ac3(&self, native: &[T]) -> TaoResult<Vec<T>> {
        self.check_input_len(native.len())?;
        let channels = self.setup.channels;
        let mut out = vec![T::default(); native.len()];
        for (dst_blk, src_blk) in out
            .chunks_exact_mut(channels * AC3_MAX_COEFS)
            .zip(native.chunks_exact(channels * AC3_MAX_COEFS))
        {
            for (ch, &src_ch) in self.setup.channel_map.iter().enumerate() {
                dst_blk[ch * AC3_MAX_COEFS..(ch + 1) * AC3_MAX_COEFS].copy_from_slice(
                    &src_blk[src_ch * AC3_MAX_COEFS..(src_ch + 1) * AC3_MAX_COEFS],
                );
            }
        }
        Ok(out)
    }

    fn check_input_len(&self, len: usize) -> TaoResult<()> {
        let expected = self.coefs_per_frame();
        if len != expected {
            return Err(TaoError::InvalidArgument(format!(
                "输入系数个数 {len} 与帧结构不符, 应为 {expected} ({} 块 x {} 声道 x {AC3_MAX_COEFS})",
                self.setup.num_blocks, self.setup.channels
            )));
        }
        Ok(())
    }

    /// 编码一帧
    ///
    /// `coefs` 按 [块][声道][256] 排列, 声道为 AC-3 顺序 (全带宽声道在前, LFE 在后).
    /// 返回的帧在下一次调用前有效.
    pub fn encode_frame(&mut self, coefs: &[T]) -> TaoResult<&Ac3Frame<T>> {
        self.check_input_len(coefs.len())?;
        let setup = &self.setup;
        let dsp = self.dsp.as_ref();
        let frame = &mut self.frame;

        let (frame_size, frame_size_code) = self.sizer.next_frame(setup);
        frame.frame_size = frame_size;
        frame.frame_size_code = frame_size_code;

        copy_input(frame, setup, coefs);

        coupling::compute_coupling_strategy(frame, setup);
        if frame.cpl_on {
            coupling::apply_channel_coupling(frame, setup, dsp);
        }
        rematrix::compute_rematrixing_strategy(frame, setup, dsp);

        for ch in frame.channel_range() {
            for blk in 0..frame.num_blocks {
                T::to_fixed24(dsp, frame.fixed_coef.get_mut(blk, ch), frame.mdct_coef.get(blk, ch));
            }
        }
        rematrix::apply_rematrixing(frame, setup);

        let silent = exponents::extract_exponents(frame, setup, dsp);
        exponents::compute_exp_strategy(frame, setup);
        exponents::encode_exponents(frame, setup, dsp);
        frame.exponent_bits = exponents::group_exponents(frame, setup);

        frame.frame_bits = self.frame_bits_fixed + frame_bits::count_frame_bits(frame, setup);

        bit_alloc::bit_alloc_masking(frame, setup)?;
        bit_alloc::cbr_bit_allocation(frame, setup, dsp, silent)?;

        mantissa::quantize_mantissas(frame, setup);

        trace!(
            "帧 {}: {} 字节, 耦合 {}, SNR {}, 位数 帧头 {} + 指数 {} + 尾数 {}{}",
            self.frame_count,
            frame.frame_size,
            frame.cpl_on,
            frame.snr_offset(),
            frame.frame_bits,
            frame.exponent_bits,
            frame.mantissa_bits,
            if silent { " (静音)" } else { "" },
        );
        self.frame_count += 1;
        Ok(&self.frame)
    }
}

/// 复制并裁剪输入系数; 耦合声道缓冲清零
fn copy_input<T: CoefType>(frame: &mut Ac3Frame<T>, setup: &Ac3Setup, coefs: &[T]) {
    let block_len = setup.channels * AC3_MAX_COEFS;
    for (blk, block) in coefs.chunks_exact(block_len).enumerate() {
        for (ch, src) in block.chunks_exact(AC3_MAX_COEFS).enumerate() {
            for (dst, &c) in frame.mdct_coef.get_mut(blk, ch + 1).iter_mut().zip(src) {
                *dst = c.clip();
            }
        }
        frame.mdct_coef.get_mut(blk, tables::CPL_CH).fill(T::default());
    }
}
