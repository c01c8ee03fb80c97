//! 编码器配置与建立期校验.
//!
//! [`Ac3EncoderConfig`] 为用户可见选项, [`Ac3EncoderConfig::build_setup`] 在处理任何块之前
//! 完成全部校验并派生出不可变的 [`Ac3Setup`] (帧长、带宽、耦合布局、位分配参数等).

use log::debug;
use tao_core::{ChannelLayout, TaoError, TaoResult};

use super::coupling::CouplingSetup;
use super::masking::{BitAllocParams, DbaSegment, band_range, check_segments};
use super::tables::{
    AC3_MAX_BLOCKS, AC3_MAX_CHANNELS, BITRATE_TAB, CHANNEL_MAP, DB_PER_BIT_TAB, FAST_DECAY_TAB,
    FAST_GAIN_TAB, FLOOR_TAB, FRAME_SIZE_TAB, SAMPLE_RATE_TAB, SLOW_DECAY_TAB,
    SLOW_GAIN_TAB,
};
use crate::codec_id::CodecId;

/// 未指定截止频率时的带宽码 (73 + 50 * 3 = 223 个系数)
pub const DEFAULT_BANDWIDTH_CODE: u8 = 50;

/// 声道模式 (acmod), 不含双单声道
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelMode {
    /// 1/0
    Mono = 1,
    /// 2/0
    Stereo = 2,
    /// 3/0
    ThreeFront = 3,
    /// 2/1
    TwoOne = 4,
    /// 3/1
    ThreeOne = 5,
    /// 2/2
    TwoTwo = 6,
    /// 3/2
    ThreeTwo = 7,
}

impl ChannelMode {
    /// 由声道布局推出声道模式与 LFE 标志
    pub fn from_layout(layout: ChannelLayout) -> TaoResult<(Self, bool)> {
        let mode = match layout.without_lfe() {
            ChannelLayout::MONO => Self::Mono,
            ChannelLayout::STEREO => Self::Stereo,
            ChannelLayout::SURROUND => Self::ThreeFront,
            ChannelLayout::LAYOUT_2_1 => Self::TwoOne,
            ChannelLayout::LAYOUT_4POINT0 => Self::ThreeOne,
            ChannelLayout::LAYOUT_2_2 | ChannelLayout::QUAD => Self::TwoTwo,
            ChannelLayout::LAYOUT_5POINT0 | ChannelLayout::LAYOUT_5POINT0_BACK => Self::ThreeTwo,
            other => {
                return Err(TaoError::Unsupported(format!(
                    "AC-3 不支持声道布局 {other}"
                )));
            }
        };
        Ok((mode, layout.has_lfe()))
    }

    pub const fn acmod(self) -> u8 {
        self as u8
    }

    /// 全带宽声道数
    pub const fn fbw_channels(self) -> usize {
        match self {
            Self::Mono => 1,
            Self::Stereo => 2,
            Self::ThreeFront | Self::TwoOne => 3,
            Self::ThreeOne | Self::TwoTwo => 4,
            Self::ThreeTwo => 5,
        }
    }

    /// 是否含中置声道 (需要 cmixlev)
    pub const fn has_center(self) -> bool {
        (self.acmod() & 1) != 0 && self.acmod() != 1
    }

    /// 是否含环绕声道 (需要 surmixlev)
    pub const fn has_surround(self) -> bool {
        (self.acmod() & 4) != 0
    }
}

/// 声道耦合策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CouplingMode {
    /// 按每声道码率决定是否启用及起始子带
    #[default]
    Auto,
    /// 强制启用
    On,
    /// 关闭
    Off,
}

/// 位分配参数码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitAllocCodes {
    pub slow_decay: u8,
    pub fast_decay: u8,
    pub slow_gain: u8,
    pub db_per_bit: u8,
    pub floor: u8,
    pub fast_gain: u8,
}

impl BitAllocCodes {
    /// 对应编码格式的默认参数码
    pub const fn for_codec(eac3: bool) -> Self {
        Self {
            slow_decay: 2,
            fast_decay: 1,
            slow_gain: 1,
            db_per_bit: if eac3 { 2 } else { 3 },
            floor: 7,
            fast_gain: 4,
        }
    }

    fn validate(&self) -> TaoResult<()> {
        let checks = [
            ("slow_decay", self.slow_decay, 3),
            ("fast_decay", self.fast_decay, 3),
            ("slow_gain", self.slow_gain, 3),
            ("db_per_bit", self.db_per_bit, 3),
            ("floor", self.floor, 7),
            ("fast_gain", self.fast_gain, 7),
        ];
        for (name, value, max) in checks {
            if value > max {
                return Err(TaoError::InvalidArgument(format!(
                    "位分配参数码 {name}={value} 超出范围 0..={max}"
                )));
            }
        }
        Ok(())
    }

    fn params(&self, sr_code: usize, sr_shift: u32) -> BitAllocParams {
        BitAllocParams {
            sr_code,
            sr_shift,
            slow_gain: SLOW_GAIN_TAB[self.slow_gain as usize],
            slow_decay: SLOW_DECAY_TAB[self.slow_decay as usize] >> sr_shift,
            fast_decay: FAST_DECAY_TAB[self.fast_decay as usize] >> sr_shift,
            db_per_bit: DB_PER_BIT_TAB[self.db_per_bit as usize],
            floor: FLOOR_TAB[self.floor as usize],
            cpl_fast_leak: 0,
            cpl_slow_leak: 0,
        }
    }
}

/// 制作信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioProductionInfo {
    /// 混音电平 (dB SPL, 80..=111)
    pub mixing_level: u8,
    /// 房间类型 (0..=2)
    pub room_type: u8,
}

/// 扩展 BSI 1: 下混偏好与电平
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedBsi1 {
    pub preferred_stereo_downmix: u8,
    pub ltrt_center_mix_level: u8,
    pub ltrt_surround_mix_level: u8,
    pub loro_center_mix_level: u8,
    pub loro_surround_mix_level: u8,
}

/// 扩展 BSI 2
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtendedBsi2 {
    pub dolby_surround_ex_mode: u8,
    pub dolby_headphone_mode: u8,
    pub ad_converter_type: u8,
}

/// 码流元数据, 核心只做范围校验并计入头部位数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ac3Metadata {
    /// 对白归一化电平 (dB, -31..=-1)
    pub dialnorm: i8,
    /// 码流服务类型 (bsmod, 0..=7)
    pub bitstream_mode: u8,
    /// 中置下混电平码 (0..=2)
    pub center_mix_level: u8,
    /// 环绕下混电平码 (0..=2)
    pub surround_mix_level: u8,
    /// 杜比环绕模式 (0..=2)
    pub dolby_surround_mode: u8,
    pub copyright: bool,
    pub original: bool,
    pub audio_production_info: Option<AudioProductionInfo>,
    pub extended_bsi_1: Option<ExtendedBsi1>,
    pub extended_bsi_2: Option<ExtendedBsi2>,
}

impl Default for Ac3Metadata {
    fn default() -> Self {
        Self {
            dialnorm: -31,
            bitstream_mode: 0,
            center_mix_level: 1,
            surround_mix_level: 1,
            dolby_surround_mode: 0,
            copyright: false,
            original: true,
            audio_production_info: None,
            extended_bsi_1: None,
            extended_bsi_2: None,
        }
    }
}

impl Ac3Metadata {
    fn validate(&self) -> TaoResult<()> {
        let bad = |what: &str| Err(TaoError::InvalidArgument(format!("元数据 {what} 超出范围")));
        if !(-31..=-1).contains(&self.dialnorm) {
            return bad("dialnorm");
        }
        if self.bitstream_mode > 7 {
            return bad("bitstream_mode");
        }
        if self.center_mix_level > 2 || self.surround_mix_level > 2 {
            return bad("mix_level");
        }
        if self.dolby_surround_mode > 2 {
            return bad("dolby_surround_mode");
        }
        let info_ok = self
            .audio_production_info
            .is_none_or(|info| (80..=111).contains(&info.mixing_level) && info.room_type <= 2);
        if !info_ok {
            return bad("audio_production_info");
        }
        let xbsi1_ok = self.extended_bsi_1.is_none_or(|x| {
            x.preferred_stereo_downmix <= 2
                && x.ltrt_center_mix_level <= 7
                && x.loro_center_mix_level <= 7
                && (3..=7).contains(&x.ltrt_surround_mix_level)
                && (3..=7).contains(&x.loro_surround_mix_level)
        });
        if !xbsi1_ok {
            return bad("extended_bsi_1");
        }
        let xbsi2_ok = self.extended_bsi_2.is_none_or(|x| {
            x.dolby_surround_ex_mode <= 2 && x.dolby_headphone_mode <= 2 && x.ad_converter_type <= 1
        });
        if !xbsi2_ok {
            return bad("extended_bsi_2");
        }
        Ok(())
    }

    /// 是否使用扩展 BSI (bsid = 6)
    pub fn uses_extended_bsi(&self) -> bool {
        self.extended_bsi_1.is_some() || self.extended_bsi_2.is_some()
    }
}

/// AC-3 / E-AC-3 编码器配置
#[derive(Debug, Clone, PartialEq)]
pub struct Ac3EncoderConfig {
    /// `CodecId::Ac3` 或 `CodecId::Eac3`
    pub codec_id: CodecId,
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 码率 (bit/s)
    pub bit_rate: u32,
    /// 声道布局
    pub channel_layout: ChannelLayout,
    /// 每帧块数: AC-3 固定为 6, E-AC-3 可为 1/2/3/6
    pub num_blocks: usize,
    /// 截止频率 (Hz), `None` 时按码率选择带宽
    pub cutoff: Option<u32>,
    pub coupling: CouplingMode,
    /// 耦合起始子带 (0..=15), `None` 时自动选择
    pub cpl_start_band: Option<u8>,
    /// 立体声重矩阵
    pub rematrixing: bool,
    pub bit_alloc: BitAllocCodes,
    /// 按 AC-3 全带宽声道顺序给出的 DBA 段
    pub delta_bit_alloc: Vec<Option<Vec<DbaSegment>>>,
    pub metadata: Ac3Metadata,
}

impl Default for Ac3EncoderConfig {
    fn default() -> Self {
        Self::new(CodecId::Ac3, 48000, 192_000, ChannelLayout::STEREO)
    }
}

impl Ac3EncoderConfig {
    /// 以编码格式默认值创建配置
    pub fn new(codec_id: CodecId, sample_rate: u32, bit_rate: u32, layout: ChannelLayout) -> Self {
        let eac3 = codec_id == CodecId::Eac3;
        Self {
            codec_id,
            sample_rate,
            bit_rate,
            channel_layout: layout,
            num_blocks: AC3_MAX_BLOCKS,
            cutoff: None,
            coupling: CouplingMode::Auto,
            cpl_start_band: None,
            rematrixing: true,
            bit_alloc: BitAllocCodes::for_codec(eac3),
            delta_bit_alloc: Vec::new(),
            metadata: Ac3Metadata::default(),
        }
    }

    /// 布局顺序 -> AC-3 声道顺序映射: `map[ac3_ch] = layout_ch`
    pub fn channel_map(&self) -> TaoResult<&'static [usize]> {
        let (mode, lfe) = ChannelMode::from_layout(self.channel_layout)?;
        Ok(CHANNEL_MAP[mode.acmod() as usize][usize::from(lfe)])
    }

    /// 校验配置并派生编码参数
    pub fn build_setup(&self) -> TaoResult<Ac3Setup> {
        let eac3 = match self.codec_id {
            CodecId::Ac3 => false,
            CodecId::Eac3 => true,
            other => {
                return Err(TaoError::InvalidArgument(format!(
                    "编解码器 {other} 不是 AC-3 / E-AC-3"
                )));
            }
        };

        let (channel_mode, lfe_on) = ChannelMode::from_layout(self.channel_layout)?;
        let fbw_channels = channel_mode.fbw_channels();
        let channels = fbw_channels + usize::from(lfe_on);

        let (sr_code, sr_shift) = resolve_sample_rate(self.sample_rate, eac3)?;

        let (num_blocks, num_blks_code) = match (eac3, self.num_blocks) {
            (false, 6) => (6, 3),
            (true, 1) => (1, 0),
            (true, 2) => (2, 1),
            (true, 3) => (3, 2),
            (true, 6) => (6, 3),
            (_, n) => {
                return Err(TaoError::InvalidArgument(format!("不支持的每帧块数: {n}")));
            }
        };

        let (frame_size_code, frame_size_min) = if eac3 {
            eac3_frame_size(self.bit_rate, self.sample_rate, num_blocks)?
        } else {
            ac3_frame_size(self.bit_rate, sr_code, sr_shift)?
        };

        self.bit_alloc.validate()?;
        self.metadata.validate()?;

        let bitstream_id = if eac3 {
            16
        } else if self.metadata.uses_extended_bsi() {
            if sr_shift > 0 {
                return Err(TaoError::Unsupported(
                    "扩展 BSI 不能与降采样率同时使用".into(),
                ));
            }
            6
        } else {
            8 + sr_shift as u8
        };

        // 以全采样率等效码率衡量每声道码率
        let kbps_per_channel = (self.bit_rate << sr_shift) / 1000 / fbw_channels as u32;

        let bandwidth_code = match self.cutoff {
            Some(cutoff) => {
                let fbw_coeffs = (u64::from(cutoff) * 512 / u64::from(self.sample_rate)) as i64;
                ((fbw_coeffs - 73) / 3).clamp(0, 60) as u8
            }
            None => DEFAULT_BANDWIDTH_CODE,
        };

        let cpl = self.resolve_coupling(channel_mode, kbps_per_channel, bandwidth_code)?;

        let fbw_end = usize::from(bandwidth_code) * 3 + 73;
        let dba = self.resolve_delta_bit_alloc(eac3, fbw_channels, fbw_end, cpl.as_ref())?;

        let setup = Ac3Setup {
            eac3,
            channel_mode,
            lfe_on,
            fbw_channels,
            channels,
            sample_rate: self.sample_rate,
            bit_rate: self.bit_rate,
            sr_code,
            sr_shift,
            bitstream_id,
            num_blocks,
            num_blks_code,
            frame_size_code,
            frame_size_min,
            bandwidth_code,
            cpl,
            rematrixing_enabled: self.rematrixing && channel_mode == ChannelMode::Stereo,
            bit_alloc: self.bit_alloc.params(sr_code, sr_shift),
            fast_gain: FAST_GAIN_TAB[self.bit_alloc.fast_gain as usize],
            dba,
            metadata: self.metadata,
            channel_map: CHANNEL_MAP[channel_mode.acmod() as usize][usize::from(lfe_on)],
        };

        debug!(
            "{} 编码器配置: {} Hz, {} kbit/s, {} (acmod {}), 带宽码 {}, 耦合 {:?}, 每帧 {} 块",
            if eac3 { "E-AC-3" } else { "AC-3" },
            setup.sample_rate,
            setup.bit_rate / 1000,
            self.channel_layout,
            channel_mode.acmod(),
            setup.bandwidth_code,
            setup.cpl.as_ref().map(|c| (c.start_band, c.end_band)),
            setup.num_blocks,
        );
        Ok(setup)
    }

    fn resolve_coupling(
        &self,
        channel_mode: ChannelMode,
        kbps_per_channel: u32,
        bandwidth_code: u8,
    ) -> TaoResult<Option<CouplingSetup>> {
        if let Some(band) = self.cpl_start_band.filter(|&band| band > 15) {
            return Err(TaoError::InvalidArgument(format!(
                "耦合起始子带 {band} 超出范围 0..=15"
            )));
        }

        let start_band = match self.coupling {
            CouplingMode::Off => return Ok(None),
            CouplingMode::On if channel_mode.fbw_channels() < 2 => {
                return Err(TaoError::InvalidArgument(
                    "声道耦合至少需要两个全带宽声道".into(),
                ));
            }
            CouplingMode::Auto if channel_mode.fbw_channels() < 2 => return Ok(None),
            mode => match (self.cpl_start_band, auto_cpl_start_band(kbps_per_channel)) {
                (Some(band), _) => band,
                (None, Some(band)) => band,
                (None, None) if mode == CouplingMode::On => 15,
                (None, None) => return Ok(None),
            },
        };

        Ok(Some(CouplingSetup::new(start_band, bandwidth_code)))
    }

    fn resolve_delta_bit_alloc(
        &self,
        eac3: bool,
        fbw_channels: usize,
        fbw_end: usize,
        cpl: Option<&CouplingSetup>,
    ) -> TaoResult<[Option<Vec<DbaSegment>>; AC3_MAX_CHANNELS]> {
        let mut dba: [Option<Vec<DbaSegment>>; AC3_MAX_CHANNELS] = Default::default();
        if self.delta_bit_alloc.iter().all(Option::is_none) {
            return Ok(dba);
        }
        if eac3 {
            return Err(TaoError::Unsupported("E-AC-3 编码不支持 delta 位分配".into()));
        }
        if self.delta_bit_alloc.len() > fbw_channels {
            return Err(TaoError::InvalidArgument(format!(
                "DBA 声道数 {} 超过全带宽声道数 {fbw_channels}",
                self.delta_bit_alloc.len()
            )));
        }

        // 参与耦合时声道带宽截止于耦合起点
        let end = cpl.map_or(fbw_end, |c| c.start_freq.min(fbw_end));
        let (band_start, band_end) = band_range(0, end);
        for (i, segs) in self.delta_bit_alloc.iter().enumerate() {
            let Some(segs) = segs else { continue };
            if segs.is_empty() {
                return Err(TaoError::InvalidData(format!("声道 {i} 的 DBA 段为空")));
            }
            check_segments(segs, band_start, band_end)
                .map_err(|e| TaoError::InvalidData(format!("声道 {i}: {e}")))?;
            dba[i + 1] = Some(segs.clone());
        }
        Ok(dba)
    }
}

/// 建立期派生的不可变编码参数
#[derive(Debug, Clone)]
pub struct Ac3Setup {
    pub eac3: bool,
    pub channel_mode: ChannelMode,
    pub lfe_on: bool,
    /// 全带宽声道数
    pub fbw_channels: usize,
    /// 全带宽 + LFE 声道数
    pub channels: usize,
    pub sample_rate: u32,
    pub bit_rate: u32,
    /// fscod
    pub sr_code: usize,
    pub sr_shift: u32,
    pub bitstream_id: u8,
    pub num_blocks: usize,
    pub num_blks_code: u8,
    /// AC-3 为 frmsizecod (偶数), E-AC-3 为 frmsiz (字数 - 1)
    pub frame_size_code: u16,
    /// 最小帧长 (字节)
    pub frame_size_min: usize,
    pub bandwidth_code: u8,
    pub cpl: Option<CouplingSetup>,
    pub rematrixing_enabled: bool,
    pub bit_alloc: BitAllocParams,
    /// 快增益值 (所有声道相同)
    pub fast_gain: i32,
    /// 按声道索引的 DBA 段 (仅全带宽声道)
    pub dba: [Option<Vec<DbaSegment>>; AC3_MAX_CHANNELS],
    pub metadata: Ac3Metadata,
    pub channel_map: &'static [usize],
}

impl Ac3Setup {
    /// LFE 声道索引
    pub fn lfe_channel(&self) -> Option<usize> {
        self.lfe_on.then_some(self.fbw_channels + 1)
    }

    /// 未参与耦合时全带宽声道的结束系数
    pub fn fbw_end_freq(&self) -> usize {
        usize::from(self.bandwidth_code) * 3 + 73
    }

    /// 声道的起始系数
    pub fn start_freq(&self, ch: usize) -> usize {
        match (ch, &self.cpl) {
            (0, Some(cpl)) => cpl.start_freq,
            _ => 0,
        }
    }

    /// 是否启用了任何 DBA
    pub fn has_delta_bit_alloc(&self) -> bool {
        self.dba.iter().any(Option::is_some)
    }
}

fn resolve_sample_rate(sample_rate: u32, eac3: bool) -> TaoResult<(usize, u32)> {
    let max_shift = if eac3 { 0 } else { 2 };
    for shift in 0..=max_shift {
        if let Some(code) = SAMPLE_RATE_TAB.iter().position(|&sr| sr >> shift == sample_rate) {
            return Ok((code, shift));
        }
    }
    if eac3
        && SAMPLE_RATE_TAB
            .iter()
            .any(|&sr| sr >> 1 == sample_rate || sr >> 2 == sample_rate)
    {
        return Err(TaoError::Unsupported(format!(
            "E-AC-3 编码不支持降采样率 {sample_rate} Hz"
        )));
    }
    Err(TaoError::InvalidArgument(format!("无效采样率: {sample_rate} Hz")))
}

fn ac3_frame_size(bit_rate: u32, sr_code: usize, sr_shift: u32) -> TaoResult<(u16, usize)> {
    let index = BITRATE_TAB
        .iter()
        .position(|&br| (br >> sr_shift) * 1000 == bit_rate)
        .ok_or_else(|| TaoError::InvalidArgument(format!("AC-3 不支持码率 {bit_rate} bit/s")))?;
    let code = index << 1;
    Ok((code as u16, 2 * FRAME_SIZE_TAB[code][sr_code] as usize))
}

fn eac3_frame_size(bit_rate: u32, sample_rate: u32, num_blocks: usize) -> TaoResult<(u16, usize)> {
    let samples = (num_blocks * 256) as u64;
    let denom = 16 * u64::from(sample_rate);
    let words = (u64::from(bit_rate) * samples + denom / 2) / denom;
    if !(1..=2048).contains(&words) {
        return Err(TaoError::InvalidArgument(format!(
            "E-AC-3 码率 {bit_rate} bit/s 对应帧长 {words} 字, 超出 1..=2048"
        )));
    }
    Ok(((words - 1) as u16, 2 * words as usize))
}

/// 按每声道码率选择耦合起始子带, `None` 表示码率足够高无需耦合
fn auto_cpl_start_band(kbps_per_channel: u32) -> Option<u8> {
    match kbps_per_channel {
        128.. => None,
        96..=127 => Some(11),
        64..=95 => Some(7),
        48..=63 => Some(5),
        _ => Some(3),
    }
}
