//! 功率谱密度与掩蔽曲线.
//!
//! 由指数求逐系数 PSD, 按临界频带做对数加法积分,
//! 再经快/慢泄漏递推得到激励曲线, 与听阈比较后得到掩蔽曲线.
//! 可选的 delta 位分配 (DBA) 段在频带上微调掩蔽曲线.

use tao_core::{TaoError, TaoResult};

use super::tables::{
    AC3_CRITICAL_BANDS, BAND_START_TAB, BIN_TO_BAND_TAB, HEARING_THRESHOLD_TAB, LOG_ADD_TAB,
};

/// 每声道最多 DBA 段数
pub const MAX_DBA_SEGMENTS: usize = 8;

/// 位分配参数 (已按采样率移位换算)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitAllocParams {
    /// 采样率类别 (fscod)
    pub sr_code: usize,
    /// 降采样移位 (0/1/2)
    pub sr_shift: u32,
    pub slow_gain: i32,
    pub slow_decay: i32,
    pub fast_decay: i32,
    pub db_per_bit: i32,
    pub floor: i32,
    /// 耦合声道快泄漏初值码
    pub cpl_fast_leak: i32,
    /// 耦合声道慢泄漏初值码
    pub cpl_slow_leak: i32,
}

/// 一个 delta 位分配段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbaSegment {
    /// 相对上一段末尾的频带偏移 (5 位)
    pub offset: u8,
    /// 覆盖频带数 (4 位)
    pub length: u8,
    /// 调整量码 (3 位): 0..=3 为降低, 4..=7 为提升
    pub value: u8,
}

impl DbaSegment {
    pub const fn new(offset: u8, length: u8, value: u8) -> Self {
        Self {
            offset,
            length,
            value,
        }
    }

    /// 掩蔽曲线调整量, 以 128 (约 6 dB) 为步长
    pub fn delta(&self) -> i16 {
        let v = i16::from(self.value);
        if v >= 4 { (v - 3) * 128 } else { (v - 4) * 128 }
    }

    /// 检查各字段位宽
    pub fn check_fields(&self) -> bool {
        self.offset < 32 && self.length < 16 && self.value < 8
    }
}

/// DBA 模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbaMode<'a> {
    /// 不做调整
    None,
    /// 沿用该声道上一次的段
    Reuse,
    /// 使用新提供的段
    New(&'a [DbaSegment]),
}

/// 单声道 DBA 状态: 记录最近一次生效的段
#[derive(Debug, Clone, Default)]
pub struct DbaState {
    segments: Option<Vec<DbaSegment>>,
}

impl DbaState {
    /// 最近一次生效的段
    pub fn segments(&self) -> Option<&[DbaSegment]> {
        self.segments.as_deref()
    }
}

/// 指数 -> PSD, 并按临界频带积分
///
/// `psd`/`band_psd` 仅写入 [start, end) 及其覆盖的频带.
pub fn calc_psd(exp: &[u8], start: usize, end: usize, psd: &mut [i16], band_psd: &mut [i16]) {
    for bin in start..end {
        psd[bin] = 3072 - (i16::from(exp[bin]) << 7);
    }

    let mut bin = start;
    let mut band = BIN_TO_BAND_TAB[start] as usize;
    loop {
        let mut v = i32::from(psd[bin]);
        bin += 1;
        let band_end = (BAND_START_TAB[band + 1] as usize).min(end);
        while bin < band_end {
            let p = i32::from(psd[bin]);
            let max = v.max(p);
            let adr = (max - ((v + p + 1) >> 1)).min(255) as usize;
            v = max + i32::from(LOG_ADD_TAB[adr]);
            bin += 1;
        }
        band_psd[band] = v as i16;
        band += 1;
        if end <= BAND_START_TAB[band] as usize {
            break;
        }
    }
}

#[inline]
fn calc_lowcomp1(a: i32, b0: i32, b1: i32, c: i32) -> i32 {
    if b0 + 256 == b1 {
        c
    } else if b0 > b1 {
        (a - 64).max(0)
    } else {
        a
    }
}

#[inline]
fn calc_lowcomp(a: i32, b0: i32, b1: i32, band: usize) -> i32 {
    if band < 7 {
        calc_lowcomp1(a, b0, b1, 384)
    } else if band < 20 {
        calc_lowcomp1(a, b0, b1, 320)
    } else {
        (a - 128).max(0)
    }
}

/// 由频带 PSD 计算掩蔽曲线并应用 DBA
///
/// 返回 `InvalidData` 当且仅当 DBA 段越界或模式与状态不一致.
#[allow(clippy::too_many_arguments)]
pub fn calc_mask(
    params: &BitAllocParams,
    band_psd: &[i16],
    start: usize,
    end: usize,
    fast_gain: i32,
    is_lfe: bool,
    dba: DbaMode<'_>,
    dba_state: &mut DbaState,
    mask: &mut [i16],
) -> TaoResult<()> {
    if end <= start {
        return Err(TaoError::InvalidData(format!(
            "掩蔽计算范围为空: [{start}, {end})"
        )));
    }

    let bpsd = |band: usize| i32::from(band_psd[band]);
    let mut excite = [0i32; AC3_CRITICAL_BANDS];
    let band_start = BIN_TO_BAND_TAB[start] as usize;
    let band_end = BIN_TO_BAND_TAB[end - 1] as usize + 1;

    let mut fastleak;
    let mut slowleak;
    let begin;

    if band_start == 0 {
        let mut lowcomp = calc_lowcomp1(0, bpsd(0), bpsd(1), 384);
        excite[0] = bpsd(0) - fast_gain - lowcomp;
        lowcomp = calc_lowcomp1(lowcomp, bpsd(1), bpsd(2), 384);
        excite[1] = bpsd(1) - fast_gain - lowcomp;

        let mut low_begin = 7;
        fastleak = 0;
        slowleak = 0;
        for band in 2..7 {
            let lfe_edge = is_lfe && band == 6;
            if !lfe_edge {
                lowcomp = calc_lowcomp1(lowcomp, bpsd(band), bpsd(band + 1), 384);
            }
            fastleak = bpsd(band) - fast_gain;
            slowleak = bpsd(band) - params.slow_gain;
            excite[band] = fastleak - lowcomp;
            if !lfe_edge && bpsd(band) <= bpsd(band + 1) {
                low_begin = band + 1;
                break;
            }
        }

        for band in low_begin..band_end.min(22) {
            if !(is_lfe && band == 6) {
                lowcomp = calc_lowcomp(lowcomp, bpsd(band), bpsd(band + 1), band);
            }
            fastleak = (fastleak - params.fast_decay).max(bpsd(band) - fast_gain);
            slowleak = (slowleak - params.slow_decay).max(bpsd(band) - params.slow_gain);
            excite[band] = (fastleak - lowcomp).max(slowleak);
        }
        begin = 22;
    } else {
        // 耦合声道从保存的泄漏值开始
        begin = band_start;
        fastleak = (params.cpl_fast_leak << 8) + 768;
        slowleak = (params.cpl_slow_leak << 8) + 768;
    }

    for band in begin..band_end {
        fastleak = (fastleak - params.fast_decay).max(bpsd(band) - fast_gain);
        slowleak = (slowleak - params.slow_decay).max(bpsd(band) - params.slow_gain);
        excite[band] = fastleak.max(slowleak);
    }

    let hth = &HEARING_THRESHOLD_TAB[params.sr_code];
    for band in band_start..band_end {
        let tmp = params.db_per_bit - bpsd(band);
        if tmp > 0 {
            excite[band] += tmp >> 2;
        }
        let threshold = i32::from(hth[band >> params.sr_shift]);
        mask[band] = threshold.max(excite[band]) as i16;
    }

    apply_delta(dba, dba_state, band_start, band_end, mask)
}

/// 按 DBA 段调整掩蔽曲线
fn apply_delta(
    dba: DbaMode<'_>,
    state: &mut DbaState,
    band_start: usize,
    band_end: usize,
    mask: &mut [i16],
) -> TaoResult<()> {
    match dba {
        DbaMode::None => Ok(()),
        DbaMode::New(segs) => {
            if segs.is_empty() {
                return Err(TaoError::InvalidData("DBA 新模式未提供任何段".into()));
            }
            apply_segments(segs, band_start, band_end, mask)?;
            state.segments = Some(segs.to_vec());
            Ok(())
        }
        DbaMode::Reuse => {
            let segs = state.segments.as_deref().ok_or_else(|| {
                TaoError::InvalidData("DBA 复用模式下没有可复用的段".into())
            })?;
            apply_segments(segs, band_start, band_end, mask)
        }
    }
}

fn apply_segments(
    segments: &[DbaSegment],
    band_start: usize,
    band_end: usize,
    mask: &mut [i16],
) -> TaoResult<()> {
    check_segments(segments, band_start, band_end)?;

    let mut band = band_start;
    for seg in segments {
        band += seg.offset as usize;
        let delta = seg.delta();
        for m in &mut mask[band..band + seg.length as usize] {
            *m = m.saturating_add(delta);
        }
        band += seg.length as usize;
    }
    Ok(())
}

/// 检查 DBA 段数、位宽及频带边界
pub fn check_segments(
    segments: &[DbaSegment],
    band_start: usize,
    band_end: usize,
) -> TaoResult<()> {
    if segments.len() > MAX_DBA_SEGMENTS {
        return Err(TaoError::InvalidData(format!(
            "DBA 段数 {} 超过上限 {MAX_DBA_SEGMENTS}",
            segments.len()
        )));
    }
    let mut band = band_start;
    for (i, seg) in segments.iter().enumerate() {
        if !seg.check_fields() {
            return Err(TaoError::InvalidData(format!("DBA 段 {i} 字段越界: {seg:?}")));
        }
        band += seg.offset as usize;
        if band >= band_end || seg.length as usize > band_end - band {
            return Err(TaoError::InvalidData(format!(
                "DBA 段 {i} 超出频带范围 [{band_start}, {band_end})"
            )));
        }
        band += seg.length as usize;
    }
    Ok(())
}

/// 覆盖 [start, end) 系数的频带范围
pub fn band_range(start: usize, end: usize) -> (usize, usize) {
    (
        BIN_TO_BAND_TAB[start] as usize,
        BIN_TO_BAND_TAB[end - 1] as usize + 1,
    )
}
