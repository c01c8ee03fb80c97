//! AC-3 编码常量表.
//!
//! 帧长、带宽划分、听阈、对数加法及 bap 映射等静态表, 均来自 ATSC A/52 附录.

/// 每块频谱系数数
pub const AC3_MAX_COEFS: usize = 256;
/// 每帧最大块数 (E-AC-3 可为 1/2/3/6)
pub const AC3_MAX_BLOCKS: usize = 6;
/// 最大声道数: 耦合声道 + 5 个全带宽声道 + LFE
pub const AC3_MAX_CHANNELS: usize = 7;
/// 临界频带数
pub const AC3_CRITICAL_BANDS: usize = 50;
/// 耦合声道在声道数组中的索引
pub const CPL_CH: usize = 0;
/// 最大耦合子带数
pub const AC3_MAX_CPL_SUBBANDS: usize = 18;
/// 耦合子带宽度 (系数)
pub const CPL_SUBBAND_SIZE: usize = 12;
/// 耦合子带 0 的起始系数
pub const CPL_FIRST_BIN: usize = 37;
/// LFE 声道系数数
pub const LFE_COEFS: usize = 7;
/// 每个 (块, 声道) 最多分组指数数 (DC + 84 组)
pub const MAX_GROUPED_EXPS: usize = 85;

/// 块间指数差异 (SAD) 超过该值时重新发送指数
pub const EXP_DIFF_THRESHOLD: u32 = 500;

/// 系数最大幅度 (24 位定点)
pub const COEF_MAX_FIXED: i32 = (1 << 24) - 1;

/// 基础采样率 (Hz), 按 fscod 索引
pub const SAMPLE_RATE_TAB: [u32; 3] = [48000, 44100, 32000];

/// 标准码率 (kbit/s), 按 frmsizecod / 2 索引
pub const BITRATE_TAB: [u32; 19] = [
    32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 448, 512, 576, 640,
];

/// 帧长 (16 位字), 按 [frmsizecod][fscod] 索引
pub const FRAME_SIZE_TAB: [[u16; 3]; 38] = [
    [64, 69, 96],
    [64, 70, 96],
    [80, 87, 120],
    [80, 88, 120],
    [96, 104, 144],
    [96, 105, 144],
    [112, 121, 168],
    [112, 122, 168],
    [128, 139, 192],
    [128, 140, 192],
    [160, 174, 240],
    [160, 175, 240],
    [192, 208, 288],
    [192, 209, 288],
    [224, 243, 336],
    [224, 244, 336],
    [256, 278, 384],
    [256, 279, 384],
    [320, 348, 480],
    [320, 349, 480],
    [384, 417, 576],
    [384, 418, 576],
    [448, 487, 672],
    [448, 488, 672],
    [512, 557, 768],
    [512, 558, 768],
    [640, 696, 960],
    [640, 697, 960],
    [768, 835, 1152],
    [768, 836, 1152],
    [896, 975, 1344],
    [896, 976, 1344],
    [1024, 1114, 1536],
    [1024, 1115, 1536],
    [1152, 1253, 1728],
    [1152, 1254, 1728],
    [1280, 1393, 1920],
    [1280, 1394, 1920],
];

/// 慢衰减 (sdcycod)
pub const SLOW_DECAY_TAB: [i32; 4] = [0x0F, 0x11, 0x13, 0x15];
/// 快衰减 (fdcycod)
pub const FAST_DECAY_TAB: [i32; 4] = [0x3F, 0x53, 0x67, 0x7B];
/// 慢增益 (sgaincod)
pub const SLOW_GAIN_TAB: [i32; 4] = [0x540, 0x4D8, 0x478, 0x410];
/// dB/bit 拐点 (dbpbcod)
pub const DB_PER_BIT_TAB: [i32; 4] = [0x000, 0x700, 0x900, 0xB00];
/// 绝对底噪 (floorcod), 码 7 为 -2048
pub const FLOOR_TAB: [i32; 8] = [0x2F0, 0x2B0, 0x270, 0x230, 0x1F0, 0x170, 0x0F0, -0x800];
/// 快增益 (fgaincod)
pub const FAST_GAIN_TAB: [i32; 8] = [0x080, 0x100, 0x180, 0x200, 0x280, 0x300, 0x380, 0x400];

/// 临界频带起始系数, 末尾哨兵 253
pub const BAND_START_TAB: [u8; AC3_CRITICAL_BANDS + 1] = [
    0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25,
    26, 27, 28, 31, 34, 37, 40, 43, 46, 49, 55, 61, 67, 73, 79, 85, 97, 109, 121, 133, 157, 181,
    205, 229, 253,
];

/// 系数 -> 临界频带映射
pub const BIN_TO_BAND_TAB: [u8; 253] = build_bin_to_band();

const fn build_bin_to_band() -> [u8; 253] {
    let mut tab = [0u8; 253];
    let mut band = 0;
    while band < AC3_CRITICAL_BANDS {
        let mut bin = BAND_START_TAB[band] as usize;
        while bin < BAND_START_TAB[band + 1] as usize {
            tab[bin] = band as u8;
            bin += 1;
        }
        band += 1;
    }
    tab
}

/// 对数加法近似表
pub const LOG_ADD_TAB: [u16; 256] = [
    0x40, 0x3f, 0x3e, 0x3d, 0x3c, 0x3b, 0x3a, 0x39, 0x38, 0x37, 0x36, 0x35, 0x34, 0x34, 0x33,
    0x32, 0x31, 0x30, 0x2f, 0x2f, 0x2e, 0x2d, 0x2c, 0x2c, 0x2b, 0x2a, 0x29, 0x29, 0x28, 0x27,
    0x26, 0x26, 0x25, 0x24, 0x24, 0x23, 0x23, 0x22, 0x21, 0x21, 0x20, 0x20, 0x1f, 0x1e, 0x1e,
    0x1d, 0x1d, 0x1c, 0x1c, 0x1b, 0x1b, 0x1a, 0x1a, 0x19, 0x19, 0x18, 0x18, 0x17, 0x17, 0x16,
    0x16, 0x15, 0x15, 0x15, 0x14, 0x14, 0x13, 0x13, 0x13, 0x12, 0x12, 0x12, 0x11, 0x11, 0x11,
    0x10, 0x10, 0x10, 0x0f, 0x0f, 0x0f, 0x0e, 0x0e, 0x0e, 0x0d, 0x0d, 0x0d, 0x0d, 0x0c, 0x0c,
    0x0c, 0x0c, 0x0b, 0x0b, 0x0b, 0x0b, 0x0a, 0x0a, 0x0a, 0x0a, 0x0a, 0x09, 0x09, 0x09, 0x09,
    0x09, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x07, 0x07, 0x07, 0x07, 0x07, 0x07, 0x06, 0x06,
    0x06, 0x06, 0x06, 0x06, 0x06, 0x06, 0x05, 0x05, 0x05, 0x05, 0x05, 0x05, 0x05, 0x05, 0x04,
    0x04, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04, 0x03, 0x03, 0x03, 0x03, 0x03,
    0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x03, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02,
    0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x02, 0x01, 0x01,
    0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
    0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01, 0x01,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00,
];

/// 绝对听阈, 按 [fscod][band] 索引
pub const HEARING_THRESHOLD_TAB: [[u16; AC3_CRITICAL_BANDS]; 3] = [
    [
        0x04D0, 0x04D0, 0x0440, 0x0400, 0x03E0, 0x03C0, 0x03B0, 0x03B0, 0x03A0, 0x03A0, 0x03A0,
        0x03A0, 0x03A0, 0x0390, 0x0390, 0x0390, 0x0380, 0x0380, 0x0370, 0x0370, 0x0360, 0x0360,
        0x0350, 0x0350, 0x0340, 0x0340, 0x0330, 0x0320, 0x0310, 0x0300, 0x02F0, 0x02F0, 0x02F0,
        0x02F0, 0x0300, 0x0310, 0x0340, 0x0390, 0x03E0, 0x0420, 0x0460, 0x0490, 0x04A0, 0x0460,
        0x0440, 0x0440, 0x0520, 0x0800, 0x0840, 0x0840,
    ],
    [
        0x04F0, 0x04F0, 0x0460, 0x0410, 0x03E0, 0x03D0, 0x03C0, 0x03B0, 0x03B0, 0x03A0, 0x03A0,
        0x03A0, 0x03A0, 0x03A0, 0x0390, 0x0390, 0x0390, 0x0380, 0x0380, 0x0380, 0x0370, 0x0370,
        0x0360, 0x0360, 0x0350, 0x0350, 0x0340, 0x0340, 0x0320, 0x0310, 0x0300, 0x02F0, 0x02F0,
        0x02F0, 0x02F0, 0x0300, 0x0320, 0x0350, 0x0390, 0x03E0, 0x0420, 0x0450, 0x04A0, 0x0490,
        0x0460, 0x0440, 0x0480, 0x0630, 0x0840, 0x0840,
    ],
    [
        0x0580, 0x0580, 0x04B0, 0x0450, 0x0420, 0x03F0, 0x03E0, 0x03D0, 0x03C0, 0x03B0, 0x03B0,
        0x03B0, 0x03A0, 0x03A0, 0x03A0, 0x03A0, 0x03A0, 0x03A0, 0x03A0, 0x03A0, 0x0390, 0x0390,
        0x0390, 0x0390, 0x0380, 0x0380, 0x0380, 0x0370, 0x0360, 0x0350, 0x0340, 0x0330, 0x0320,
        0x0310, 0x0300, 0x02F0, 0x02F0, 0x02F0, 0x0300, 0x0310, 0x0330, 0x0350, 0x03C0, 0x0410,
        0x0470, 0x04A0, 0x0460, 0x0440, 0x0450, 0x04E0,
    ],
];

/// 掩蔽余量地址 -> bap, 单调不减
pub const BAP_TAB: [u8; 64] = [
    0, 1, 1, 1, 1, 1, 2, 2, 3, 3, 3, 4, 4, 5, 5, 6, 6, 6, 6, 7, 7, 7, 7, 8, 8, 8, 8, 9, 9, 9, 9,
    10, 10, 10, 10, 11, 11, 11, 11, 12, 12, 12, 12, 13, 13, 13, 13, 14, 14, 14, 14, 14, 14, 14, 14,
    15, 15, 15, 15, 15, 15, 15, 15, 15,
];

/// 每个 bap 的尾数位宽 (bap 1/2/4 为分组打包, 单独计数)
pub const BAP_BITS: [u8; 16] = [0, 5, 7, 3, 7, 4, 5, 6, 7, 8, 9, 10, 11, 12, 14, 16];

/// 立体声重矩阵频带边界
pub const REMATRIX_BAND_TAB: [usize; 5] = [13, 25, 37, 61, 253];

/// E-AC-3 默认耦合频带结构: 1 表示与前一子带合并
pub const DEFAULT_CPL_BAND_STRUCT: [u8; AC3_MAX_CPL_SUBBANDS] =
    [0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 1, 1, 0, 1, 1, 1, 1, 1];

/// 布局顺序 -> AC-3 声道顺序映射, 按 [acmod][lfeon] 索引
pub const CHANNEL_MAP: [[&[usize]; 2]; 8] = [
    [&[0, 1], &[0, 1, 2]],
    [&[0], &[0, 1]],
    [&[0, 1], &[0, 1, 2]],
    [&[0, 2, 1], &[0, 2, 1, 3]],
    [&[0, 1, 2], &[0, 1, 3, 2]],
    [&[0, 2, 1, 3], &[0, 2, 1, 4, 3]],
    [&[0, 1, 2, 3], &[0, 1, 3, 4, 2]],
    [&[0, 2, 1, 3, 4], &[0, 2, 1, 4, 5, 3]],
];
