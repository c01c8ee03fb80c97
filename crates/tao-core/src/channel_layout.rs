//! 音频声道布局定义.
//!
//! 对标 FFmpeg 的 `AVChannelLayout` / `AV_CH_LAYOUT_*`, 仅保留 AC-3 可表达的扬声器位置.

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// 声道位掩码, 每个位代表一个扬声器位置
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChannelMask: u64 {
        /// 前方左声道
        const FRONT_LEFT            = 1 << 0;
        /// 前方右声道
        const FRONT_RIGHT           = 1 << 1;
        /// 前方中央声道
        const FRONT_CENTER          = 1 << 2;
        /// 低频效果 (LFE / 重低音)
        const LOW_FREQUENCY         = 1 << 3;
        /// 后方左声道
        const BACK_LEFT             = 1 << 4;
        /// 后方右声道
        const BACK_RIGHT            = 1 << 5;
        /// 后方中央声道
        const BACK_CENTER           = 1 << 8;
        /// 侧方左声道
        const SIDE_LEFT             = 1 << 9;
        /// 侧方右声道
        const SIDE_RIGHT            = 1 << 10;
    }
}

/// 声道布局
///
/// 描述音频流中声道的数量和排列方式.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelLayout {
    /// 声道数量
    pub channels: u32,
    /// 声道位掩码 (标准布局使用)
    pub mask: ChannelMask,
}

impl ChannelLayout {
    /// 单声道
    pub const MONO: Self = Self::from_mask(ChannelMask::FRONT_CENTER);

    /// 立体声 (左右)
    pub const STEREO: Self =
        Self::from_mask(ChannelMask::FRONT_LEFT.union(ChannelMask::FRONT_RIGHT));

    /// 3.0 (左 中 右)
    pub const SURROUND: Self = Self::from_mask(
        ChannelMask::FRONT_LEFT
            .union(ChannelMask::FRONT_RIGHT)
            .union(ChannelMask::FRONT_CENTER),
    );

    /// 2.1 (左 右 后中), 注意不含 LFE
    pub const LAYOUT_2_1: Self = Self::from_mask(
        ChannelMask::FRONT_LEFT
            .union(ChannelMask::FRONT_RIGHT)
            .union(ChannelMask::BACK_CENTER),
    );

    /// 4.0 (左 中 右 后中)
    pub const LAYOUT_4POINT0: Self = Self::from_mask(
        ChannelMask::FRONT_LEFT
            .union(ChannelMask::FRONT_RIGHT)
            .union(ChannelMask::FRONT_CENTER)
            .union(ChannelMask::BACK_CENTER),
    );

    /// 2.2 (左 右 侧左 侧右)
    pub const LAYOUT_2_2: Self = Self::from_mask(
        ChannelMask::FRONT_LEFT
            .union(ChannelMask::FRONT_RIGHT)
            .union(ChannelMask::SIDE_LEFT)
            .union(ChannelMask::SIDE_RIGHT),
    );

    /// 四声道 (左 右 后左 后右)
    pub const QUAD: Self = Self::from_mask(
        ChannelMask::FRONT_LEFT
            .union(ChannelMask::FRONT_RIGHT)
            .union(ChannelMask::BACK_LEFT)
            .union(ChannelMask::BACK_RIGHT),
    );

    /// 5.0 (侧环绕)
    pub const LAYOUT_5POINT0: Self = Self::from_mask(
        ChannelMask::FRONT_LEFT
            .union(ChannelMask::FRONT_RIGHT)
            .union(ChannelMask::FRONT_CENTER)
            .union(ChannelMask::SIDE_LEFT)
            .union(ChannelMask::SIDE_RIGHT),
    );

    /// 5.0 (后环绕)
    pub const LAYOUT_5POINT0_BACK: Self = Self::from_mask(
        ChannelMask::FRONT_LEFT
            .union(ChannelMask::FRONT_RIGHT)
            .union(ChannelMask::FRONT_CENTER)
            .union(ChannelMask::BACK_LEFT)
            .union(ChannelMask::BACK_RIGHT),
    );

    /// 5.1 环绕声
    pub const SURROUND_5_1: Self = Self::LAYOUT_5POINT0_BACK.with_lfe();

    /// 由位掩码构造布局, 声道数取置位个数
    pub const fn from_mask(mask: ChannelMask) -> Self {
        Self {
            channels: mask.bits().count_ones(),
            mask,
        }
    }

    /// 根据声道数创建默认布局
    pub fn from_channels(channels: u32) -> Self {
        match channels {
            1 => Self::MONO,
            2 => Self::STEREO,
            3 => Self::SURROUND,
            4 => Self::QUAD,
            5 => Self::LAYOUT_5POINT0_BACK,
            6 => Self::SURROUND_5_1,
            n => Self {
                channels: n,
                mask: ChannelMask::empty(),
            },
        }
    }

    /// 是否包含 LFE 声道
    pub const fn has_lfe(&self) -> bool {
        self.mask.contains(ChannelMask::LOW_FREQUENCY)
    }

    /// 追加 LFE 声道
    pub const fn with_lfe(self) -> Self {
        Self::from_mask(self.mask.union(ChannelMask::LOW_FREQUENCY))
    }

    /// 去掉 LFE 声道, 得到全带宽声道布局
    pub const fn without_lfe(self) -> Self {
        Self::from_mask(self.mask.difference(ChannelMask::LOW_FREQUENCY))
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = match self.without_lfe() {
            Self::MONO => "mono",
            Self::STEREO => "stereo",
            Self::SURROUND => "3.0",
            Self::LAYOUT_2_1 => "2.1",
            Self::LAYOUT_4POINT0 => "4.0",
            Self::LAYOUT_2_2 => "2.2",
            Self::QUAD => "quad",
            Self::LAYOUT_5POINT0 => "5.0(side)",
            Self::LAYOUT_5POINT0_BACK => "5.0",
            _ => return write!(f, "{}ch", self.channels),
        };
        if self.has_lfe() {
            write!(f, "{base}+lfe")
        } else {
            write!(f, "{base}")
        }
    }
}
