//! # tao-ac3
//!
//! 纯 Rust 实现的 AC-3 / E-AC-3 编码器心理声学核心, 对标 FFmpeg ac3enc.
//!
//! 输入为已完成 MDCT 的频域系数, 输出为每帧的量化结果:
//! - **指数**: 提取, 策略选择 (D15/D25/D45/复用), 差分约束与 7 位分组
//! - **掩蔽**: PSD 积分, 激励与掩蔽曲线, delta 位分配
//! - **位分配**: 在帧预算内搜索最大 SNR 偏移
//! - **耦合与重矩阵**: 耦合通道合成, 坐标量化, 立体声和差判决
//! - **尾数**: 对称/非对称量化, 跨声道分组打包
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use tao_ac3::codec::{Ac3EncoderConfig, Ac3FixedEncoder};
//!
//! let config = Ac3EncoderConfig::default();
//! let mut encoder = Ac3FixedEncoder::new(&config).expect("配置无效");
//! let input = vec![0i32; encoder.coefs_per_frame()];
//! let frame = encoder.encode_frame(&input).expect("编码失败");
//! println!("帧长 {} 字节, SNR 偏移 {}", frame.frame_size(), frame.snr_offset());
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `tao-core` | 错误类型与声道布局 |
//! | `tao-codec` | AC-3 / E-AC-3 编码核心 |

/// 核心类型与工具 (对标 libavutil)
pub use tao_core as core;

/// 编码核心 (对标 libavcodec/ac3enc)
pub use tao_codec as codec;

pub mod logging;

/// 获取版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
