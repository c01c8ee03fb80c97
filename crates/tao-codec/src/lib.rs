//! # tao-codec
//!
//! Tao 多媒体框架编解码器库: AC-3 / E-AC-3 编码器的心理声学与位分配核心.
//!
//! 输入为 MDCT 系数, 输出为写码流所需的全部编码决策
//! (指数与指数策略、耦合坐标、重矩阵标志、SNR 偏移、bap 与量化尾数).
//! 窗函数/MDCT 与比特流写出不在本 crate 范围内.
//!
//! ## 使用示例
//!
//! ```rust
//! use tao_codec::CodecId;
//! use tao_codec::encoders::ac3::{Ac3EncoderConfig, Ac3FixedEncoder};
//! use tao_core::ChannelLayout;
//!
//! let config = Ac3EncoderConfig::new(CodecId::Ac3, 48000, 192_000, ChannelLayout::STEREO);
//! let mut encoder = Ac3FixedEncoder::new(&config).unwrap();
//!
//! // 6 块 x 2 声道 x 256 个系数
//! let coefs = vec![0i32; encoder.coefs_per_frame()];
//! let frame = encoder.encode_frame(&coefs).unwrap();
//! assert!(frame.total_bits() <= frame.frame_size() * 8);
//! ```

pub mod codec_id;
pub mod encoders;

// 重导出常用类型
pub use codec_id::CodecId;
pub use encoders::ac3::{
    Ac3Encoder, Ac3EncoderConfig, Ac3FixedEncoder, Ac3FloatEncoder, Ac3Frame, CouplingMode,
};
