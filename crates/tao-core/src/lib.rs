//! # tao-core
//!
//! Tao 多媒体框架核心库, 提供错误处理与声道布局等基础类型.
//!
//! 本 crate 对标 FFmpeg 的 libavutil, 为编码核心提供底层基础设施.

pub mod channel_layout;
pub mod error;

// 重导出常用类型
pub use channel_layout::{ChannelLayout, ChannelMask};
pub use error::{TaoError, TaoResult};
