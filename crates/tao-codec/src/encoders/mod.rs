//! 编码器实现模块.

pub mod ac3;
