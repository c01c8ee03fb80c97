//! 统一错误类型定义.
//!
//! 所有 Tao crate 共用的错误类型, 支持跨模块传播.

use thiserror::Error;

/// Tao 框架统一错误类型
#[derive(Debug, Error)]
pub enum TaoError {
    /// 无效参数 (配置错误, 在处理任何块之前报告)
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    /// 不支持的操作
    #[error("不支持的操作: {0}")]
    Unsupported(String),

    /// 位分配失败: 当前码率无法容纳该帧所需精度
    #[error("位分配失败: {0}")]
    BitAllocation(String),

    /// 无效数据 (如越界的 delta 位分配段)
    #[error("无效数据: {0}")]
    InvalidData(String),
}

impl TaoError {
    /// 是否为帧级可恢复错误 (调用方可提高码率后重试)
    pub fn is_frame_error(&self) -> bool {
        matches!(self, Self::BitAllocation(_))
    }
}

/// Tao 框架统一 Result 类型
pub type TaoResult<T> = Result<T, TaoError>;
