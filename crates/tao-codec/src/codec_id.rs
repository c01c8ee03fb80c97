//! 编解码器标识符.

use std::fmt;
use std::str::FromStr;

use tao_core::TaoError;

/// 编码核心支持的格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecId {
    /// 未指定
    None,
    /// AC-3 (Dolby Digital)
    Ac3,
    /// E-AC-3 (Dolby Digital Plus)
    Eac3,
}

impl CodecId {
    /// 短名称
    pub const fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Ac3 => "ac3",
            Self::Eac3 => "eac3",
        }
    }

    /// 完整名称
    pub const fn long_name(&self) -> &'static str {
        match self {
            Self::None => "未指定",
            Self::Ac3 => "ATSC A/52A (AC-3)",
            Self::Eac3 => "ATSC A/52B (E-AC-3)",
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for CodecId {
    type Err = TaoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ac3" | "ac-3" => Ok(Self::Ac3),
            "eac3" | "e-ac-3" | "ec3" => Ok(Self::Eac3),
            other => Err(TaoError::InvalidArgument(format!("未知编解码器: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_名称解析() {
        assert_eq!("AC3".parse::<CodecId>().unwrap(), CodecId::Ac3);
        assert_eq!("e-ac-3".parse::<CodecId>().unwrap(), CodecId::Eac3);
        assert!("flac".parse::<CodecId>().is_err());
        assert_eq!(CodecId::Eac3.to_string(), "eac3");
    }
}
