//! 引擎错误处理
//!
//! 只有格式错误的标识符、坐标或快照才是硬错误；缺失的可选体征从不报错

use thiserror::Error;

/// 引擎错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    /// 经纬度超出 WGS84 范围（不会被静默截断）
    #[error("Invalid coordinate: latitude {latitude}, longitude {longitude}")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    /// 主体标识为空
    #[error("Invalid subject: subject identifier must not be empty")]
    InvalidSubject,

    /// 快照字段超出允许范围
    #[error("Invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// 未找到主体
    #[error("Subject not found: {0}")]
    NotFound(String),

    /// 未知的风险等级标签
    #[error("Unknown tier: {0}")]
    UnknownTier(String),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 存储错误
    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// 引擎结果类型
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinate_error_formatting() {
        let error = EngineError::InvalidCoordinate {
            latitude: 200.0,
            longitude: 10.0,
        };
        assert!(error.to_string().contains("latitude 200"));
    }

    #[test]
    fn test_serde_error_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let error: EngineError = parse.unwrap_err().into();
        assert!(matches!(error, EngineError::Serialization(_)));
    }
}
