//! 应用层错误定义
//!
//! 编排器对外调用的统一错误类型

use thiserror::Error;

use crate::application::ports::{CacheError, RepositoryError, SinkError, SynthesisError};

/// 应用层错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 资源未找到
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// 验证错误
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// 状态无效
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// 仓储错误
    #[error("Repository error: {0}")]
    RepositoryError(#[from] RepositoryError),

    /// 合成错误
    #[error("Synthesis error: {0}")]
    SynthesisError(#[from] SynthesisError),

    /// 缓存错误
    #[error("Cache error: {0}")]
    CacheError(#[from] CacheError),

    /// 音频输出错误
    #[error("Audio output error: {0}")]
    SinkError(#[from] SinkError),

    /// 内部错误
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ApplicationError {
    /// 创建 NotFound 错误
    pub fn not_found(resource_type: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// 创建验证错误
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// 创建状态无效错误
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::library::ChapterId;

    #[test]
    fn test_messages() {
        let err = ApplicationError::not_found("Chapter", ChapterId(7));
        assert_eq!(err.to_string(), "Chapter not found: 7");

        let err: ApplicationError = SynthesisError::Timeout.into();
        assert_eq!(err.to_string(), "Synthesis error: Request timeout");
    }
}
