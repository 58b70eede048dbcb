//! 错误信息结构
//!
//! 提供结构化的错误信息传递给切面

use weft_core::CallError;

/// 结构化的错误信息
///
/// 用于在 after_throwing 通知中传递更丰富的错误信息
#[derive(Debug, Clone)]
pub struct ErrorInfo {
    /// 错误消息
    pub message: String,

    /// 错误源链（cause chain）
    pub source_chain: Vec<String>,
}

impl ErrorInfo {
    /// 从调用错误创建 ErrorInfo
    pub fn from_call_error(error: &CallError) -> Self {
        let message = error.to_string();
        let source_chain = error
            .inner()
            .chain()
            .skip(1)
            .map(|cause| cause.to_string())
            .collect();

        Self {
            message,
            source_chain,
        }
    }

    /// 创建简单的 ErrorInfo（只包含消息）
    pub fn simple(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source_chain: Vec::new(),
        }
    }

    /// 获取完整的错误描述（包含源链）
    pub fn full_description(&self) -> String {
        if self.source_chain.is_empty() {
            self.message.clone()
        } else {
            format!(
                "{}\nCaused by:\n  {}",
                self.message,
                self.source_chain.join("\n  ")
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_error_info_keeps_cause_chain() {
        let result: anyhow::Result<()> = Err(anyhow::anyhow!("disk full")).context("saving room");
        let error = CallError::new(result.unwrap_err());

        let info = ErrorInfo::from_call_error(&error);
        assert_eq!(info.message, "saving room");
        assert_eq!(info.source_chain, vec!["disk full"]);
        assert_eq!(info.full_description(), "saving room\nCaused by:\n  disk full");
    }

    #[test]
    fn test_simple_error_info() {
        let info = ErrorInfo::simple("boom");
        assert_eq!(info.full_description(), "boom");
    }
}
