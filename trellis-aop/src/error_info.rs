//! 错误信息结构
//!
//! 提供结构化的错误信息传递给切面

use std::error::Error;

/// 结构化的错误信息
///
/// 用于在 after_throwing 通知中记录更丰富的错误信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    /// 错误消息
    pub message: String,

    /// 错误源链（cause chain）
    pub source_chain: Vec<String>,
}

impl ErrorInfo {
    /// 从 `anyhow::Error` 创建 ErrorInfo
    pub fn from_anyhow(error: &anyhow::Error) -> Self {
        Self {
            message: error.to_string(),
            source_chain: error.chain().skip(1).map(ToString::to_string).collect(),
        }
    }

    /// 从标准错误创建 ErrorInfo
    pub fn from_error<E: Error + ?Sized>(error: &E) -> Self {
        let mut source_chain = Vec::new();
        let mut current_source = error.source();
        while let Some(source) = current_source {
            source_chain.push(source.to_string());
            current_source = source.source();
        }

        Self {
            message: error.to_string(),
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

    /// 根因消息
    pub fn root_cause(&self) -> &str {
        self.source_chain.last().unwrap_or(&self.message)
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

impl From<&anyhow::Error> for ErrorInfo {
    fn from(error: &anyhow::Error) -> Self {
        Self::from_anyhow(error)
    }
}
