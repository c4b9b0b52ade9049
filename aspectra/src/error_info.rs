//! 错误信息结构
//!
//! 把 `anyhow::Error` 展开为结构化信息，供 AfterThrowing 通知记录

use serde::Serialize;

/// 结构化的错误信息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    /// 错误消息
    pub message: String,

    /// 根因消息
    pub root_cause: String,

    /// 错误源链（不含最外层）
    pub source_chain: Vec<String>,
}

impl ErrorInfo {
    pub fn from_error(error: &anyhow::Error) -> Self {
        let source_chain = error.chain().skip(1).map(|e| e.to_string()).collect();
        Self {
            message: error.to_string(),
            root_cause: error.root_cause().to_string(),
            source_chain,
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
