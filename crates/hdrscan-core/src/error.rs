//! 致命错误类型（单文件失败不走这里，见 `FileReport::Error`）
use std::path::PathBuf;

/// 扫描/加载期的致命错误：输入缺失、规则文件非法、输出写入失败
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("input path not found: {}", .0.display())]
    InputNotFound(PathBuf),

    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid rule file {}: {message}", .path.display())]
    Rules { path: PathBuf, message: String },

    #[error("rule file parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("json output failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("write failed: {0}")]
    Write(#[from] std::io::Error),
}

impl ScanError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub(crate) fn rules(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Rules { path: path.into(), message: message.into() }
    }
}
