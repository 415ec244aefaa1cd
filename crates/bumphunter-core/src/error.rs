//! 错误类型（模块）
//!
//! - 配置类错误（分箱不兼容、窗口参数非法、npe 为 0 等）：致命，立即返回，不重试。
//! - 资源耗尽：伪实验缓冲或线程池无法分配，附带调参建议。
//! - 数值不稳定不属于错误：在评分处本地恢复并通过 tracing 记录。
use thiserror::Error;

/// 引擎统一错误类型
#[derive(Debug, Error)]
pub enum BumpError {
    /// 配置错误（含窗口枚举为空、分箱不一致）
    #[error("configuration error: {0}")]
    Configuration(String),

    /// 直方图不满足不变量（边界单调、长度一致、内容非负）
    #[error("invalid histogram: {0}")]
    InvalidHistogram(String),

    /// 资源耗尽：无法为伪实验分配缓冲或构建线程池
    #[error("resource exhaustion while preparing {requested} pseudo-experiments on {nworker} workers: {reason}; reduce npe or nworker")]
    ResourceExhaustion {
        requested: usize,
        nworker: usize,
        reason: String,
    },

    /// 配置文件读取失败
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// 配置文件解析失败
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BumpError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        BumpError::Configuration(msg.into())
    }

    /// 是否属于配置类错误（含直方图不变量）
    pub fn is_configuration(&self) -> bool {
        matches!(self, BumpError::Configuration(_) | BumpError::InvalidHistogram(_))
    }
}

pub type Result<T> = std::result::Result<T, BumpError>;
