//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 集中定义批处理缓冲对外可观测的失败信号，调用方必须能够区分“尚未订阅”与“已经关闭”；
//! - 接收端的非阻塞 / 限时接收同样需要区分“暂时无数据”与“通道已终止”。
//!
//! ## 设计要求（What）
//! - 所有错误类型派生 `thiserror::Error`，兼容 `std::error::Error` 与 `?` 传播；
//! - 除配置解析错误外均为 `Copy`，便于在自旋重试循环中按值比较。

use thiserror::Error;

/// `publish` 的失败原因。
///
/// # 教案式说明
/// - **意图 (Why)**：发布是唯一可能失败的缓冲操作，两类失败的恢复策略截然不同，必须显式区分。
/// - **契约 (What)**：
///   - `NotSubscribed`：可恢复，调用方在完成订阅后重试即可；
///   - `Closed`：终态，重试没有意义，只能重新构造缓冲。
/// - **优先级 (How)**：缓冲同时处于“未订阅”与“已关闭”时返回 `Closed`。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Error)]
pub enum BatchError {
    /// 尚未有任何订阅者，拒绝写入以避免 `pending` 无界增长。
    #[error("buffer is not subscribed")]
    NotSubscribed,

    /// 缓冲已关闭，后续发布全部被拒绝。
    #[error("buffer is closed")]
    Closed,
}

impl BatchError {
    /// 是否值得在稍后重试。
    pub fn is_retryable(&self) -> bool {
        matches!(self, BatchError::NotSubscribed)
    }

    /// 是否为不可恢复的终态错误。
    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchError::Closed)
    }
}

/// [`Subscription::try_recv`](crate::Subscription::try_recv) 的失败原因。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Error)]
pub enum TryRecvError {
    /// 当前没有可交付的批次，但通道仍然开放。
    #[error("no batch is ready")]
    Empty,

    /// 通道已关闭且所有已预约的批次都已交付。
    #[error("handoff is closed and drained")]
    Disconnected,
}

/// [`Subscription::recv_timeout`](crate::Subscription::recv_timeout) 的失败原因。
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Error)]
pub enum RecvTimeoutError {
    /// 超时前没有批次到达。
    #[error("timed out waiting for a batch")]
    Timeout,

    /// 通道已关闭且所有已预约的批次都已交付。
    #[error("handoff is closed and drained")]
    Disconnected,
}

/// 配置加载失败。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// TOML 文本无法映射到 [`BufferConfig`](crate::BufferConfig)。
    #[error("failed to parse buffer config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification_is_disjoint() {
        assert!(BatchError::NotSubscribed.is_retryable());
        assert!(!BatchError::NotSubscribed.is_terminal());
        assert!(BatchError::Closed.is_terminal());
        assert!(!BatchError::Closed.is_retryable());
    }

    #[test]
    fn display_messages_are_stable() {
        assert_eq!(BatchError::NotSubscribed.to_string(), "buffer is not subscribed");
        assert_eq!(BatchError::Closed.to_string(), "buffer is closed");
        assert_eq!(TryRecvError::Empty.to_string(), "no batch is ready");
        assert_eq!(
            RecvTimeoutError::Disconnected.to_string(),
            "handoff is closed and drained"
        );
    }
}
