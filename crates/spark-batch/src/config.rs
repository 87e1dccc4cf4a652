//! # config 模块说明
//!
//! ## 角色定位（Why）
//! - 批大小、交接策略与日志标签需要能够从部署配置中读取，而不是散落在构造调用处；
//! - 容量钳制与预分配上限集中在这里计算，缓冲本身只消费结果。
//!
//! ## 设计要求（What）
//! - `BufferConfig` 通过 `serde` 从 TOML 反序列化，缺省字段取默认值，未知交接模式直接报错；
//! - 有效容量至少为 1，预分配不超过 [`MAX_PREALLOCATED_ITEMS`]。

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// `pending` 预分配的上限，避免超大容量在构造阶段一次性申请内存。
pub const MAX_PREALLOCATED_ITEMS: usize = 1 << 16;

/// 满批交接时是否继续持有缓冲锁。
///
/// # 教案式说明
/// - **意图 (Why)**：交接槽位被占用时发布方会阻塞；是否在阻塞期间持锁，决定了
///   `subscribe`/`pull`/`close` 能否与停滞的生产者并行推进。
/// - **契约 (What)**：
///   - `HoldLock`：阻塞期间持锁，其他线程上的所有缓冲操作一并等待；
///   - `ReleaseLock`：预约交付序号后释放锁再阻塞，其他操作可继续执行。
/// - **顺序 (How)**：两种模式下批次都按预约序号交付，发布顺序保持不变。
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandoffMode {
    /// 持锁发送。
    #[default]
    HoldLock,
    /// 释放锁后发送。
    ReleaseLock,
}

/// 批处理缓冲的构造参数。
///
/// 可以直接构造，也可以通过 [`BufferConfig::from_toml_str`] 从配置文本加载：
///
/// ```toml
/// capacity = 128
/// handoff = "release_lock"
/// label = "ingest"
/// ```
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// 每批条目数；0 视为 1。
    pub capacity: usize,
    /// 满批交接策略。
    pub handoff: HandoffMode,
    /// 写入日志字段的实例标签，用于区分多个缓冲。
    pub label: Option<String>,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: 1,
            handoff: HandoffMode::default(),
            label: None,
        }
    }
}

impl BufferConfig {
    /// 以给定容量创建默认配置。
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    /// 解析 TOML 文本，缺省字段取默认值。
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// 覆盖批大小。
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// 覆盖交接策略。
    pub fn with_handoff(mut self, handoff: HandoffMode) -> Self {
        self.handoff = handoff;
        self
    }

    /// 设置日志标签。
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// 实际生效的批大小，至少为 1。
    pub fn effective_capacity(&self) -> usize {
        self.capacity.max(1)
    }

    pub(crate) fn preallocation(&self) -> usize {
        self.effective_capacity().min(MAX_PREALLOCATED_ITEMS)
    }
}
