//! # buffer 模块说明
//!
//! ## 角色定位（Why）
//! - 承载发布 / 订阅 / 拉取 / 关闭四个操作的状态机，是整个 crate 唯一的公开入口类型所在；
//! - 满批在此离开缓冲锁的保护，交给 `handoff` 模块的单槽通道。
//!
//! ## 设计要求（What）
//! - 状态变更全部在同一把锁内完成，拒绝发布时不修改任何状态；
//! - 生命周期事件以 `tracing` 结构化字段记录，`label` 用于区分同一进程内的多个缓冲。

use std::{fmt, mem, sync::Arc};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::{
    config::{BufferConfig, HandoffMode},
    error::BatchError,
    handoff::{Handoff, Subscription},
};

/// `BatchBuffer` 把逐条发布的生产者与按整批消费的订阅者桥接起来。
///
/// # 模块角色（Why）
/// - 生产者一次只交付一个条目，订阅者希望以固定大小的批次处理；
/// - 缓冲在条目数达到容量时立即把整批交给订阅者，并提供 `pull` 作为随时取走残余条目的逃生口。
///
/// # 核心机制（How）
/// - 所有可变状态（`pending`、`subscribed`、`closed`）由同一把 `parking_lot::Mutex` 串行化；
/// - 满批写入单槽交接通道，槽位被占用时发布方阻塞，形成唯一的背压点；
/// - 句柄内部是 `Arc`，克隆后可在多个生产者线程间共享同一缓冲。
///
/// # 契约说明（What）
/// - `pending` 的长度在每次操作完成后都严格小于容量；
/// - 每个交付的批次恰好包含 `capacity` 个条目，且保持发布顺序；
/// - `subscribed` 与 `closed` 都只会从 `false` 变为 `true` 一次；
/// - 最后一个句柄被释放时若尚未关闭，会自动关闭交接通道，使订阅循环得以结束。
///
/// # 设计权衡（Trade-offs）
/// - 默认 [`HandoffMode::HoldLock`] 在阻塞交接期间持锁，停滞的生产者会连带阻塞 `subscribe`/`pull`/`close`；
/// - [`HandoffMode::ReleaseLock`] 先预约交付序号再释放锁，顺序由序号保证，
///   代价是一次额外的条件变量往返。
pub struct BatchBuffer<T> {
    inner: Arc<Shared<T>>,
}

struct Shared<T> {
    capacity: usize,
    preallocation: usize,
    mode: HandoffMode,
    label: Option<String>,
    state: Mutex<BufferState<T>>,
    handoff: Arc<Handoff<T>>,
}

struct BufferState<T> {
    pending: Vec<T>,
    subscribed: bool,
    closed: bool,
}

impl<T> BufferState<T> {
    /// 关闭优先于未订阅。
    fn admit(&self) -> Result<(), BatchError> {
        if self.closed {
            Err(BatchError::Closed)
        } else if !self.subscribed {
            Err(BatchError::NotSubscribed)
        } else {
            Ok(())
        }
    }
}

impl<T> Shared<T> {
    fn log_label(&self) -> &str {
        self.label.as_deref().unwrap_or("-")
    }

    fn fresh_pending(&self) -> Vec<T> {
        Vec::with_capacity(self.preallocation)
    }
}

impl<T> Drop for Shared<T> {
    fn drop(&mut self) {
        if self.handoff.close() {
            let dropped = self.state.get_mut().pending.len();
            debug!(
                label = self.log_label(),
                dropped, "batch buffer released without close; handoff closed"
            );
        }
    }
}

impl<T> BatchBuffer<T> {
    /// 以给定批大小创建缓冲，`capacity` 为 0 时按 1 处理。
    pub fn new(capacity: usize) -> Self {
        Self::with_config(BufferConfig::new(capacity))
    }

    /// 按配置创建缓冲。
    pub fn with_config(config: BufferConfig) -> Self {
        let capacity = config.effective_capacity();
        let preallocation = config.preallocation();
        let shared = Shared {
            capacity,
            preallocation,
            mode: config.handoff,
            state: Mutex::new(BufferState {
                pending: Vec::with_capacity(preallocation),
                subscribed: false,
                closed: false,
            }),
            handoff: Arc::new(Handoff::new()),
            label: config.label,
        };
        debug!(
            label = shared.log_label(),
            capacity = shared.capacity,
            mode = ?shared.mode,
            "batch buffer created"
        );
        Self {
            inner: Arc::new(shared),
        }
    }

    /// 发布单个条目。
    ///
    /// # 契约
    /// - 已关闭时返回 [`BatchError::Closed`]，未订阅时返回 [`BatchError::NotSubscribed`]，两者均不修改状态；
    /// - 条目追加后若达到容量，整批交给订阅端；槽位仍被上一批占用时本调用阻塞。
    pub fn publish(&self, item: T) -> Result<(), BatchError> {
        let shared = &*self.inner;
        let mut state = shared.state.lock();
        if let Err(err) = state.admit() {
            trace!(label = shared.log_label(), error = %err, "publish rejected");
            return Err(err);
        }

        state.pending.push(item);
        if state.pending.len() < shared.capacity {
            return Ok(());
        }

        let batch = mem::replace(&mut state.pending, shared.fresh_pending());
        let ticket = shared.handoff.reserve();
        debug!(
            label = shared.log_label(),
            ticket = ticket.sequence(),
            items = batch.len(),
            "batch flushed to handoff"
        );
        match shared.mode {
            HandoffMode::HoldLock => shared.handoff.deliver(ticket, batch),
            HandoffMode::ReleaseLock => {
                drop(state);
                shared.handoff.deliver(ticket, batch);
            }
        }
        Ok(())
    }

    /// 标记缓冲已被订阅，并返回交接通道的接收视图。
    ///
    /// 每次调用都返回同一通道的视图；多个视图同时接收时批次会被分摊，由调用方自行协调。
    pub fn subscribe(&self) -> Subscription<T> {
        let shared = &*self.inner;
        let mut state = shared.state.lock();
        if !state.subscribed {
            state.subscribed = true;
            debug!(label = shared.log_label(), "batch buffer subscribed");
        }
        Subscription::new(Arc::clone(&shared.handoff))
    }

    /// 取走当前累积的全部条目（可能为空），与订阅、关闭状态无关。
    pub fn pull(&self) -> Vec<T> {
        let shared = &*self.inner;
        let mut state = shared.state.lock();
        let drained = mem::replace(&mut state.pending, shared.fresh_pending());
        if !drained.is_empty() {
            trace!(
                label = shared.log_label(),
                items = drained.len(),
                "pending items pulled"
            );
        }
        drained
    }

    /// 关闭缓冲；重复调用无效果。
    ///
    /// 关闭后发布一律失败，订阅端在取完已排队的批次后结束接收，`pull` 仍可取回残余条目。
    pub fn close(&self) {
        let shared = &*self.inner;
        let mut state = shared.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        shared.handoff.close();
        debug!(
            label = shared.log_label(),
            pending = state.pending.len(),
            "batch buffer closed"
        );
    }

    /// 实际生效的批大小。
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// 满批交接策略。
    pub fn handoff_mode(&self) -> HandoffMode {
        self.inner.mode
    }

    /// 构造时配置的日志标签。
    pub fn label(&self) -> Option<&str> {
        self.inner.label.as_deref()
    }

    /// 当前尚未成批的条目数。
    pub fn pending_len(&self) -> usize {
        self.inner.state.lock().pending.len()
    }

    /// 是否已有订阅者。
    pub fn is_subscribed(&self) -> bool {
        self.inner.state.lock().subscribed
    }

    /// 是否已关闭。
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }
}

impl<T> Clone for BatchBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for BatchBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchBuffer")
            .field("label", &self.inner.label)
            .field("capacity", &self.inner.capacity)
            .field("mode", &self.inner.mode)
            .finish_non_exhaustive()
    }
}
