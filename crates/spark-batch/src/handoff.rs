//! # handoff 模块说明
//!
//! ## 角色定位（Why）
//! - 缓冲与订阅者之间只隔着一个槽位：满批在此交接，槽位被占用即形成背压；
//! - 订阅端的阻塞、非阻塞与限时接收都落在同一份槽位状态上，终止判定只有一处。
//!
//! ## 设计要求（What）
//! - 批次按预约序号交付，关闭不会丢弃已预约的批次；
//! - 锁与条件变量来自 [`crate::sync`]，`--cfg loom` 下由 Loom 模型穷举本模块的调度交错。

use std::{
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use crate::{
    error::{RecvTimeoutError, TryRecvError},
    sync::{Condvar, Mutex, MutexGuard},
};

/// 单槽交接通道：生产侧按序投递满批，订阅侧逐批取走。
///
/// # 设计动机（Why）
/// - 槽位只有一个，上一批未被取走时下一次投递会阻塞，这是整个缓冲唯一的背压点；
/// - 关闭标记必须与“槽位为空”区分开，接收端才能判断是继续等待还是结束循环。
///
/// # 核心机制（How）
/// - `reserved`/`delivered` 构成交付序号：发布方在缓冲锁内预约序号，投递时只有轮到自己且槽位为空才写入，
///   因此即便投递前已释放缓冲锁，批次顺序也与预约顺序一致；
/// - `readable` 唤醒接收端，`writable` 唤醒等待槽位或轮次的发布方。
///
/// # 契约说明（What）
/// - 关闭后不再接受新的预约，但已预约的批次仍会被交付；
/// - 只有在“已关闭 + 槽位为空 + 所有预约均已交付”时，接收端才观察到终止。
pub(crate) struct Handoff<T> {
    state: Mutex<SlotState<T>>,
    readable: Condvar,
    writable: Condvar,
}

struct SlotState<T> {
    slot: Option<Vec<T>>,
    reserved: u64,
    delivered: u64,
    closed: bool,
}

impl<T> SlotState<T> {
    fn is_drained(&self) -> bool {
        self.closed && self.slot.is_none() && self.delivered == self.reserved
    }
}

/// 交付序号，由 [`Handoff::reserve`] 发放，只能被 [`Handoff::deliver`] 消耗一次。
#[derive(Debug, Eq, PartialEq)]
#[must_use = "预约的序号必须被交付，否则后续批次将永久阻塞"]
pub(crate) struct Ticket(u64);

impl Ticket {
    pub(crate) fn sequence(&self) -> u64 {
        self.0
    }
}

impl<T> Handoff<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SlotState {
                slot: None,
                reserved: 0,
                delivered: 0,
                closed: false,
            }),
            readable: Condvar::new(),
            writable: Condvar::new(),
        }
    }

    /// 预约下一个交付序号。调用方需保证此时通道尚未关闭。
    pub(crate) fn reserve(&self) -> Ticket {
        let mut state = self.state.lock();
        debug_assert!(!state.closed, "关闭后不应再预约交付序号");
        let ticket = Ticket(state.reserved);
        state.reserved += 1;
        ticket
    }

    /// 按序号投递一个满批；槽位被占用或尚未轮到时阻塞。
    pub(crate) fn deliver(&self, ticket: Ticket, batch: Vec<T>) {
        let mut state = self.state.lock();
        while state.slot.is_some() || state.delivered != ticket.0 {
            self.writable.wait(&mut state);
        }
        state.slot = Some(batch);
        state.delivered += 1;
        self.readable.notify_one();
    }

    /// 关闭通道，返回本次调用是否真正完成了关闭。
    pub(crate) fn close(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        self.readable.notify_all();
        true
    }

    fn is_drained(&self) -> bool {
        self.state.lock().is_drained()
    }

    fn take_ready(&self, state: &mut MutexGuard<'_, SlotState<T>>) -> Option<Vec<T>> {
        let batch = state.slot.take()?;
        self.writable.notify_all();
        if state.is_drained() {
            // 最后一批已取走，其余等待中的接收端需要观察到终止。
            self.readable.notify_all();
        }
        Some(batch)
    }

    fn recv(&self) -> Option<Vec<T>> {
        let mut state = self.state.lock();
        loop {
            if let Some(batch) = self.take_ready(&mut state) {
                return Some(batch);
            }
            if state.is_drained() {
                return None;
            }
            self.readable.wait(&mut state);
        }
    }

    fn try_recv(&self) -> Result<Vec<T>, TryRecvError> {
        let mut state = self.state.lock();
        if let Some(batch) = self.take_ready(&mut state) {
            return Ok(batch);
        }
        if state.is_drained() {
            Err(TryRecvError::Disconnected)
        } else {
            Err(TryRecvError::Empty)
        }
    }

    fn recv_deadline(&self, deadline: Instant) -> Result<Vec<T>, RecvTimeoutError> {
        let mut state = self.state.lock();
        loop {
            if let Some(batch) = self.take_ready(&mut state) {
                return Ok(batch);
            }
            if state.is_drained() {
                return Err(RecvTimeoutError::Disconnected);
            }
            if self.readable.wait_until(&mut state, deadline).timed_out() {
                return match self.take_ready(&mut state) {
                    Some(batch) => Ok(batch),
                    None if state.is_drained() => Err(RecvTimeoutError::Disconnected),
                    None => Err(RecvTimeoutError::Timeout),
                };
            }
        }
    }
}

/// 订阅端视图：从交接通道逐批接收满批。
///
/// 同一缓冲上的所有 `Subscription`（包括克隆出的实例）共享同一个通道，
/// 多个接收端会竞争批次，每个批次只会被其中一个取走。
///
/// ```
/// use spark_batch::BatchBuffer;
///
/// let buffer = BatchBuffer::new(2);
/// let subscription = buffer.subscribe();
/// buffer.publish(1).unwrap();
/// buffer.publish(2).unwrap();
/// buffer.close();
///
/// let batches: Vec<Vec<i32>> = subscription.into_iter().collect();
/// assert_eq!(batches, vec![vec![1, 2]]);
/// ```
pub struct Subscription<T> {
    handoff: Arc<Handoff<T>>,
}

impl<T> Subscription<T> {
    pub(crate) fn new(handoff: Arc<Handoff<T>>) -> Self {
        Self { handoff }
    }

    /// 阻塞直到取得下一批；通道关闭且已排空时返回 `None`。
    pub fn recv(&self) -> Option<Vec<T>> {
        self.handoff.recv()
    }

    /// 非阻塞地尝试取走一批。
    pub fn try_recv(&self) -> Result<Vec<T>, TryRecvError> {
        self.handoff.try_recv()
    }

    /// 最多等待 `timeout` 取得下一批。
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Vec<T>, RecvTimeoutError> {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.handoff.recv_deadline(deadline),
            None => self.recv().ok_or(RecvTimeoutError::Disconnected),
        }
    }

    /// 借用迭代器，逐批阻塞接收直到通道终止。
    pub fn iter(&self) -> Iter<'_, T> {
        Iter { subscription: self }
    }

    /// 通道是否已关闭且不会再有批次。
    pub fn is_terminated(&self) -> bool {
        self.handoff.is_drained()
    }

    /// 两个订阅是否指向同一个交接通道。
    pub fn same_channel(&self, other: &Subscription<T>) -> bool {
        Arc::ptr_eq(&self.handoff, &other.handoff)
    }
}

impl<T> Clone for Subscription<T> {
    fn clone(&self) -> Self {
        Self {
            handoff: Arc::clone(&self.handoff),
        }
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

/// [`Subscription::iter`] 返回的借用迭代器。
pub struct Iter<'a, T> {
    subscription: &'a Subscription<T>,
}

impl<T> Iterator for Iter<'_, T> {
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.subscription.recv()
    }
}

/// 按值消费 [`Subscription`] 的迭代器。
pub struct IntoIter<T> {
    subscription: Subscription<T>,
}

impl<T> Iterator for IntoIter<T> {
    type Item = Vec<T>;

    fn next(&mut self) -> Option<Self::Item> {
        self.subscription.recv()
    }
}

impl<T> IntoIterator for Subscription<T> {
    type Item = Vec<T>;
    type IntoIter = IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter { subscription: self }
    }
}

impl<'a, T> IntoIterator for &'a Subscription<T> {
    type Item = Vec<T>;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(all(test, not(any(loom, spark_loom))))]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn deliveries_follow_ticket_order() {
        let handoff = Arc::new(Handoff::new());
        let first = handoff.reserve();
        let second = handoff.reserve();
        assert_eq!((first.sequence(), second.sequence()), (0, 1));

        let late = {
            let handoff = Arc::clone(&handoff);
            thread::spawn(move || handoff.deliver(second, vec![2]))
        };
        handoff.deliver(first, vec![1]);

        let subscription = Subscription::new(Arc::clone(&handoff));
        assert_eq!(subscription.recv(), Some(vec![1]));
        assert_eq!(subscription.recv(), Some(vec![2]));
        late.join().expect("后序投递线程不应 panic");
    }

    #[test]
    fn try_recv_distinguishes_empty_from_disconnected() {
        let handoff = Arc::new(Handoff::<u8>::new());
        let subscription = Subscription::new(Arc::clone(&handoff));
        assert_eq!(subscription.try_recv(), Err(TryRecvError::Empty));
        assert!(handoff.close());
        assert!(!handoff.close(), "重复关闭应返回 false");
        assert_eq!(subscription.try_recv(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn reserved_batches_survive_close() {
        let handoff = Arc::new(Handoff::new());
        let ticket = handoff.reserve();
        handoff.close();
        let subscription = Subscription::new(Arc::clone(&handoff));
        assert!(!subscription.is_terminated(), "仍有预约未交付时不应终止");

        handoff.deliver(ticket, vec!['a']);
        assert_eq!(subscription.recv(), Some(vec!['a']));
        assert_eq!(subscription.recv(), None);
        assert!(subscription.is_terminated());
    }

    #[test]
    fn recv_timeout_reports_timeout_while_open() {
        let handoff = Arc::new(Handoff::<u8>::new());
        let subscription = Subscription::new(handoff);
        assert_eq!(
            subscription.recv_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Timeout)
        );
    }
}
