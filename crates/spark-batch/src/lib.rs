//! `spark-batch` 提供“单条发布、整批订阅”的定容批处理缓冲。
//!
//! # 模块定位（Why）
//! - 生产者逐条调用 [`BatchBuffer::publish`]，消费者则希望一次拿到固定大小的批次；
//! - 缓冲在两者之间承担攒批与背压：槽位未被取走时，下一次满批交接会阻塞生产者，而不是无界增长内存。
//!
//! # 设计概要（How）
//! - `buffer` 模块实现 [`BatchBuffer`] 的状态机：`pending`、`subscribed`、`closed` 由同一把锁串行化；
//! - `handoff` 模块实现单槽交接通道与订阅视图 [`Subscription`]，按交付序号保证批次顺序；
//! - `config` 模块提供可由 TOML 加载的 [`BufferConfig`]，`error` 模块集中定义可区分的失败信号。
//!
//! # 使用示例
//!
//! ```
//! use std::thread;
//!
//! use spark_batch::BatchBuffer;
//!
//! let buffer = BatchBuffer::new(3);
//! let consumer = {
//!     let buffer = buffer.clone();
//!     thread::spawn(move || buffer.subscribe().into_iter().collect::<Vec<_>>())
//! };
//!
//! // 订阅线程就绪前发布会返回 `NotSubscribed`，这里自旋重试。
//! for item in 0..10 {
//!     while buffer.publish(item).is_err() {
//!         std::hint::spin_loop();
//!     }
//! }
//!
//! assert_eq!(buffer.pull(), vec![9]);
//! buffer.close();
//!
//! let batches = consumer.join().unwrap();
//! assert_eq!(batches, vec![vec![0, 1, 2], vec![3, 4, 5], vec![6, 7, 8]]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod buffer;
mod config;
mod error;
mod handoff;
mod sync;

pub use buffer::BatchBuffer;
pub use config::{BufferConfig, HandoffMode, MAX_PREALLOCATED_ITEMS};
pub use error::{BatchError, ConfigError, RecvTimeoutError, TryRecvError};
pub use handoff::{IntoIter, Iter, Subscription};
