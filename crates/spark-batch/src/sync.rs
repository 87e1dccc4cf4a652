//! # sync 模块说明
//!
//! ## 角色定位（Why）
//! - 交接通道的锁与条件变量需要在 Loom 模型中被穷举调度，常规构建则使用 `parking_lot`；
//! - 两者 API 不同（`parking_lot` 以 `&mut guard` 等待，Loom 沿用标准库按值传递守卫），
//!   在此统一成 `parking_lot` 的形状，`handoff` 模块无需感知当前构建。
//!
//! ## 设计要求（What）
//! - `--cfg loom` 或 `--cfg spark_loom` 下切换到 Loom 原语，其余情况直接复用 `parking_lot`；
//! - `Arc` 保持标准实现，不在此切换。
//! - Loom 的 `wait_timeout` 从不超时，模型中的限时等待退化为普通等待。

#[cfg(not(any(loom, spark_loom)))]
pub(crate) use parking_lot::{Condvar, Mutex, MutexGuard};

#[cfg(any(loom, spark_loom))]
pub(crate) use self::loom_shim::{Condvar, Mutex, MutexGuard};

#[cfg(any(loom, spark_loom))]
mod loom_shim {
    use std::{
        ops::{Deref, DerefMut},
        time::Instant,
    };

    pub(crate) struct Mutex<T>(loom::sync::Mutex<T>);

    impl<T> Mutex<T> {
        pub(crate) fn new(value: T) -> Self {
            Self(loom::sync::Mutex::new(value))
        }

        pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
            MutexGuard(Some(self.0.lock().expect("Loom 模型中的锁不会中毒")))
        }
    }

    /// 守卫只在条件变量等待期间短暂取出。
    pub(crate) struct MutexGuard<'a, T>(Option<loom::sync::MutexGuard<'a, T>>);

    impl<'a, T> MutexGuard<'a, T> {
        fn take(&mut self) -> loom::sync::MutexGuard<'a, T> {
            self.0.take().expect("等待期间守卫必须存在")
        }
    }

    impl<T> Deref for MutexGuard<'_, T> {
        type Target = T;

        fn deref(&self) -> &T {
            self.0.as_deref().expect("等待期间守卫必须存在")
        }
    }

    impl<T> DerefMut for MutexGuard<'_, T> {
        fn deref_mut(&mut self) -> &mut T {
            self.0.as_deref_mut().expect("等待期间守卫必须存在")
        }
    }

    pub(crate) struct WaitTimeoutResult(bool);

    impl WaitTimeoutResult {
        pub(crate) fn timed_out(&self) -> bool {
            self.0
        }
    }

    pub(crate) struct Condvar(loom::sync::Condvar);

    impl Condvar {
        pub(crate) fn new() -> Self {
            Self(loom::sync::Condvar::new())
        }

        pub(crate) fn wait<T>(&self, guard: &mut MutexGuard<'_, T>) {
            let inner = guard.take();
            guard.0 = Some(self.0.wait(inner).expect("Loom 模型中的锁不会中毒"));
        }

        pub(crate) fn wait_until<T>(
            &self,
            guard: &mut MutexGuard<'_, T>,
            deadline: Instant,
        ) -> WaitTimeoutResult {
            let timeout = deadline.saturating_duration_since(Instant::now());
            let inner = guard.take();
            let (inner, result) = self
                .0
                .wait_timeout(inner, timeout)
                .expect("Loom 模型中的锁不会中毒");
            guard.0 = Some(inner);
            WaitTimeoutResult(result.timed_out())
        }

        pub(crate) fn notify_one(&self) {
            self.0.notify_one();
        }

        pub(crate) fn notify_all(&self) {
            self.0.notify_all();
        }
    }
}
