//! 长时间任务的进度回调.

use std::sync::atomic::{AtomicUsize, Ordering};

/// 进度观察者. 可能在多个 worker 线程中被同时调用.
pub trait Progress: Sync {
    /// 已完成 `done` 个单位, 共 `total` 个单位.
    fn report(&self, done: usize, total: usize);
}

impl<F> Progress for F
where
    F: Fn(usize, usize) + Sync,
{
    #[inline]
    fn report(&self, done: usize, total: usize) {
        self(done, total)
    }
}

/// 丢弃所有进度.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoProgress;

impl Progress for NoProgress {
    #[inline]
    fn report(&self, _done: usize, _total: usize) {}
}

/// 以 `log::info!` 输出进度, 每 `every` 个单位输出一次.
#[derive(Debug, Copy, Clone)]
pub struct LogProgress {
    /// 阶段名称.
    pub stage: &'static str,
    /// 输出间隔.
    pub every: usize,
}

impl Progress for LogProgress {
    fn report(&self, done: usize, total: usize) {
        if done == total || (self.every > 0 && done % self.every == 0) {
            log::info!("[{}] {done}/{total}", self.stage);
        }
    }
}

/// 多线程共享的完成计数器. 每次 `tick` 后通知内部观察者.
pub(crate) struct Ticker<'a, P: Progress + ?Sized> {
    done: AtomicUsize,
    total: usize,
    sink: &'a P,
}

impl<'a, P: Progress + ?Sized> Ticker<'a, P> {
    pub(crate) fn new(sink: &'a P, total: usize) -> Self {
        Self {
            done: AtomicUsize::new(0),
            total,
            sink,
        }
    }

    /// 完成一个单位.
    pub(crate) fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;
        self.sink.report(done, self.total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_closure_progress() {
        let seen = Mutex::new(vec![]);
        let sink = |d: usize, t: usize| seen.lock().unwrap().push((d, t));
        let ticker = Ticker::new(&sink, 3);
        for _ in 0..3 {
            ticker.tick();
        }
        assert_eq!(*seen.lock().unwrap(), vec![(1, 3), (2, 3), (3, 3)]);
        NoProgress.report(1, 1);
    }
}
