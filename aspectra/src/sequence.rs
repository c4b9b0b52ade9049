//! 调用序号

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static GLOBAL_SEQUENCE: Lazy<Arc<SequenceCounter>> = Lazy::new(|| Arc::new(SequenceCounter::new()));

/// 单调递增的调用序号，每次拦截调用递增一次
#[derive(Debug, Default)]
pub struct SequenceCounter {
    value: AtomicU64,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    /// 进程级默认计数器
    pub fn global() -> Arc<SequenceCounter> {
        GLOBAL_SEQUENCE.clone()
    }

    /// 递增并返回新序号（从 1 开始）
    pub fn next(&self) -> u64 {
        self.value.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// 最近一次分配的序号
    pub fn current(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_sequence_is_monotonic() {
        let counter = SequenceCounter::new();
        assert_eq!(counter.next(), 1);
        assert_eq!(counter.next(), 2);
        assert_eq!(counter.current(), 2);
    }

    #[test]
    fn test_sequence_is_unique_across_threads() {
        let counter = Arc::new(SequenceCounter::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || (0..100).map(|_| counter.next()).collect::<Vec<_>>())
            })
            .collect();

        let mut all: Vec<u64> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 400);
        assert_eq!(counter.current(), 400);
    }
}
