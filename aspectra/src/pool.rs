//! 连接点对象池
//!
//! 高频调用下复用 [`JoinPoint`] 分配。池内对象在归还时清理，调用之间不会泄漏数据

use crate::joinpoint::JoinPoint;
use parking_lot::Mutex;
use serde::Serialize;
use std::ops::{Deref, DerefMut};

/// 默认池容量
pub const DEFAULT_POOL_CAPACITY: usize = 100;

/// 对象池统计
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoolStatistics {
    pub pool_size: usize,
    pub max_pool_size: usize,
    pub total_created: u64,
    pub total_reused: u64,
    /// reused / (created + reused)
    pub reuse_rate: f64,
}

#[derive(Default)]
struct PoolState {
    free: Vec<Box<JoinPoint>>,
    created: u64,
    reused: u64,
}

/// 连接点对象池
pub struct JoinPointPool {
    state: Mutex<PoolState>,
    max_size: usize,
}

impl JoinPointPool {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_POOL_CAPACITY)
    }

    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            state: Mutex::new(PoolState::default()),
            max_size,
        }
    }

    /// 取出一个连接点；池为空时新建
    pub fn acquire(&self) -> Box<JoinPoint> {
        let mut state = self.state.lock();
        match state.free.pop() {
            Some(jp) => {
                state.reused += 1;
                jp
            }
            None => {
                state.created += 1;
                Box::new(JoinPoint::new())
            }
        }
    }

    /// 取出一个连接点，守卫销毁时自动归还
    pub fn acquire_guard(&self) -> PooledJoinPoint<'_> {
        PooledJoinPoint {
            pool: self,
            join_point: Some(self.acquire()),
        }
    }

    /// 归还连接点；池满时直接丢弃
    pub fn release(&self, mut join_point: Box<JoinPoint>) {
        let mut state = self.state.lock();
        if state.free.len() >= self.max_size {
            return;
        }
        join_point.reset();
        state.free.push(join_point);
    }

    pub fn statistics(&self) -> PoolStatistics {
        let state = self.state.lock();
        let total = state.created + state.reused;
        let reuse_rate = if total == 0 {
            0.0
        } else {
            state.reused as f64 / total as f64
        };
        PoolStatistics {
            pool_size: state.free.len(),
            max_pool_size: self.max_size,
            total_created: state.created,
            total_reused: state.reused,
            reuse_rate,
        }
    }

    /// 清空空闲列表（统计不清零）
    pub fn clear(&self) {
        self.state.lock().free.clear();
    }
}

impl Default for JoinPointPool {
    fn default() -> Self {
        Self::new()
    }
}

/// 借出的连接点
///
/// 任何退出路径（包括 panic 展开）都会归还到池中
pub struct PooledJoinPoint<'a> {
    pool: &'a JoinPointPool,
    join_point: Option<Box<JoinPoint>>,
}

impl Deref for PooledJoinPoint<'_> {
    type Target = JoinPoint;

    fn deref(&self) -> &JoinPoint {
        // 只有 Drop 会取走
        self.join_point.as_deref().unwrap_or_else(|| unreachable!())
    }
}

impl DerefMut for PooledJoinPoint<'_> {
    fn deref_mut(&mut self) -> &mut JoinPoint {
        self.join_point.as_deref_mut().unwrap_or_else(|| unreachable!())
    }
}

impl Drop for PooledJoinPoint<'_> {
    fn drop(&mut self) {
        if let Some(join_point) = self.join_point.take() {
            self.pool.release(join_point);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_acquire_release_acquire_reuses_object() {
        let pool = JoinPointPool::new();
        let mut jp = pool.acquire();
        jp.set_method("doWork");
        jp.return_with(Some(Value::from("cached")));
        let address = &*jp as *const JoinPoint;
        pool.release(jp);

        let jp = pool.acquire();
        assert_eq!(&*jp as *const JoinPoint, address);
        assert!(jp.method().is_empty());
        assert!(jp.return_value().is_none());
        assert!(!jp.is_return_early());

        let stats = pool.statistics();
        assert_eq!(stats.total_created, 1);
        assert_eq!(stats.total_reused, 1);
        assert_eq!(stats.reuse_rate, 0.5);
    }

    #[test]
    fn test_release_discards_when_full() {
        let pool = JoinPointPool::with_capacity(1);
        let a = pool.acquire();
        let b = pool.acquire();
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.statistics().pool_size, 1);

        pool.clear();
        assert_eq!(pool.statistics().pool_size, 0);
        assert_eq!(pool.statistics().total_created, 2);
    }

    #[test]
    fn test_guard_returns_on_unwind() {
        let pool = JoinPointPool::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut jp = pool.acquire_guard();
            jp.set_method("explode");
            panic!("advice panicked");
        }));
        assert!(result.is_err());
        assert_eq!(pool.statistics().pool_size, 1);
        assert!(pool.acquire().method().is_empty());
    }

    #[test]
    fn test_statistics_serialize() {
        let pool = JoinPointPool::with_capacity(10);
        drop(pool.acquire_guard());
        let json = serde_json::to_value(pool.statistics()).unwrap();
        assert_eq!(json["max_pool_size"], 10);
        assert_eq!(json["total_created"], 1);
        assert_eq!(json["pool_size"], 1);
    }
}
