//! 按实例缓存
//!
//! 缓存值是不可变输入的纯函数，并发下允许重复计算后覆盖，不需要加锁。

use arc_swap::ArcSwapOption;
use std::fmt;
use std::sync::Arc;

/// 惰性计算、可失效的单值缓存
pub struct Memo<T> {
    slot: ArcSwapOption<T>,
}

impl<T> Memo<T> {
    pub fn new() -> Self {
        Self {
            slot: ArcSwapOption::empty(),
        }
    }

    /// 命中则返回缓存值，否则计算并写入
    pub fn get_or_compute(&self, compute: impl FnOnce() -> T) -> Arc<T> {
        if let Some(cached) = self.slot.load_full() {
            return cached;
        }
        let value = Arc::new(compute());
        self.slot.store(Some(Arc::clone(&value)));
        value
    }

    /// 底层输入被重新赋值时调用
    pub fn invalidate(&self) {
        self.slot.store(None);
    }

    pub fn is_cached(&self) -> bool {
        self.slot.load().is_some()
    }
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// 克隆得到空缓存，克隆体按需重新计算
impl<T> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("cached", &self.is_cached())
            .finish()
    }
}
