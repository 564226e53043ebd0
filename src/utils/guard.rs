//! "处理中"标志
//!
//! 远端窗口同一时间只能服务一个会话，用一个布尔标志做互斥（不是队列）：
//! 已有任务时新的请求直接被拒绝。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 共享的处理中标志
#[derive(Debug, Clone, Default)]
pub struct ProcessingFlag {
    active: Arc<AtomicBool>,
}

impl ProcessingFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试占用；已被占用时返回 None
    pub fn try_acquire(&self) -> Option<ProcessingGuard> {
        self.active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| ProcessingGuard {
                active: self.active.clone(),
            })
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// 占用凭证，drop 时释放
#[derive(Debug)]
pub struct ProcessingGuard {
    active: Arc<AtomicBool>,
}

impl Drop for ProcessingGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}
