//! 进度与中止信号 - 编排层
//!
//! `ProgressReporter` 是被动的：只记录 `{current, total}` 和追加式日志，
//! 由界面或日志层读取。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// 批次进度
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub current: usize,
    pub total: usize,
}

impl BatchProgress {
    pub fn is_finished(&self) -> bool {
        self.current >= self.total
    }
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// 进度报告器
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    progress: Arc<watch::Sender<BatchProgress>>,
    logs: Arc<Mutex<Vec<String>>>,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let (progress, _) = watch::channel(BatchProgress::default());
        Self {
            progress: Arc::new(progress),
            logs: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 开始新批次，total 在此固定
    pub fn start(&self, total: usize) {
        self.progress.send_replace(BatchProgress { current: 0, total });
    }

    /// 前进一个单元（不会超过 total）
    pub fn advance(&self) -> BatchProgress {
        self.progress.send_modify(|p| {
            if p.current < p.total {
                p.current += 1;
            }
        });
        self.snapshot()
    }

    pub fn snapshot(&self) -> BatchProgress {
        *self.progress.borrow()
    }

    /// 订阅进度变化
    pub fn subscribe(&self) -> watch::Receiver<BatchProgress> {
        self.progress.subscribe()
    }

    /// 追加一行日志，同时输出到 tracing
    pub fn log(&self, level: LogLevel, line: impl Into<String>) {
        let line = line.into();
        match level {
            LogLevel::Info => info!("{}", line),
            LogLevel::Warn => warn!("{}", line),
            LogLevel::Error => error!("{}", line),
        }
        if let Ok(mut logs) = self.logs.lock() {
            logs.push(line);
        }
    }

    /// 全部日志的副本
    pub fn logs(&self) -> Vec<String> {
        self.logs.lock().map(|logs| logs.clone()).unwrap_or_default()
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// 共享中止信号
///
/// 用户或执行器自己都可以设置；只在检查点生效，不会打断进行中的远端调用。
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_never_exceeds_total() {
        let reporter = ProgressReporter::new();
        reporter.start(2);
        reporter.advance();
        reporter.advance();
        let last = reporter.advance();
        assert_eq!(last, BatchProgress { current: 2, total: 2 });
        assert!(last.is_finished());
    }

    #[test]
    fn test_logs_are_append_only() {
        let reporter = ProgressReporter::new();
        reporter.log(LogLevel::Info, "first");
        reporter.log(LogLevel::Error, "second");
        assert_eq!(reporter.logs(), vec!["first".to_string(), "second".to_string()]);
    }

    #[test]
    fn test_abort_signal_shared_between_clones() {
        let abort = AbortSignal::new();
        let other = abort.clone();
        other.set();
        assert!(abort.is_set());
        abort.reset();
        assert!(!other.is_set());
    }
}
