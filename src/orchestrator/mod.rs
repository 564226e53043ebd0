//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和资源管理，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用入口
//! - 管理应用生命周期（初始化、运行）
//! - 持有浏览器资源，组装各层
//! - 提供命令行模式下的 `BatchHost`（任务文件 + 输出目录）
//!
//! ### `batch_processor` - 批量任务执行器
//! - 遍历 工单 × 目标语言
//! - 跳过已有版本、失败重试、重试耗尽时中止整个批次
//! - 无论结果如何都执行收尾
//!
//! ### `progress` - 进度与中止信号
//!
//! ## 层次关系
//!
//! ```text
//! app (资源 + 组装)
//!     ↓
//! batch_processor (处理 工单 × 语言)
//!     ↓
//! workflow::AnswerFlow (处理单个提问)
//!     ↓
//! services (能力层：查询协议 / 解析 / 提示词 / 保存)
//!     ↓
//! infrastructure (基础设施：窗口、脚本桥、后端)
//! ```

pub mod app;
pub mod batch_processor;
pub mod progress;

// 重新导出主要类型
pub use app::{App, JobHost};
pub use batch_processor::{
    BatchHost, BatchJob, BatchOutcome, BatchTaskExecutor, JobState, UnitReport, UnitState,
};
pub use progress::{AbortSignal, BatchProgress, LogLevel, ProgressReporter};
