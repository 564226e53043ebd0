//! # Notebook Shadow
//!
//! 通过浏览器自动化驱动 NotebookLM 对话页面，批量生成工单的双语回复
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（Page），只暴露能力
//! - `AutomationBackend` - 打开窗口、注入脚本、切换可见性、回传事件
//! - `AutomationSurface` - 唯一的远端会话句柄及其可见性广播
//! - `ScriptBridge` - 执行脚本并按名称分发回传事件
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `StreamingQueryProtocol` - 清历史 → 提交 → 轮询，返回去重后的事件流
//! - `response_parser` - 从回复中提取 [目标语言, 参考语言] 数组
//! - `PromptBuilder` / `AnswerStore` - 构建提问、保存回复
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一次提问"的完整处理流程
//! - `AnswerFlow` - 查询 → 最终文本 → 双语解析
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 工单 × 语言的批量执行、重试与中止
//! - `orchestrator/app` - 应用入口，管理资源
//!
//! ## 模块结构

pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::{connect_to_browser_and_page, launch_headless_browser};
pub use config::{Config, QueryTiming, RetryPolicy};
pub use error::{ShadowError, ShadowResult};
pub use infrastructure::{AutomationBackend, AutomationSurface, ScriptBridge, SurfaceHandle};
pub use models::{ExistingVariants, JobFile, WorkItem};
pub use orchestrator::{AbortSignal, App, BatchHost, BatchOutcome, BatchTaskExecutor, ProgressReporter};
pub use services::{BilingualAnswer, StreamEvent, StreamStatus, StreamingQueryProtocol};
pub use workflow::{AnswerFlow, AnswerSource};
