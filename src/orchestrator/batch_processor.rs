//! 批量任务执行器 - 编排层
//!
//! ## 职责
//!
//! 对 (工单 × 目标语言) 的每个单元执行一次"提问 → 解析 → 保存"，并负责：
//!
//! 1. **进度**：每个单元（包括跳过的）前进一次
//! 2. **跳过**：工单已有该语言版本时不提问
//! 3. **重试**：单元最多尝试 `max_attempts` 次，失败之间等待 `retry_delay`
//! 4. **中止**：单元重试耗尽时设置中止信号，整个批次停止
//! 5. **收尾**：无论成功、失败还是中止，都刷新工单列表并清除选择
//!
//! ## 设计特点
//!
//! - **串行执行**：页面同一时间只能有一个对话，第 i 个工单处理完才开始第 i+1 个
//! - **协作式中止**：只在每个工单、每种语言、每次重试之前检查中止信号
//! - **向下委托**：提问交给 `AnswerSource`，提示词和保存交给 `BatchHost`

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::error::{ShadowError, ShadowResult};
use crate::models::ExistingVariants;
use crate::orchestrator::progress::{AbortSignal, BatchProgress, LogLevel, ProgressReporter};
use crate::services::response_parser::BilingualAnswer;
use crate::utils::guard::ProcessingFlag;
use crate::workflow::{AnswerSource, UnitCtx};

/// 批量执行的宿主
///
/// 工单列表、提示词和结果保存都属于调用方，执行器只通过这个接口访问。
#[async_trait]
pub trait BatchHost: Send + Sync {
    /// 为某个单元构建提问
    async fn build_prompt(&self, item_id: &str, lang: &str) -> anyhow::Result<String>;

    /// 保存一个单元的回复
    async fn store_answer(
        &self,
        item_id: &str,
        lang: &str,
        answer: &BilingualAnswer,
    ) -> anyhow::Result<()>;

    /// 刷新调用方的工单列表
    async fn refresh_items(&self) -> anyhow::Result<()>;

    /// 清除当前选择
    async fn clear_selection(&self);
}

/// 单个工单的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Skipped,
    Succeeded,
    Failed,
}

/// 一个工单在本批中的记录，批次结束后丢弃
#[derive(Debug, Clone)]
pub struct BatchJob {
    pub item_id: String,
    pub target_langs: Vec<String>,
    pub current_lang_index: usize,
    pub retry_count: u32,
    pub state: JobState,
}

impl BatchJob {
    fn new(item_id: &str, target_langs: &[String]) -> Self {
        Self {
            item_id: item_id.to_string(),
            target_langs: target_langs.to_vec(),
            current_lang_index: 0,
            retry_count: 0,
            state: JobState::Pending,
        }
    }
}

/// 单元最终状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitState {
    Skipped,
    Succeeded,
    Failed,
    Aborted,
}

/// 单元报告
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub item_id: String,
    pub lang: String,
    pub attempts: u32,
    pub state: UnitState,
}

/// 批次结果
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub progress: BatchProgress,
    pub aborted: bool,
    pub jobs: Vec<BatchJob>,
    pub units: Vec<UnitReport>,
}

impl BatchOutcome {
    pub fn count(&self, state: UnitState) -> usize {
        self.units.iter().filter(|u| u.state == state).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(UnitState::Succeeded)
    }

    pub fn skipped(&self) -> usize {
        self.count(UnitState::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(UnitState::Failed)
    }
}

/// 单元执行结果
enum UnitRun {
    Done(u32),
    Exhausted(u32),
    Aborted(u32),
}

/// 批量任务执行器
pub struct BatchTaskExecutor {
    source: Arc<dyn AnswerSource>,
    host: Arc<dyn BatchHost>,
    retry: RetryPolicy,
    reporter: ProgressReporter,
    abort: AbortSignal,
    processing: ProcessingFlag,
}

impl BatchTaskExecutor {
    pub fn new(
        source: Arc<dyn AnswerSource>,
        host: Arc<dyn BatchHost>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            host,
            retry,
            reporter: ProgressReporter::new(),
            abort: AbortSignal::new(),
            processing: ProcessingFlag::new(),
        }
    }

    /// 使用外部共享的中止信号（例如界面上的"停止"按钮）
    pub fn with_abort_signal(mut self, abort: AbortSignal) -> Self {
        self.abort = abort;
        self
    }

    pub fn reporter(&self) -> &ProgressReporter {
        &self.reporter
    }

    pub fn abort_signal(&self) -> AbortSignal {
        self.abort.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.processing.is_active()
    }

    /// 执行一个批次
    ///
    /// 已有批次在运行时返回 `Busy`；否则总会执行收尾并返回 `BatchOutcome`。
    pub async fn run_batch(
        &self,
        item_ids: &[String],
        langs: &[String],
        existing: &ExistingVariants,
    ) -> ShadowResult<BatchOutcome> {
        let _guard = self.processing.try_acquire().ok_or(ShadowError::Busy)?;

        self.abort.reset();
        self.reporter.start(item_ids.len() * langs.len());
        self.reporter.log(
            LogLevel::Info,
            format!(
                "🚀 [Batch] Starting: {} tickets × {} languages",
                item_ids.len(),
                langs.len()
            ),
        );

        let mut jobs: Vec<BatchJob> = item_ids.iter().map(|id| BatchJob::new(id, langs)).collect();
        let mut units = Vec::new();

        'items: for (idx, job) in jobs.iter_mut().enumerate() {
            if self.abort.is_set() {
                break;
            }
            job.state = JobState::Running;

            for (lang_idx, lang) in langs.iter().enumerate() {
                if self.abort.is_set() {
                    job.state = JobState::Pending;
                    break 'items;
                }
                job.current_lang_index = lang_idx;
                let ctx = UnitCtx::new(job.item_id.clone(), idx + 1, item_ids.len(), lang.clone());
                let progress = self.reporter.advance();
                debug!("{} 进度 {}/{}", ctx, progress.current, progress.total);

                if existing.has(&job.item_id, lang) {
                    self.reporter.log(
                        LogLevel::Info,
                        format!("⏭️ [Batch] Ticket #{} already has {}, skipped.", job.item_id, lang),
                    );
                    units.push(UnitReport {
                        item_id: job.item_id.clone(),
                        lang: lang.clone(),
                        attempts: 0,
                        state: UnitState::Skipped,
                    });
                    continue;
                }

                let run = self.run_unit(&ctx).await;
                let (attempts, state) = match run {
                    UnitRun::Done(n) => (n, UnitState::Succeeded),
                    UnitRun::Exhausted(n) => (n, UnitState::Failed),
                    UnitRun::Aborted(n) => (n, UnitState::Aborted),
                };
                job.retry_count = attempts.saturating_sub(1);
                units.push(UnitReport {
                    item_id: job.item_id.clone(),
                    lang: lang.clone(),
                    attempts,
                    state,
                });

                match state {
                    UnitState::Failed => {
                        job.state = JobState::Failed;
                        let err = ShadowError::MaxRetriesExceeded {
                            item_id: job.item_id.clone(),
                            lang: lang.clone(),
                            attempts,
                        };
                        debug!("{} {}", ctx, err);
                        self.reporter.log(
                            LogLevel::Error,
                            format!(
                                "❌ [Batch] Ticket #{} failed after {} retries. Aborting.",
                                job.item_id, attempts
                            ),
                        );
                        self.abort.set();
                        break 'items;
                    }
                    UnitState::Aborted => {
                        job.state = JobState::Pending;
                        break 'items;
                    }
                    _ => {}
                }
            }

            job.state = if units
                .iter()
                .filter(|u| u.item_id == job.item_id)
                .all(|u| u.state == UnitState::Skipped)
            {
                JobState::Skipped
            } else {
                JobState::Succeeded
            };
        }

        self.finalize().await;

        Ok(BatchOutcome {
            progress: self.reporter.snapshot(),
            aborted: self.abort.is_set(),
            jobs,
            units,
        })
    }

    /// 执行一个批次，`interrupt` 完成时设置中止信号
    ///
    /// 批次先被轮询，中止信号的复位一定发生在 `interrupt` 生效之前。
    pub async fn run_batch_until<F>(
        &self,
        item_ids: &[String],
        langs: &[String],
        existing: &ExistingVariants,
        interrupt: F,
    ) -> ShadowResult<BatchOutcome>
    where
        F: Future<Output = ()>,
    {
        let batch = self.run_batch(item_ids, langs, existing);
        tokio::pin!(batch);
        tokio::pin!(interrupt);
        let mut interrupted = false;

        loop {
            tokio::select! {
                biased;
                outcome = &mut batch => return outcome,
                _ = &mut interrupt, if !interrupted => {
                    interrupted = true;
                    warn!("🛑 收到中断信号，当前单元完成后停止");
                    self.abort.set();
                }
            }
        }
    }

    /// 单元重试循环
    async fn run_unit(&self, ctx: &UnitCtx) -> UnitRun {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.attempt_unit(ctx).await {
                Ok(()) => {
                    self.reporter.log(
                        LogLevel::Info,
                        format!("✅ [Batch] Ticket #{} ({}) done.", ctx.item_id, ctx.lang),
                    );
                    return UnitRun::Done(attempt);
                }
                Err(e) => {
                    self.reporter.log(
                        LogLevel::Warn,
                        format!(
                            "⚠️ [Batch] Ticket #{} ({}) attempt {}/{} failed: {}",
                            ctx.item_id, ctx.lang, attempt, max_attempts, e
                        ),
                    );
                }
            }

            if attempt >= max_attempts {
                return UnitRun::Exhausted(attempt);
            }
            sleep(self.retry.retry_delay).await;
            if self.abort.is_set() {
                return UnitRun::Aborted(attempt);
            }
        }
    }

    /// 单次尝试：构建提问 → 查询 → 保存
    async fn attempt_unit(&self, ctx: &UnitCtx) -> ShadowResult<()> {
        let prompt = self
            .host
            .build_prompt(&ctx.item_id, &ctx.lang)
            .await
            .map_err(|e| ShadowError::Host(format!("{:#}", e)))?;

        let answer = self.source.answer(&prompt).await?;

        self.host
            .store_answer(&ctx.item_id, &ctx.lang, &answer)
            .await
            .map_err(|e| ShadowError::Host(format!("{:#}", e)))
    }

    /// 收尾：刷新列表、清除选择
    async fn finalize(&self) {
        if let Err(e) = self.host.refresh_items().await {
            self.reporter
                .log(LogLevel::Warn, format!("⚠️ [Batch] Failed to refresh items: {:#}", e));
        }
        self.host.clear_selection().await;

        if self.abort.is_set() {
            self.reporter.log(LogLevel::Warn, "🛑 Batch translation stopped.");
        } else {
            self.reporter.log(LogLevel::Info, "✅ Batch translation flow completed.");
        }
    }
}
