//! 流式查询协议 - 业务能力层
//!
//! 完整执行一次提问，并以去重后的事件流返回结果。
//!
//! 状态流转：`Init → ClearingHistory → Submitting → Polling → {Complete | Error}`
//!
//! 远端页面没有可靠的"生成完毕"信号，完成判定依赖两个启发式条件：
//! - 快照中 `[` 与 `]` 数量相等且大于 0（JSON 数组在语法上完整）
//! - 输入框重新可用（远端不再生成）
//!
//! 两者同时满足才算完成。出现过合法快照后若迟迟等不到完成状态，
//! 会在软超时后把最后一个合法快照作为最终结果，避免因空白字符等细微差异永远卡住。

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::QueryTiming;
use crate::error::{ShadowError, ShadowResult};
use crate::infrastructure::{EventSubscription, ScriptBridge, SurfaceHandle, LOG_EVENT};
use crate::services::scripts;
use crate::utils::guard::{ProcessingFlag, ProcessingGuard};
use crate::utils::logging::truncate_text;

const STREAM_BUFFER: usize = 32;

/// 流事件状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    Streaming,
    Complete,
    Error,
}

/// 一次查询产生的流事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub text: String,
    pub status: StreamStatus,
}

impl StreamEvent {
    pub fn streaming(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            status: StreamStatus::Streaming,
        }
    }

    pub fn complete(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            status: StreamStatus::Complete,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            status: StreamStatus::Error,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != StreamStatus::Streaming
    }
}

/// 一次提问请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub prompt: String,
    pub surface: SurfaceHandle,
}

/// 协议状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Init,
    ClearingHistory,
    Submitting,
    Polling,
    Complete,
    Error,
}

/// 判断文本中方括号是否配平（且至少有一对）
pub fn is_bracket_balanced(text: &str) -> bool {
    let open = text.matches('[').count();
    let close = text.matches(']').count();
    open > 0 && open == close
}

/// 流式查询协议
///
/// 职责：
/// - 每次提问前清除远端历史对话
/// - 提交问题并轮询回复
/// - 同一窗口上同一时间只允许一个查询
pub struct StreamingQueryProtocol {
    bridge: Arc<ScriptBridge>,
    timing: QueryTiming,
    processing: ProcessingFlag,
}

impl StreamingQueryProtocol {
    pub fn new(bridge: Arc<ScriptBridge>, timing: QueryTiming) -> Self {
        Self {
            bridge,
            timing,
            processing: ProcessingFlag::new(),
        }
    }

    /// 当前是否有查询在进行
    pub fn is_busy(&self) -> bool {
        self.processing.is_active()
    }

    /// 发起一次提问
    ///
    /// 返回的流是惰性的：第一次被轮询时才开始操作远端页面。
    /// 已有查询在进行时返回 `Busy`。
    pub fn query(&self, prompt: impl Into<String>) -> ShadowResult<QueryStream> {
        let guard = self.processing.try_acquire().ok_or(ShadowError::Busy)?;

        let request = QueryRequest {
            prompt: prompt.into(),
            surface: self.bridge.surface().handle().clone(),
        };
        debug!(
            "[Shadow] 新查询，笔记本: {}，问题长度: {} 字符",
            request.surface.notebook_id,
            request.prompt.len()
        );

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let (start_tx, start_rx) = oneshot::channel();
        let cancelled = Arc::new(AtomicBool::new(false));

        let run = QueryRun {
            bridge: self.bridge.clone(),
            timing: self.timing.clone(),
            request,
            state: QueryState::Init,
            emitter: Emitter::new(tx),
            logs: self.bridge.on(LOG_EVENT),
            cancelled: cancelled.clone(),
        };
        tokio::spawn(run.drive(start_rx, guard));

        Ok(QueryStream {
            rx,
            start: Some(start_tx),
            cancelled,
        })
    }
}

/// 查询结果流
///
/// 中间元素都是 `streaming`，最后一个元素是 `complete` 或 `error`，
/// 相邻两个元素的文本永不相同。drop 即取消。
pub struct QueryStream {
    rx: mpsc::Receiver<StreamEvent>,
    start: Option<oneshot::Sender<()>>,
    cancelled: Arc<AtomicBool>,
}

impl QueryStream {
    /// 请求取消，在下一个轮询周期生效
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// 消费整个流，返回最终文本
    pub async fn final_text(mut self) -> ShadowResult<String> {
        let mut last = None;
        while let Some(event) = self.next().await {
            match event.status {
                StreamStatus::Streaming => last = Some(event.text),
                StreamStatus::Complete => return Ok(event.text),
                StreamStatus::Error => return Err(ShadowError::Query(event.text)),
            }
        }
        Err(ShadowError::Query(format!(
            "查询流意外结束，最后内容: {}",
            last.as_deref().map(|t| truncate_text(t, 50)).unwrap_or_default()
        )))
    }
}

impl Stream for QueryStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        if let Some(start) = self.start.take() {
            let _ = start.send(());
        }
        self.rx.poll_recv(cx)
    }
}

/// 去重发送器
///
/// 流式快照延后一个周期发出：终止事件的文本若与待发快照相同，就直接替换它，
/// 保证相邻事件文本不重复。未配平的快照不会成为终止文本，停滞时不必一直扣留。
struct Emitter {
    tx: mpsc::Sender<StreamEvent>,
    last_emitted: Option<String>,
    pending: Option<String>,
}

impl Emitter {
    fn new(tx: mpsc::Sender<StreamEvent>) -> Self {
        Self {
            tx,
            last_emitted: None,
            pending: None,
        }
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn send(&mut self, event: StreamEvent) -> bool {
        self.last_emitted = Some(event.text.clone());
        self.tx.send(event).await.is_ok()
    }

    /// 新的中间快照；文本未变化时忽略。返回接收端是否还在
    ///
    /// 待发快照停滞一个周期后，若括号未配平（不可能成为最终文本）就立即发出。
    async fn offer(&mut self, text: String) -> bool {
        let current = self.pending.as_ref().or(self.last_emitted.as_ref());
        if current == Some(&text) {
            if self.pending.as_ref() == Some(&text) && !is_bracket_balanced(&text) {
                self.pending = None;
                return self.send(StreamEvent::streaming(text)).await;
            }
            return !self.is_closed();
        }
        if let Some(previous) = self.pending.replace(text) {
            return self.send(StreamEvent::streaming(previous)).await;
        }
        !self.is_closed()
    }

    async fn complete(&mut self, text: String) -> bool {
        if let Some(previous) = self.pending.take() {
            if previous != text && !self.send(StreamEvent::streaming(previous)).await {
                return false;
            }
        }
        self.send(StreamEvent::complete(text)).await
    }

    async fn fail(&mut self, message: String) -> bool {
        if let Some(previous) = self.pending.take() {
            if !self.send(StreamEvent::streaming(previous)).await {
                return false;
            }
        }
        let message = if self.last_emitted.as_ref() == Some(&message) {
            format!("错误: {}", message)
        } else {
            message
        };
        self.send(StreamEvent::error(message)).await
    }
}

#[derive(Debug, Deserialize)]
struct ClearStepReply {
    answers: usize,
    action: String,
}

#[derive(Debug, Deserialize)]
struct CountReply {
    answers: usize,
}

#[derive(Debug, Deserialize)]
struct FillReply {
    found: bool,
}

#[derive(Debug, Deserialize)]
struct SubmitReply {
    clicked: bool,
}

#[derive(Debug, Default, Deserialize)]
struct Snapshot {
    #[serde(default)]
    text: String,
    #[serde(default)]
    idle: bool,
}

fn decode<T: serde::de::DeserializeOwned>(op: &str, payload: JsonValue) -> ShadowResult<T> {
    serde_json::from_value(payload).map_err(|e| ShadowError::script(op, format!("回传格式错误: {}", e)))
}

/// 一次查询的执行体，在独立任务中运行
struct QueryRun {
    bridge: Arc<ScriptBridge>,
    timing: QueryTiming,
    request: QueryRequest,
    state: QueryState,
    emitter: Emitter,
    logs: EventSubscription,
    cancelled: Arc<AtomicBool>,
}

impl QueryRun {
    async fn drive(mut self, start: oneshot::Receiver<()>, _guard: ProcessingGuard) {
        if start.await.is_err() {
            debug!("[Shadow] 查询流在开始前被丢弃");
            return;
        }

        if let Err(e) = self.run().await {
            self.transition(QueryState::Error);
            warn!("[Shadow] ❌ 查询失败: {}", e);
            self.emitter.fail(e.to_string()).await;
        }
        self.drain_logs();
        debug!("[Shadow] 查询结束，状态: {:?}", self.state);
    }

    async fn run(&mut self) -> ShadowResult<()> {
        self.transition(QueryState::ClearingHistory);
        let baseline = self.clear_history().await?;

        self.transition(QueryState::Submitting);
        self.submit().await?;

        self.transition(QueryState::Polling);
        self.poll(baseline).await
    }

    fn transition(&mut self, next: QueryState) {
        debug!("[Shadow] 状态: {:?} → {:?}", self.state, next);
        self.state = next;
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst) || self.emitter.is_closed()
    }

    fn drain_logs(&mut self) {
        while let Some(payload) = self.logs.try_recv() {
            let message = payload
                .get("message")
                .and_then(JsonValue::as_str)
                .unwrap_or_default();
            debug!("[Shadow JS] {}", message);
        }
    }

    /// 清除历史对话，返回剩余回复块数量（之后轮询只看比它新的回复）
    ///
    /// 最多尝试 `clear_max_cycles` 轮，失败只记录警告，不中断查询。
    async fn clear_history(&mut self) -> ShadowResult<usize> {
        let max_cycles = self.timing.clear_max_cycles;

        for cycle in 1..=max_cycles {
            let reply = self
                .bridge
                .call(scripts::OP_CLEAR_STEP, &scripts::clear_history_step())
                .await
                .and_then(|p| decode::<ClearStepReply>(scripts::OP_CLEAR_STEP, p));
            self.drain_logs();

            match reply {
                Ok(step) if step.answers == 0 => {
                    info!("[Shadow] ✓ 历史对话已清空 (第 {} 轮)", cycle);
                    return Ok(0);
                }
                Ok(step) => {
                    if step.action == "deleted" {
                        debug!("[Shadow] 第 {}/{} 轮: 已删除 {} 条回复", cycle, max_cycles, step.answers);
                    } else {
                        warn!(
                            "[Shadow] 第 {}/{} 轮清除失败: {} (剩余 {} 条回复)",
                            cycle, max_cycles, step.action, step.answers
                        );
                    }
                }
                Err(e @ ShadowError::SurfaceUnavailable { .. }) => return Err(e),
                Err(e) => warn!("[Shadow] 第 {}/{} 轮清除出错: {}", cycle, max_cycles, e),
            }

            sleep(self.timing.clear_settle).await;
        }

        let remaining = match self
            .bridge
            .call(scripts::OP_COUNT_ANSWERS, &scripts::count_answers())
            .await
            .and_then(|p| decode::<CountReply>(scripts::OP_COUNT_ANSWERS, p))
        {
            Ok(count) => count.answers,
            Err(e @ ShadowError::SurfaceUnavailable { .. }) => return Err(e),
            Err(e) => {
                warn!("[Shadow] 无法统计剩余回复: {}", e);
                0
            }
        };

        if remaining > 0 {
            warn!(
                "[Shadow] ⚠️ {} 轮后仍有 {} 条历史回复，继续提问（只读取新回复）",
                max_cycles, remaining
            );
        }
        Ok(remaining)
    }

    /// 填写问题并点击发送
    async fn submit(&mut self) -> ShadowResult<()> {
        let fill = self
            .bridge
            .call(scripts::OP_FILL_INPUT, &scripts::fill_input(&self.request.prompt))
            .await
            .and_then(|p| decode::<FillReply>(scripts::OP_FILL_INPUT, p))?;
        self.drain_logs();
        if !fill.found {
            return Err(ShadowError::NoInputElement);
        }

        sleep(self.timing.submit_settle).await;

        let submit = self
            .bridge
            .call(scripts::OP_CLICK_SUBMIT, &scripts::click_submit())
            .await
            .and_then(|p| decode::<SubmitReply>(scripts::OP_CLICK_SUBMIT, p))
            .map_err(|e| match e {
                ShadowError::SurfaceUnavailable { .. } => e,
                other => ShadowError::SubmissionFailure {
                    reason: other.to_string(),
                },
            })?;
        if !submit.clicked {
            return Err(ShadowError::SubmissionFailure {
                reason: "未找到发送按钮".to_string(),
            });
        }

        info!("[Shadow] 📤 问题已发送，等待回复...");
        Ok(())
    }

    async fn snapshot(&mut self, baseline: usize) -> ShadowResult<Snapshot> {
        let payload = self
            .bridge
            .call(scripts::OP_SNAPSHOT, &scripts::snapshot(baseline))
            .await?;
        decode(scripts::OP_SNAPSHOT, payload)
    }

    /// 轮询回复直到完成、软超时或硬超时
    async fn poll(&mut self, baseline: usize) -> ShadowResult<()> {
        let hard_limit = self.timing.hard_timeout_cycles;
        let soft_limit = self.timing.soft_timeout_cycles;
        let mut last_valid: Option<String> = None;
        let mut cycles_since_valid = 0u32;

        for cycle in 1..=hard_limit {
            if self.is_cancelled() {
                return Err(ShadowError::Cancelled);
            }
            sleep(self.timing.poll_interval).await;

            let snap = match self.snapshot(baseline).await {
                Ok(snap) => snap,
                Err(e @ ShadowError::SurfaceUnavailable { .. }) => return Err(e),
                Err(e) => {
                    debug!("[Shadow] 第 {} 次轮询未取到快照: {}", cycle, e);
                    Snapshot::default()
                }
            };
            self.drain_logs();

            if !snap.text.is_empty() {
                let balanced = is_bracket_balanced(&snap.text);
                if balanced && snap.idle {
                    info!("[Shadow] ✓ 回复生成完毕，长度: {} 字符", snap.text.chars().count());
                    self.transition(QueryState::Complete);
                    self.emitter.complete(snap.text).await;
                    return Ok(());
                }
                // 计数从第一个合法快照开始，之后不再归零；结束时用最新的合法快照
                if balanced {
                    last_valid = Some(snap.text.clone());
                }
                if !self.emitter.offer(snap.text).await {
                    return Err(ShadowError::Cancelled);
                }
            }

            if let Some(valid) = &last_valid {
                cycles_since_valid += 1;
                if cycles_since_valid >= soft_limit {
                    warn!(
                        "[Shadow] ⚠️ 合法回复后 {} 个周期未进入空闲状态，按最后一次合法内容结束",
                        soft_limit
                    );
                    let valid = valid.clone();
                    self.transition(QueryState::Complete);
                    self.emitter.complete(valid).await;
                    return Ok(());
                }
            }
        }

        Err(ShadowError::Timeout { cycles: hard_limit })
    }
}
