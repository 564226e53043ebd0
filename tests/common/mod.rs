//! 测试用的假后端和假宿主
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tokio::sync::broadcast;

use notebook_shadow::config::QueryTiming;
use notebook_shadow::infrastructure::script_bridge::parse_op_marker;
use notebook_shadow::infrastructure::{
    AutomationBackend, AutomationSurface, BridgeEvent, ScriptBridge, SurfaceHandle,
};
use notebook_shadow::orchestrator::{AbortSignal, BatchHost};
use notebook_shadow::services::scripts;
use notebook_shadow::services::{BilingualAnswer, StreamingQueryProtocol};
use notebook_shadow::workflow::AnswerSource;
use notebook_shadow::{ShadowError, ShadowResult};

/// 假页面状态
pub struct PageState {
    /// 当前回复块数量
    pub answers: usize,
    /// 清除历史是否有效
    pub clearable: bool,
    pub input_present: bool,
    pub submit_present: bool,
    /// 依次返回的快照 (text, idle)，用完后重复最后一个
    pub snapshots: VecDeque<(String, bool)>,
    pub last_snapshot: (String, bool),
    /// 脚本执行后多久才回传事件
    pub reply_delay: Option<Duration>,
}

impl Default for PageState {
    fn default() -> Self {
        Self {
            answers: 0,
            clearable: true,
            input_present: true,
            submit_present: true,
            snapshots: VecDeque::new(),
            last_snapshot: (String::new(), false),
            reply_delay: None,
        }
    }
}

/// 按脚本标记应答的假后端
pub struct FakeBackend {
    pub page: Mutex<PageState>,
    events: broadcast::Sender<BridgeEvent>,
    opens: AtomicUsize,
    visible: AtomicBool,
    visibility_calls: AtomicUsize,
    ops: Mutex<HashMap<String, usize>>,
}

impl FakeBackend {
    pub fn new(page: PageState) -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            page: Mutex::new(page),
            events,
            opens: AtomicUsize::new(0),
            visible: AtomicBool::new(false),
            visibility_calls: AtomicUsize::new(0),
            ops: Mutex::new(HashMap::new()),
        })
    }

    /// 按给定快照序列作答的页面
    pub fn answering(snapshots: &[(&str, bool)]) -> Arc<Self> {
        Self::new(PageState {
            snapshots: snapshots
                .iter()
                .map(|(text, idle)| (text.to_string(), *idle))
                .collect(),
            ..Default::default()
        })
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn visibility_calls(&self) -> usize {
        self.visibility_calls.load(Ordering::SeqCst)
    }

    pub fn op_count(&self, op: &str) -> usize {
        self.ops.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    pub fn total_ops(&self) -> usize {
        self.ops.lock().unwrap().values().sum()
    }

    fn reply(&self, op: &str) -> JsonValue {
        let mut page = self.page.lock().unwrap();
        match op {
            scripts::OP_CLEAR_STEP => {
                let answers = page.answers;
                if answers == 0 {
                    json!({ "answers": 0, "action": "none" })
                } else if page.clearable {
                    page.answers = 0;
                    json!({ "answers": answers, "action": "deleted" })
                } else {
                    json!({ "answers": answers, "action": "no_options" })
                }
            }
            scripts::OP_COUNT_ANSWERS => json!({ "answers": page.answers }),
            scripts::OP_FILL_INPUT => json!({ "found": page.input_present }),
            scripts::OP_CLICK_SUBMIT => json!({ "clicked": page.submit_present }),
            scripts::OP_SNAPSHOT => {
                if let Some(next) = page.snapshots.pop_front() {
                    page.last_snapshot = next;
                }
                let (text, idle) = page.last_snapshot.clone();
                json!({ "count": page.answers + 1, "text": text, "idle": idle })
            }
            other => json!({ "error": format!("unknown op {}", other) }),
        }
    }
}

#[async_trait]
impl AutomationBackend for FakeBackend {
    async fn open_surface(&self, _handle: &SurfaceHandle) -> Result<()> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn execute_script(&self, script: &str) -> Result<()> {
        let Some((op, id)) = parse_op_marker(script) else {
            return Ok(());
        };
        *self.ops.lock().unwrap().entry(op.clone()).or_default() += 1;

        let mut payload = self.reply(&op);
        payload["id"] = json!(id);
        payload["op"] = json!(op);
        let log = BridgeEvent::new("log", json!({ "id": id, "message": op }));
        let result = BridgeEvent::new("result", payload);

        let delay = self.page.lock().unwrap().reply_delay;
        match delay {
            Some(delay) => {
                let events = self.events.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = events.send(log);
                    let _ = events.send(result);
                });
            }
            None => {
                let _ = self.events.send(log);
                let _ = self.events.send(result);
            }
        }
        Ok(())
    }

    async fn set_visibility(&self, visible: bool) -> Result<()> {
        self.visibility_calls.fetch_add(1, Ordering::SeqCst);
        self.visible.store(visible, Ordering::SeqCst);
        Ok(())
    }

    async fn visibility(&self) -> Result<bool> {
        Ok(self.visible.load(Ordering::SeqCst))
    }

    fn subscribe_events(&self) -> broadcast::Receiver<BridgeEvent> {
        self.events.subscribe()
    }
}

/// 测试用的时序：轮询间隔 500ms，硬超时 `hard` 周期，软超时 `soft` 周期
pub fn test_timing(hard: u32, soft: u32) -> QueryTiming {
    QueryTiming {
        surface_settle: Duration::from_millis(10),
        clear_max_cycles: 3,
        clear_settle: Duration::from_millis(100),
        submit_settle: Duration::from_millis(50),
        poll_interval: Duration::from_millis(500),
        hard_timeout_cycles: hard,
        soft_timeout_cycles: soft,
        script_reply_timeout: Duration::from_millis(200),
    }
}

pub fn surface_for(backend: Arc<FakeBackend>) -> Arc<AutomationSurface> {
    Arc::new(AutomationSurface::new(
        backend,
        SurfaceHandle::new("nb-test"),
        Duration::from_millis(10),
    ))
}

pub fn protocol_for(backend: Arc<FakeBackend>, timing: QueryTiming) -> StreamingQueryProtocol {
    let surface = surface_for(backend);
    let bridge = Arc::new(ScriptBridge::new(surface, timing.script_reply_timeout));
    StreamingQueryProtocol::new(bridge, timing)
}

/// 假回答来源
///
/// `failures` 记录每个工单还要失败几次（`u32::MAX` 表示一直失败）；
/// 设置了 `abort_after` 时，第 n 次调用结束后设置中止信号。
#[derive(Default)]
pub struct FakeSource {
    pub prompts: Mutex<Vec<String>>,
    pub failures: Mutex<HashMap<String, u32>>,
    pub abort_after: Option<(usize, AbortSignal)>,
    pub delay: Option<Duration>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, item_id: &str, times: u32) -> Self {
        self.failures.get_mut().unwrap().insert(item_id.to_string(), times);
        self
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl AnswerSource for FakeSource {
    async fn answer(&self, prompt: &str) -> ShadowResult<BilingualAnswer> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let calls = {
            let mut prompts = self.prompts.lock().unwrap();
            prompts.push(prompt.to_string());
            prompts.len()
        };
        if let Some((n, abort)) = &self.abort_after {
            if calls >= *n {
                abort.set();
            }
        }

        // FakeHost 的提问格式为 "<item>|<lang>"
        let item_id = prompt.split('|').next().unwrap_or_default().to_string();
        let mut failures = self.failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(&item_id) {
            if *remaining > 0 {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                return Err(ShadowError::Timeout { cycles: 360 });
            }
        }

        Ok(BilingualAnswer {
            target_text: format!("reply to {}", prompt),
            reference_text: format!("回复 {}", prompt),
            parsed: true,
        })
    }
}

/// 假宿主，记录保存与收尾调用
#[derive(Default)]
pub struct FakeHost {
    pub stored: Mutex<Vec<(String, String)>>,
    pub refreshes: AtomicUsize,
    pub clears: AtomicUsize,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stored(&self) -> Vec<(String, String)> {
        self.stored.lock().unwrap().clone()
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BatchHost for FakeHost {
    async fn build_prompt(&self, item_id: &str, lang: &str) -> Result<String> {
        Ok(format!("{}|{}", item_id, lang))
    }

    async fn store_answer(&self, item_id: &str, lang: &str, _answer: &BilingualAnswer) -> Result<()> {
        self.stored
            .lock()
            .unwrap()
            .push((item_id.to_string(), lang.to_string()));
        Ok(())
    }

    async fn refresh_items(&self) -> Result<()> {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear_selection(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn ids(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
