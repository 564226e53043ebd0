//! 脚本桥 - 基础设施层
//!
//! 在窗口中执行脚本片段，并把脚本异步回传的具名事件交给监听者。
//! 远端执行上下文与调用是解耦的，所以脚本的结果一律走事件而不是返回值。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::time::timeout;
use tracing::{debug, warn};

use super::backend::BridgeEvent;
use super::chromium::BINDING_NAME;
use super::surface::AutomationSurface;
use crate::error::{ShadowError, ShadowResult};

/// 脚本回传结果的事件名
pub const RESULT_EVENT: &str = "result";
/// 脚本回传日志的事件名
pub const LOG_EVENT: &str = "log";

/// 脚本桥
///
/// 职责：
/// - 执行脚本（fire-and-forget）
/// - 提供按事件名过滤的订阅，订阅在 drop 时自动注销
/// - 提供"执行并等待对应 result 事件"的调用方式
pub struct ScriptBridge {
    surface: Arc<AutomationSurface>,
    next_id: AtomicU64,
    reply_timeout: Duration,
}

impl ScriptBridge {
    pub fn new(surface: Arc<AutomationSurface>, reply_timeout: Duration) -> Self {
        Self {
            surface,
            next_id: AtomicU64::new(1),
            reply_timeout,
        }
    }

    pub fn surface(&self) -> &Arc<AutomationSurface> {
        &self.surface
    }

    /// 执行脚本，不等待结果
    pub async fn execute(&self, script: &str) -> ShadowResult<()> {
        self.surface.init().await?;
        debug!("注入脚本，长度: {} 字符", script.len());
        self.surface
            .backend()
            .execute_script(script)
            .await
            .map_err(|e| ShadowError::script("execute", e))
    }

    /// 订阅指定名称的事件
    pub fn on(&self, event_name: &str) -> EventSubscription {
        EventSubscription {
            name: event_name.to_string(),
            rx: self.surface.backend().subscribe_events(),
        }
    }

    /// 执行一个带编号的操作脚本，并等待对应的 `result` 事件
    ///
    /// `body` 是一个异步函数体，返回值（对象）会合并进回传的 payload。
    /// 旧调用迟到的回传会因为编号不符被忽略。
    pub async fn call(&self, op: &str, body: &str) -> ShadowResult<JsonValue> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        // 必须先订阅再执行，否则可能错过回传
        let mut results = self.on(RESULT_EVENT);
        self.execute(&wrap_op_script(op, id, body)).await?;

        let reply = timeout(self.reply_timeout, async {
            while let Some(payload) = results.recv().await {
                if payload.get("id").and_then(JsonValue::as_u64) == Some(id) {
                    return Some(payload);
                }
                debug!("忽略过期的回传 (期望 id={}): {}", id, payload);
            }
            None
        })
        .await;

        match reply {
            Ok(Some(payload)) => {
                if let Some(err) = payload.get("error").and_then(JsonValue::as_str) {
                    return Err(ShadowError::script(op, err));
                }
                Ok(payload)
            }
            Ok(None) | Err(_) => Err(ShadowError::ScriptNoReply {
                op: op.to_string(),
                waited_ms: self.reply_timeout.as_millis() as u64,
            }),
        }
    }
}

/// 事件订阅
///
/// drop 即注销，不会在多次查询之间泄漏监听者。
pub struct EventSubscription {
    name: String,
    rx: broadcast::Receiver<BridgeEvent>,
}

impl EventSubscription {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 等待下一个同名事件的 payload；通道关闭时返回 None
    pub async fn recv(&mut self) -> Option<JsonValue> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.name == self.name => return Some(event.payload),
                Ok(_) => continue,
                Err(RecvError::Lagged(n)) => {
                    warn!("事件订阅 {} 落后，丢弃了 {} 条事件", self.name, n);
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// 非阻塞地取出一个已到达的同名事件
    pub fn try_recv(&mut self) -> Option<JsonValue> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if event.name == self.name => return Some(event.payload),
                Ok(_) => continue,
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}

/// 把操作函数体包装成带编号、带回传的脚本
///
/// 第一行是 `/* shadow-op:<op> id:<id> */` 标记，便于在日志里辨认。
pub fn wrap_op_script(op: &str, id: u64, body: &str) -> String {
    format!(
        r#"/* shadow-op:{op} id:{id} */
(async () => {{
    const __id = {id};
    const emit = (name, payload) => {{
        try {{
            window.{binding}(JSON.stringify({{ name, payload }}));
        }} catch (e) {{
            console.error('[Shadow JS] emit failed:', e);
        }}
    }};
    const log = (message) => emit('log', {{ id: __id, message: String(message) }});
    const sleep = (ms) => new Promise(r => setTimeout(r, ms));
    try {{
        const __result = await (async () => {{
{body}
        }})();
        emit('result', Object.assign({{ id: __id, op: '{op}' }}, __result || {{}}));
    }} catch (e) {{
        emit('result', {{ id: __id, op: '{op}', error: String((e && e.message) || e) }});
    }}
}})();"#,
        op = op,
        id = id,
        binding = BINDING_NAME,
        body = body,
    )
}

/// 从脚本标记行解析出 (op, id)
pub fn parse_op_marker(script: &str) -> Option<(String, u64)> {
    let line = script.lines().next()?.trim();
    let inner = line.strip_prefix("/* shadow-op:")?.strip_suffix("*/")?.trim();
    let (op, id) = inner.split_once(" id:")?;
    Some((op.trim().to_string(), id.trim().parse().ok()?))
}
