//! chromiumoxide 自动化后端 - 基础设施层
//!
//! 持有唯一的 Page 资源。脚本通过 `window.__shadowEmit(json)` 回传事件，
//! 该函数由 `Runtime.addBinding` 注入，调用会产生 `Runtime.bindingCalled` 事件。

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::{
    Bounds, GetWindowForTargetParams, SetWindowBoundsParams, WindowState,
};
use chromiumoxide::cdp::js_protocol::runtime::{AddBindingParams, EvaluateParams, EventBindingCalled};
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use tokio::sync::{broadcast, OnceCell};
use tracing::{debug, info, warn};

use super::backend::{AutomationBackend, BridgeEvent, SurfaceHandle};

/// 注入到页面的回传函数名
pub const BINDING_NAME: &str = "__shadowEmit";

const EVENT_CAPACITY: usize = 256;

/// 基于 chromiumoxide 的后端
pub struct ChromiumBackend {
    _browser: Browser,
    page: Page,
    events: broadcast::Sender<BridgeEvent>,
    binding: OnceCell<()>,
    visible: AtomicBool,
}

impl ChromiumBackend {
    pub fn new(browser: Browser, page: Page) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            _browser: browser,
            page,
            events,
            binding: OnceCell::new(),
            visible: AtomicBool::new(false),
        }
    }

    /// 获取 page 的引用
    pub fn page(&self) -> &Page {
        &self.page
    }

    /// 注册回传函数并在后台转发 bindingCalled 事件
    async fn install_binding(&self) -> Result<()> {
        let mut calls = self
            .page
            .event_listener::<EventBindingCalled>()
            .await
            .context("无法监听 bindingCalled 事件")?;

        self.page
            .execute(AddBindingParams::new(BINDING_NAME))
            .await
            .context("注册回传函数失败")?;

        let tx = self.events.clone();
        tokio::spawn(async move {
            while let Some(call) = calls.next().await {
                if call.name != BINDING_NAME {
                    continue;
                }
                match serde_json::from_str::<BridgeEvent>(&call.payload) {
                    Ok(event) => {
                        // 没有订阅者时发送失败是正常的
                        let _ = tx.send(event);
                    }
                    Err(e) => warn!("无法解析回传事件: {} (payload: {})", e, call.payload),
                }
            }
            debug!("bindingCalled 事件流已结束");
        });

        debug!("回传函数 {} 已注册", BINDING_NAME);
        Ok(())
    }

    async fn apply_window_state(&self, visible: bool) -> Result<()> {
        let window = self.page.execute(GetWindowForTargetParams::default()).await?;
        let state = if visible {
            WindowState::Normal
        } else {
            WindowState::Minimized
        };
        let bounds = Bounds {
            left: None,
            top: None,
            width: None,
            height: None,
            window_state: Some(state),
        };
        self.page
            .execute(SetWindowBoundsParams::new(window.result.window_id.clone(), bounds))
            .await?;
        if visible {
            self.page.bring_to_front().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl AutomationBackend for ChromiumBackend {
    async fn open_surface(&self, handle: &SurfaceHandle) -> Result<()> {
        let current_url = self.page.url().await?.unwrap_or_default();

        if handle.matches_url(&current_url) {
            debug!("页面已经指向笔记本 {}，复用现有页面", handle.notebook_id);
        } else {
            let target = handle.target_url();
            info!("正在导航到笔记本: {}", target);
            self.page
                .goto(target.as_str())
                .await
                .with_context(|| format!("导航到 {} 失败", target))?;
        }

        self.binding
            .get_or_try_init(|| self.install_binding())
            .await?;
        Ok(())
    }

    async fn execute_script(&self, script: &str) -> Result<()> {
        let params = EvaluateParams::builder()
            .expression(script)
            .await_promise(false)
            .build()
            .map_err(|e| anyhow::anyhow!("构建脚本参数失败: {}", e))?;
        self.page.execute(params).await?;
        Ok(())
    }

    async fn set_visibility(&self, visible: bool) -> Result<()> {
        // 无头模式下没有窗口，只记录状态
        if let Err(e) = self.apply_window_state(visible).await {
            warn!("切换窗口状态失败（可能为无头模式）: {}", e);
        }
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
