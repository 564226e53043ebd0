//! 自动化窗口 - 基础设施层
//!
//! 持有唯一的远端会话句柄和它的可见性。可见性变化会广播给所有观察者，
//! 而不只是调用方：多个独立的界面可能同时展示同一个窗口的状态。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::time::sleep;
use tracing::{debug, error, info};

use super::backend::{AutomationBackend, SurfaceHandle};
use crate::error::{ShadowError, ShadowResult};

/// 自动化窗口
pub struct AutomationSurface {
    backend: Arc<dyn AutomationBackend>,
    handle: SurfaceHandle,
    settle_delay: Duration,
    opened: Mutex<bool>,
    visibility: watch::Sender<bool>,
}

impl AutomationSurface {
    pub fn new(backend: Arc<dyn AutomationBackend>, handle: SurfaceHandle, settle_delay: Duration) -> Self {
        let (visibility, _) = watch::channel(false);
        Self {
            backend,
            handle,
            settle_delay,
            opened: Mutex::new(false),
            visibility,
        }
    }

    pub fn handle(&self) -> &SurfaceHandle {
        &self.handle
    }

    pub fn backend(&self) -> &Arc<dyn AutomationBackend> {
        &self.backend
    }

    /// 窗口是否已经打开
    pub async fn is_open(&self) -> bool {
        *self.opened.lock().await
    }

    /// 打开窗口（幂等）
    ///
    /// 首次打开后会等待 `settle_delay`，让页面自身脚本完成初始化，
    /// 否则注入脚本查找元素时会和页面初始化竞争。打开失败只尝试一次。
    pub async fn init(&self) -> ShadowResult<()> {
        let mut opened = self.opened.lock().await;
        if *opened {
            debug!("窗口已打开，跳过初始化");
            return Ok(());
        }

        info!("[Shadow] 正在打开笔记本窗口: {}", self.handle.notebook_id);
        self.backend.open_surface(&self.handle).await.map_err(|e| {
            error!("[Shadow] 打开窗口失败: {}", e);
            ShadowError::surface_unavailable(&self.handle.notebook_id, e)
        })?;

        debug!("[Shadow] 等待页面稳定 ({:?})...", self.settle_delay);
        sleep(self.settle_delay).await;

        *opened = true;
        info!("[Shadow] ✓ 窗口已就绪");
        Ok(())
    }

    /// 显示窗口
    pub async fn show(&self) -> ShadowResult<()> {
        self.init().await?;
        self.set_visible(true).await
    }

    /// 隐藏窗口（不关闭，之后的 show 复用同一个会话）
    pub async fn hide(&self) -> ShadowResult<()> {
        self.set_visible(false).await
    }

    /// 从后端重新读取可见性并广播
    pub async fn refresh_visibility(&self) -> ShadowResult<bool> {
        let visible = self
            .backend
            .visibility()
            .await
            .map_err(|e| ShadowError::surface_unavailable(&self.handle.notebook_id, e))?;
        self.broadcast(visible);
        Ok(visible)
    }

    /// 当前已知的可见性
    pub fn is_visible(&self) -> bool {
        *self.visibility.borrow()
    }

    /// 注册可见性观察者
    pub fn subscribe_visibility(&self) -> watch::Receiver<bool> {
        self.visibility.subscribe()
    }

    async fn set_visible(&self, visible: bool) -> ShadowResult<()> {
        self.backend
            .set_visibility(visible)
            .await
            .map_err(|e| ShadowError::surface_unavailable(&self.handle.notebook_id, e))?;
        self.broadcast(visible);
        Ok(())
    }

    fn broadcast(&self, visible: bool) {
        debug!("[Shadow] 窗口可见性: {}", visible);
        self.visibility.send_replace(visible);
    }
}
