//! 自动化后端接口 - 基础设施层
//!
//! 宿主平台提供的不透明自动化能力：打开窗口、注入脚本、切换可见性，
//! 以及一条异步回传具名事件的通道。

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::broadcast;

/// NotebookLM 默认地址前缀
pub const NOTEBOOK_BASE_URL: &str = "https://notebooklm.google.com/notebook/";

/// 一个远端会话的标识（笔记本 ID + 可选的源地址）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceHandle {
    pub notebook_id: String,
    pub notebook_url: Option<String>,
}

impl SurfaceHandle {
    pub fn new(notebook_id: impl Into<String>) -> Self {
        Self {
            notebook_id: notebook_id.into(),
            notebook_url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.notebook_url = Some(url.into());
        self
    }

    /// 要打开的页面地址
    pub fn target_url(&self) -> String {
        match &self.notebook_url {
            Some(url) => url.clone(),
            None => format!("{}{}", NOTEBOOK_BASE_URL, self.notebook_id),
        }
    }

    /// 当前页面地址是否已经指向这个会话
    pub fn matches_url(&self, current_url: &str) -> bool {
        current_url.contains(&self.notebook_id)
    }
}

/// 脚本回传的具名事件（`result` / `log`）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeEvent {
    pub name: String,
    #[serde(default)]
    pub payload: JsonValue,
}

impl BridgeEvent {
    pub fn new(name: impl Into<String>, payload: JsonValue) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// 自动化后端
///
/// 职责：
/// - 打开/导航到指定会话
/// - 执行脚本（不返回结果，结果通过事件回传）
/// - 切换与查询窗口可见性
/// - 提供入站事件通道
#[async_trait]
pub trait AutomationBackend: Send + Sync + 'static {
    /// 打开（或导航到）指定会话
    async fn open_surface(&self, handle: &SurfaceHandle) -> Result<()>;

    /// 执行脚本片段，不等待脚本内的异步逻辑
    async fn execute_script(&self, script: &str) -> Result<()>;

    /// 设置窗口可见性
    async fn set_visibility(&self, visible: bool) -> Result<()>;

    /// 读取窗口可见性
    async fn visibility(&self) -> Result<bool>;

    /// 订阅脚本回传的事件
    fn subscribe_events(&self) -> broadcast::Receiver<BridgeEvent>;
}
