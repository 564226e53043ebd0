//! 基础设施层
//!
//! 持有稀缺资源（浏览器页面），只向上暴露能力：
//! - `AutomationBackend` - 宿主提供的自动化接口
//! - `ChromiumBackend` - 基于 chromiumoxide 的实现，唯一的 page owner
//! - `AutomationSurface` - 单一会话窗口及其可见性广播
//! - `ScriptBridge` - 脚本注入与事件回传

pub mod backend;
pub mod chromium;
pub mod script_bridge;
pub mod surface;

pub use backend::{AutomationBackend, BridgeEvent, SurfaceHandle};
pub use chromium::ChromiumBackend;
pub use script_bridge::{EventSubscription, ScriptBridge, LOG_EVENT, RESULT_EVENT};
pub use surface::AutomationSurface;
