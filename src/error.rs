use thiserror::Error;

/// 影子查询引擎错误类型
///
/// 单次查询内的致命错误（`NoInputElement` / `SubmissionFailure` 等）只终止当前查询，
/// 并以 `status: error` 的流元素呈现；`MaxRetriesExceeded` 则终止整个批次。
/// 解析失败不是错误，会静默降级为原始文本。
#[derive(Debug, Error)]
pub enum ShadowError {
    /// 自动化窗口打开失败（不重试）
    #[error("自动化窗口不可用 (notebook: {notebook_id}): {reason}")]
    SurfaceUnavailable { notebook_id: String, reason: String },

    /// 页面上找不到输入框，页面结构已变化
    #[error("未找到输入框，页面结构可能已变化")]
    NoInputElement,

    /// 找不到或无法点击发送按钮
    #[error("提交失败: {reason}")]
    SubmissionFailure { reason: String },

    /// 脚本在限定时间内没有回传结果
    #[error("脚本 {op} 在 {waited_ms}ms 内没有回传结果")]
    ScriptNoReply { op: String, waited_ms: u64 },

    /// 脚本注入本身失败
    #[error("执行脚本失败 ({op}): {reason}")]
    Script { op: String, reason: String },

    /// 轮询超时
    #[error("等待回复超时 ({cycles} 个轮询周期)")]
    Timeout { cycles: u32 },

    /// 查询流以 error 结束
    #[error("查询失败: {0}")]
    Query(String),

    /// 查询被取消
    #[error("查询已取消")]
    Cancelled,

    /// 远端返回了空回复
    #[error("AI 返回了空回复")]
    EmptyAnswer,

    /// 单元重试次数耗尽
    #[error("工单 #{item_id} ({lang}) 连续失败 {attempts} 次")]
    MaxRetriesExceeded {
        item_id: String,
        lang: String,
        attempts: u32,
    },

    /// 已有查询在进行中
    #[error("已有任务正在处理中")]
    Busy,

    /// 宿主回调失败（保存结果、刷新列表等）
    #[error("宿主操作失败: {0}")]
    Host(String),
}

impl ShadowError {
    /// 创建窗口不可用错误
    pub fn surface_unavailable(notebook_id: impl Into<String>, reason: impl ToString) -> Self {
        ShadowError::SurfaceUnavailable {
            notebook_id: notebook_id.into(),
            reason: reason.to_string(),
        }
    }

    /// 创建脚本执行错误
    pub fn script(op: impl Into<String>, reason: impl ToString) -> Self {
        ShadowError::Script {
            op: op.into(),
            reason: reason.to_string(),
        }
    }
}

/// 引擎结果类型
pub type ShadowResult<T> = Result<T, ShadowError>;
