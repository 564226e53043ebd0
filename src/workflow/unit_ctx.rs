//! 批量单元上下文
//!
//! 封装"我正在处理哪个工单的哪种语言"这一信息

use std::fmt::Display;

/// 批量单元上下文
#[derive(Debug, Clone)]
pub struct UnitCtx {
    /// 工单ID
    pub item_id: String,

    /// 工单在本批中的序号（从1开始，仅用于日志显示）
    pub item_index: usize,

    /// 本批工单总数
    pub item_total: usize,

    /// 目标语言
    pub lang: String,
}

impl UnitCtx {
    pub fn new(item_id: String, item_index: usize, item_total: usize, lang: String) -> Self {
        Self {
            item_id,
            item_index,
            item_total,
            lang,
        }
    }
}

impl Display for UnitCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[工单 {}/{} #{} 语言 {}]",
            self.item_index, self.item_total, self.item_id, self.lang
        )
    }
}
