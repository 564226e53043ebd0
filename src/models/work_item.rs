//! 工单数据模型

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// 工单中的一条对话
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: u64,
    /// 是否为客户发来的消息（否则为客服）
    #[serde(default)]
    pub incoming: bool,
    #[serde(default, alias = "bodyText")]
    pub body_text: String,
}

/// 待处理的工单
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default, alias = "descriptionText")]
    pub description: Option<String>,
    #[serde(default)]
    pub conversations: Vec<Conversation>,
    /// 要回复的对话 ID，提问只带上截至该条的对话历史
    #[serde(default, alias = "replyTo")]
    pub reply_to: Option<u64>,
    /// 已经存在的语言版本
    #[serde(default)]
    pub available_langs: Vec<String>,
}

/// 批量任务文件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobFile {
    /// 覆盖配置中的笔记本 ID
    #[serde(default)]
    pub notebook_id: Option<String>,
    /// 覆盖配置中的目标语言
    #[serde(default)]
    pub target_langs: Option<Vec<String>>,
    /// 覆盖配置中的提问模板
    #[serde(default)]
    pub prompt_template: Option<String>,
    #[serde(default)]
    pub items: Vec<WorkItem>,
    /// 任务文件路径（加载后设置）
    #[serde(skip)]
    pub file_path: Option<String>,
}

impl JobFile {
    pub fn item_ids(&self) -> Vec<String> {
        self.items.iter().map(|item| item.id.clone()).collect()
    }
}

/// 每个工单已有的语言版本
#[derive(Debug, Clone, Default)]
pub struct ExistingVariants {
    variants: HashMap<String, HashSet<String>>,
}

impl ExistingVariants {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从工单列表自带的 `available_langs` 构建
    pub fn from_items(items: &[WorkItem]) -> Self {
        let mut existing = Self::new();
        for item in items {
            for lang in &item.available_langs {
                existing.insert(&item.id, lang);
            }
        }
        existing
    }

    pub fn insert(&mut self, item_id: &str, lang: &str) {
        self.variants
            .entry(item_id.to_string())
            .or_default()
            .insert(lang.to_string());
    }

    pub fn has(&self, item_id: &str, lang: &str) -> bool {
        self.variants
            .get(item_id)
            .is_some_and(|langs| langs.contains(lang))
    }
}
