//! 提问构建 - 业务能力层
//!
//! 把工单内容整理成上下文文本，并替换进提问模板。

use crate::models::WorkItem;

/// 模板中的工单内容占位符
pub const CONTEXT_PLACEHOLDER: &str = "${工单内容}";

/// 默认提问模板
pub const DEFAULT_TEMPLATE: &str = "请根据以下工单内容回答我的问题:\n\n${工单内容}";

/// 提问构建器
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    template: String,
}

impl PromptBuilder {
    pub fn new(template: Option<String>) -> Self {
        Self {
            template: template.unwrap_or_else(|| DEFAULT_TEMPLATE.to_string()),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// 构建工单上下文
    ///
    /// 指定 `until_conversation` 时，对话历史截止到该条（含）。
    pub fn ticket_context(item: &WorkItem, until_conversation: Option<u64>) -> String {
        let mut context = format!(
            "Subject: {}\n\nDescription: {}\n\n",
            item.subject,
            item.description.as_deref().unwrap_or("No description")
        );

        if !item.conversations.is_empty() {
            context.push_str("Conversations history:\n");
            for conv in &item.conversations {
                let speaker = if conv.incoming { "Customer" } else { "Agent" };
                context.push_str(&format!("{}: {}\n", speaker, conv.body_text));
                if until_conversation == Some(conv.id) {
                    break;
                }
            }
        }

        context
    }

    /// 用工单内容填充模板（只替换第一个占位符）
    pub fn build(&self, item: &WorkItem, until_conversation: Option<u64>) -> String {
        let context = Self::ticket_context(item, until_conversation);
        if self.template.contains(CONTEXT_PLACEHOLDER) {
            self.template.replacen(CONTEXT_PLACEHOLDER, &context, 1)
        } else {
            format!("{}\n\n{}", self.template, context)
        }
    }

    /// 构建批量单元的提问：模板 + 目标语言与输出格式要求
    ///
    /// 工单指定了 `reply_to` 时，对话历史截止到该条。
    pub fn build_for_lang(&self, item: &WorkItem, lang: &str) -> String {
        format!(
            "{}\n\n目标语言: {}。请只返回一个 JSON 数组：[\"{}版本\", \"中文版本\"]",
            self.build(item, item.reply_to),
            lang_display(lang),
            lang_display(lang)
        )
    }
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(None)
    }
}

/// 语言代码的显示名称
pub fn lang_display(lang: &str) -> &str {
    match lang {
        "cn" | "zh" | "zh-CN" => "中文",
        "en" => "English",
        "ja" => "日本語",
        "ko" => "한국어",
        "es" => "Español",
        "fr" => "Français",
        "de" => "Deutsch",
        other => other,
    }
}
