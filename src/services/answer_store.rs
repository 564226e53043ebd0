//! 回复保存服务 - 业务能力层
//!
//! 只负责"把一条双语回复写到输出目录"，每个 (工单, 语言) 一个 TOML 文件。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::debug;

use crate::services::response_parser::BilingualAnswer;

/// 保存到磁盘的回复记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub item_id: String,
    pub lang: String,
    pub target_text: String,
    pub reference_text: String,
    pub parsed: bool,
    pub generated_at: String,
}

/// 回复保存服务
pub struct AnswerStore {
    output_dir: PathBuf,
}

impl AnswerStore {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn record_path(&self, item_id: &str, lang: &str) -> PathBuf {
        self.output_dir.join(format!("{}_{}.toml", item_id, lang))
    }

    /// 写入一条回复，已存在时覆盖
    pub async fn write(&self, item_id: &str, lang: &str, answer: &BilingualAnswer) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir)
            .await
            .with_context(|| format!("无法创建输出目录: {}", self.output_dir.display()))?;

        let record = AnswerRecord {
            item_id: item_id.to_string(),
            lang: lang.to_string(),
            target_text: answer.target_text.clone(),
            reference_text: answer.reference_text.clone(),
            parsed: answer.parsed,
            generated_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        let content = toml::to_string_pretty(&record).context("序列化回复失败")?;

        let path = self.record_path(item_id, lang);
        fs::write(&path, content)
            .await
            .with_context(|| format!("写入回复失败: {}", path.display()))?;

        debug!("回复已保存: {}", path.display());
        Ok(path)
    }

    /// 读取一条已保存的回复
    pub async fn read(&self, item_id: &str, lang: &str) -> Result<Option<AnswerRecord>> {
        let path = self.record_path(item_id, lang);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .await
            .with_context(|| format!("读取回复失败: {}", path.display()))?;
        let record = toml::from_str(&content)
            .with_context(|| format!("解析回复失败: {}", path.display()))?;
        Ok(Some(record))
    }

    /// 是否已经有该语言的回复
    pub fn exists(&self, item_id: &str, lang: &str) -> bool {
        self.record_path(item_id, lang).exists()
    }
}
