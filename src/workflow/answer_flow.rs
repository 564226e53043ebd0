//! 单次回复流程 - 流程层
//!
//! 一个问题的完整处理：查询协议 → 读到最终文本 → 双语解析

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::error::{ShadowError, ShadowResult};
use crate::services::query_protocol::{StreamStatus, StreamingQueryProtocol};
use crate::services::response_parser::{parse_answer, try_parse_partial, BilingualAnswer};
use crate::utils::logging::truncate_text;

/// 回答来源
///
/// 批量执行器只依赖这个接口；真实实现是 `AnswerFlow`。
#[async_trait]
pub trait AnswerSource: Send + Sync {
    /// 提问并返回解析后的双语回复
    async fn answer(&self, prompt: &str) -> ShadowResult<BilingualAnswer>;
}

/// 单次回复流程
///
/// - 不持有页面资源，只依赖查询协议
/// - 流以 error 结束时返回错误，由上层决定是否重试
/// - 解析失败不算错误
pub struct AnswerFlow {
    protocol: Arc<StreamingQueryProtocol>,
    verbose_logging: bool,
}

impl AnswerFlow {
    pub fn new(protocol: Arc<StreamingQueryProtocol>, verbose_logging: bool) -> Self {
        Self {
            protocol,
            verbose_logging,
        }
    }

    pub fn protocol(&self) -> &Arc<StreamingQueryProtocol> {
        &self.protocol
    }
}

#[async_trait]
impl AnswerSource for AnswerFlow {
    async fn answer(&self, prompt: &str) -> ShadowResult<BilingualAnswer> {
        let mut stream = self.protocol.query(prompt)?;
        let mut final_text = None;
        let mut chunks = 0usize;

        while let Some(event) = stream.next().await {
            match event.status {
                StreamStatus::Streaming => {
                    chunks += 1;
                    if self.verbose_logging {
                        match try_parse_partial(&event.text) {
                            Some(preview) => debug!(
                                "回复预览: {}",
                                truncate_text(&preview.target_text, 60)
                            ),
                            None => debug!("回复片段: {}", truncate_text(&event.text, 60)),
                        }
                    }
                }
                StreamStatus::Complete => {
                    final_text = Some(event.text);
                    break;
                }
                StreamStatus::Error => return Err(ShadowError::Query(event.text)),
            }
        }

        let text = final_text
            .ok_or_else(|| ShadowError::Query("查询流没有给出最终结果".to_string()))?;
        if text.trim().is_empty() {
            return Err(ShadowError::EmptyAnswer);
        }

        let answer = parse_answer(&text);
        if answer.parsed {
            info!("✓ 已解析双语回复 (中间片段 {} 个)", chunks);
        } else {
            warn!("⚠️ 回复不是双语数组格式，保留原始内容: {}", truncate_text(&text, 80));
        }
        Ok(answer)
    }
}
