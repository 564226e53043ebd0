use anyhow::{Context, Result};
/// 日志工具模块
///
/// 提供日志初始化、格式化和输出的辅助函数
use std::fs::{self, OpenOptions};
use std::io::Write;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// 初始化 tracing 日志
///
/// 优先使用 `RUST_LOG`；未设置时按 `verbose` 选择 debug 或 info 级别。
pub fn init(verbose: bool) {
    let default_filter = if verbose {
        "notebook_shadow=debug,info"
    } else {
        "info,chromiumoxide=warn"
    };
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n批量回复日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)
        .with_context(|| format!("无法创建日志文件: {}", log_file_path))?;
    Ok(())
}

/// 把批次日志追加到日志文件
pub fn append_log_lines(log_file_path: &str, lines: &[String]) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path)
        .with_context(|| format!("无法打开日志文件: {}", log_file_path))?;
    for line in lines {
        writeln!(file, "{}", line)?;
    }
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - NotebookLM 批量回复模式");
    info!("📓 笔记本: {}", config.notebook_id);
    info!("🌐 目标语言: {}", config.target_langs.join(", "));
    info!(
        "🔁 每个单元最多尝试 {} 次，间隔 {:?}",
        config.retry.max_attempts, config.retry.retry_delay
    );
    info!("{}", "=".repeat(60));
}

/// 记录批次开始信息
///
/// # 参数
/// - `items`: 工单数量
/// - `langs`: 目标语言
pub fn log_batch_start(items: usize, langs: &[String]) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始批量处理: {} 个工单 × {} 种语言", items, langs.len());
    info!("📄 共 {} 个单元", items * langs.len());
    info!("{}", "=".repeat(60));
}

/// 打印最终统计信息
pub fn print_final_stats(
    succeeded: usize,
    skipped: usize,
    failed: usize,
    total: usize,
    aborted: bool,
    log_file_path: &str,
) {
    info!("\n{}", "=".repeat(60));
    info!("📊 批量处理统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", succeeded, total);
    info!("⏭️ 跳过: {}", skipped);
    info!("❌ 失败: {}", failed);
    if aborted {
        info!("🛑 批次已中止，剩余单元未处理");
    }
    info!("{}", "=".repeat(60));
    info!("\n日志已保存至: {}", log_file_path);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
