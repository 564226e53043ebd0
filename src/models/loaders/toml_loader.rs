use crate::models::work_item::JobFile;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 从 TOML 文件加载批量任务
pub async fn load_job_file(toml_file_path: &Path) -> Result<JobFile> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取TOML文件: {}", toml_file_path.display()))?;

    let mut job: JobFile = toml::from_str(&content)
        .with_context(|| format!("无法解析TOML文件: {}", toml_file_path.display()))?;

    job.file_path = Some(toml_file_path.to_string_lossy().to_string());

    Ok(job)
}

/// 从文件夹中加载所有 TOML 任务文件，合并为一个任务
///
/// 各文件的覆盖项（笔记本、语言、模板）以第一个设置了该项的文件为准；
/// 解析失败的文件跳过并记录警告。
pub async fn load_all_job_files(folder_path: &str) -> Result<JobFile> {
    let folder = PathBuf::from(folder_path);

    if !folder.exists() {
        anyhow::bail!("文件夹不存在: {}", folder_path);
    }

    let mut paths = Vec::new();
    let mut entries = fs::read_dir(&folder)
        .await
        .with_context(|| format!("无法读取文件夹: {}", folder_path))?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some("toml") {
            paths.push(path);
        }
    }
    // read_dir 的顺序不稳定，排序保证批次顺序可复现
    paths.sort();

    let mut merged = JobFile {
        file_path: Some(folder_path.to_string()),
        ..Default::default()
    };

    for path in paths {
        tracing::info!(
            "正在加载: {}",
            path.file_name().unwrap_or_default().to_string_lossy()
        );

        match load_job_file(&path).await {
            Ok(job) => {
                tracing::info!("成功加载 {} 个工单", job.items.len());
                merged.notebook_id = merged.notebook_id.or(job.notebook_id);
                merged.target_langs = merged.target_langs.or(job.target_langs);
                merged.prompt_template = merged.prompt_template.or(job.prompt_template);
                merged.items.extend(job.items);
            }
            Err(e) => {
                tracing::warn!("加载文件失败 {}: {}", path.display(), e);
            }
        }
    }

    Ok(merged)
}

/// 按路径类型加载：目录则合并其中所有 TOML，否则按单个文件加载
pub async fn load_jobs(path: &str) -> Result<JobFile> {
    if Path::new(path).is_dir() {
        load_all_job_files(path).await
    } else {
        load_job_file(Path::new(path)).await
    }
}
