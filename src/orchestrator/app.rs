//! 应用入口 - 编排层
//!
//! 持有浏览器资源，把各层组装起来：
//!
//! ```text
//! ChromiumBackend → AutomationSurface → ScriptBridge
//!     → StreamingQueryProtocol → AnswerFlow → BatchTaskExecutor
//! ```
//!
//! 工单列表、提示词和结果保存由 `JobHost` 提供给执行器。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::browser;
use crate::config::Config;
use crate::infrastructure::{AutomationSurface, ChromiumBackend, ScriptBridge, SurfaceHandle};
use crate::models::{load_jobs, ExistingVariants, JobFile, WorkItem};
use crate::orchestrator::batch_processor::{BatchHost, BatchTaskExecutor};
use crate::services::{AnswerStore, BilingualAnswer, PromptBuilder, StreamingQueryProtocol};
use crate::utils::logging;
use crate::workflow::AnswerFlow;

/// 应用主结构
pub struct App {
    config: Config,
    surface: Arc<AutomationSurface>,
    host: Arc<JobHost>,
    executor: BatchTaskExecutor,
}

impl App {
    /// 初始化应用
    pub async fn initialize(mut config: Config) -> Result<Self> {
        // 初始化日志文件
        logging::init_log_file(&config.output_log_file)?;

        info!("\n📁 正在加载批量任务: {}", config.job_file);
        let job = load_jobs(&config.job_file).await?;
        apply_job_overrides(&mut config, &job);

        if config.notebook_id.is_empty() {
            anyhow::bail!("未配置笔记本 ID（NOTEBOOK_ID 或任务文件中的 notebook_id）");
        }

        logging::log_startup(&config);

        // 连接或启动浏览器
        let (browser, page) = if config.headless {
            browser::launch_headless_browser(config.chrome_executable.as_deref()).await?
        } else {
            browser::connect_to_browser_and_page(
                config.browser_debug_port,
                Some(&config.notebook_id),
            )
            .await?
        };

        let mut handle = SurfaceHandle::new(&config.notebook_id);
        if let Some(url) = &config.notebook_url {
            handle = handle.with_url(url);
        }

        let backend = Arc::new(ChromiumBackend::new(browser, page));
        let surface = Arc::new(AutomationSurface::new(
            backend,
            handle,
            config.timing.surface_settle,
        ));
        let bridge = Arc::new(ScriptBridge::new(
            surface.clone(),
            config.timing.script_reply_timeout,
        ));
        let protocol = Arc::new(StreamingQueryProtocol::new(bridge, config.timing.clone()));
        let flow = Arc::new(AnswerFlow::new(protocol, config.verbose_logging));

        let host = Arc::new(JobHost::new(&config, job));
        let executor = BatchTaskExecutor::new(flow, host.clone(), config.retry.clone());

        Ok(Self {
            config,
            surface,
            host,
            executor,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        let item_ids = self.host.select_all().await;
        if item_ids.is_empty() {
            warn!("⚠️ 任务文件中没有工单，程序结束");
            return Ok(());
        }

        let langs = self.config.target_langs.clone();
        let existing = self.host.existing_variants(&langs).await;
        logging::log_batch_start(item_ids.len(), &langs);

        if !self.config.headless {
            self.surface.show().await?;
        }

        // Ctrl+C 只设置中止信号，当前单元结束后停止
        let ctrl_c = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        let outcome = self
            .executor
            .run_batch_until(&item_ids, &langs, &existing, ctrl_c)
            .await?;

        logging::print_final_stats(
            outcome.succeeded(),
            outcome.skipped(),
            outcome.failed(),
            outcome.progress.total,
            outcome.aborted,
            &self.config.output_log_file,
        );
        logging::append_log_lines(&self.config.output_log_file, &self.executor.reporter().logs())?;

        Ok(())
    }
}

/// 用任务文件里的设置覆盖环境配置
fn apply_job_overrides(config: &mut Config, job: &JobFile) {
    if let Some(id) = job.notebook_id.as_ref().filter(|id| !id.is_empty()) {
        debug!("任务文件指定笔记本: {}", id);
        config.notebook_id = id.clone();
    }
    if let Some(langs) = job.target_langs.as_ref().filter(|l| !l.is_empty()) {
        config.target_langs = langs.clone();
    }
    if job.prompt_template.is_some() {
        config.prompt_template = job.prompt_template.clone();
    }
}

/// 命令行模式下的批量宿主：工单来自任务文件，回复写入输出目录
pub struct JobHost {
    job_path: String,
    items: RwLock<HashMap<String, WorkItem>>,
    order: RwLock<Vec<String>>,
    selected: Mutex<Vec<String>>,
    prompts: PromptBuilder,
    store: AnswerStore,
}

impl JobHost {
    pub fn new(config: &Config, job: JobFile) -> Self {
        let order = job.item_ids();
        let items = job.items.into_iter().map(|item| (item.id.clone(), item)).collect();
        Self {
            job_path: config.job_file.clone(),
            items: RwLock::new(items),
            order: RwLock::new(order),
            selected: Mutex::new(Vec::new()),
            prompts: PromptBuilder::new(config.prompt_template.clone()),
            store: AnswerStore::new(&config.output_dir),
        }
    }

    /// 选中全部工单，返回选中的 ID
    pub async fn select_all(&self) -> Vec<String> {
        let ids = self.order.read().await.clone();
        if let Ok(mut selected) = self.selected.lock() {
            *selected = ids.clone();
        }
        ids
    }

    /// 工单自带的语言版本加上输出目录中已有的回复
    pub async fn existing_variants(&self, langs: &[String]) -> ExistingVariants {
        let items = self.items.read().await;
        let mut existing = ExistingVariants::new();
        for item in items.values() {
            for lang in &item.available_langs {
                existing.insert(&item.id, lang);
            }
            for lang in langs {
                if self.store.exists(&item.id, lang) {
                    existing.insert(&item.id, lang);
                }
            }
        }
        existing
    }
}

#[async_trait]
impl BatchHost for JobHost {
    async fn build_prompt(&self, item_id: &str, lang: &str) -> Result<String> {
        let items = self.items.read().await;
        let item = items
            .get(item_id)
            .with_context(|| format!("工单 #{} 不在任务列表中", item_id))?;
        Ok(self.prompts.build_for_lang(item, lang))
    }

    async fn store_answer(&self, item_id: &str, lang: &str, answer: &BilingualAnswer) -> Result<()> {
        let path = self.store.write(item_id, lang, answer).await?;
        info!("💾 工单 #{} ({}) 已保存: {}", item_id, lang, path.display());
        Ok(())
    }

    async fn refresh_items(&self) -> Result<()> {
        let job = load_jobs(&self.job_path).await?;
        let order = job.item_ids();
        *self.items.write().await = job.items.into_iter().map(|item| (item.id.clone(), item)).collect();
        *self.order.write().await = order;
        debug!("工单列表已刷新");
        Ok(())
    }

    async fn clear_selection(&self) {
        if let Ok(mut selected) = self.selected.lock() {
            selected.clear();
        }
    }
}
