use std::time::Duration;

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// NotebookLM 笔记本 ID
    pub notebook_id: String,
    /// 笔记本完整 URL（为空时由 ID 拼接）
    pub notebook_url: Option<String>,
    /// 浏览器调试端口
    pub browser_debug_port: u16,
    /// 是否启动无头浏览器（否则连接已打开的浏览器）
    pub headless: bool,
    /// 无头模式下的浏览器可执行文件
    pub chrome_executable: Option<String>,
    /// 批量任务文件（TOML）
    pub job_file: String,
    /// 回复结果输出目录
    pub output_dir: String,
    /// 目标语言列表，按顺序处理
    pub target_langs: Vec<String>,
    /// 提问模板，`${工单内容}` 会被替换为工单上下文
    pub prompt_template: Option<String>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    /// 查询时序
    pub timing: QueryTiming,
    /// 重试策略
    pub retry: RetryPolicy,
}

/// 查询协议的时序参数
#[derive(Clone, Debug)]
pub struct QueryTiming {
    /// 打开窗口后等待页面脚本初始化的时间
    pub surface_settle: Duration,
    /// 清除历史的最大轮数
    pub clear_max_cycles: u32,
    /// 每次删除对话后等待页面稳定的时间
    pub clear_settle: Duration,
    /// 填写输入框后、点击发送前的等待
    pub submit_settle: Duration,
    /// 轮询间隔
    pub poll_interval: Duration,
    /// 硬超时（轮询周期数）
    pub hard_timeout_cycles: u32,
    /// 软超时：出现合法快照后最多再等的周期数
    pub soft_timeout_cycles: u32,
    /// 单个脚本等待回传事件的时间
    pub script_reply_timeout: Duration,
}

impl Default for QueryTiming {
    fn default() -> Self {
        Self {
            surface_settle: Duration::from_secs(2),
            clear_max_cycles: 3,
            clear_settle: Duration::from_millis(1500),
            submit_settle: Duration::from_millis(500),
            poll_interval: Duration::from_millis(500),
            hard_timeout_cycles: 360,
            soft_timeout_cycles: 10,
            script_reply_timeout: Duration::from_secs(5),
        }
    }
}

/// 批量单元的重试策略
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// 每个单元最多尝试次数
    pub max_attempts: u32,
    /// 两次失败之间的等待
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            notebook_id: String::new(),
            notebook_url: None,
            browser_debug_port: 9222,
            headless: false,
            chrome_executable: None,
            job_file: "jobs.toml".to_string(),
            output_dir: "output_replies".to_string(),
            target_langs: vec!["en".to_string(), "cn".to_string()],
            prompt_template: None,
            verbose_logging: false,
            output_log_file: "output.txt".to_string(),
            timing: QueryTiming::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        let timing = QueryTiming {
            poll_interval: env_parse::<u64>("POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.timing.poll_interval),
            hard_timeout_cycles: env_parse("HARD_TIMEOUT_CYCLES").unwrap_or(default.timing.hard_timeout_cycles),
            soft_timeout_cycles: env_parse("SOFT_TIMEOUT_CYCLES").unwrap_or(default.timing.soft_timeout_cycles),
            ..default.timing.clone()
        };
        let retry = RetryPolicy {
            max_attempts: env_parse("MAX_ATTEMPTS").unwrap_or(default.retry.max_attempts),
            retry_delay: env_parse::<u64>("RETRY_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.retry.retry_delay),
        };

        Self {
            notebook_id: std::env::var("NOTEBOOK_ID").unwrap_or(default.notebook_id),
            notebook_url: std::env::var("NOTEBOOK_URL").ok().filter(|v| !v.is_empty()),
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT").unwrap_or(default.browser_debug_port),
            headless: env_parse("HEADLESS").unwrap_or(default.headless),
            chrome_executable: std::env::var("CHROME_EXECUTABLE").ok().filter(|v| !v.is_empty()),
            job_file: std::env::var("JOB_FILE").unwrap_or(default.job_file),
            output_dir: std::env::var("OUTPUT_DIR").unwrap_or(default.output_dir),
            target_langs: std::env::var("TARGET_LANGS")
                .ok()
                .map(|v| parse_lang_list(&v))
                .filter(|langs| !langs.is_empty())
                .unwrap_or(default.target_langs),
            prompt_template: std::env::var("PROMPT_TEMPLATE").ok().filter(|v| !v.is_empty()),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
            output_log_file: std::env::var("OUTPUT_LOG_FILE").unwrap_or(default.output_log_file),
            timing,
            retry,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

/// 解析逗号分隔的语言列表，例如 `en, cn`
pub fn parse_lang_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
