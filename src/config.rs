//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `TICKET__*` 覆盖（双下划线表示嵌套，如 `TICKET__LLM__PROVIDER=openai`）。

use std::path::PathBuf;

use serde::Deserialize;

use crate::tools::{ActionPolicy, DecisionKind};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
    pub review: ReviewSection,
    pub storage: StorageSection,
}

/// [app] 段：应用名、历史窗口、步数上限、system prompt
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 送入推理引擎的最近记录条数；0 表示全部
    pub history_window_turns: usize,
    /// 单次调用内最多推理次数
    pub max_steps: usize,
    pub system_prompt: Option<String>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            history_window_turns: 4,
            max_steps: crate::core::DEFAULT_MAX_STEPS,
            system_prompt: None,
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai / mock；openai 但没有 OPENAI_API_KEY 时回退 mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [tools] 段：动作超时与外部程序动作
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次动作调用超时（秒）
    pub tool_timeout_secs: u64,
    pub plugins: Vec<PluginEntry>,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            plugins: Vec::new(),
        }
    }
}

/// [[tools.plugins]]：一个外部程序动作。args 中的 `{{key}}` 在调用时替换为参数值
#[derive(Debug, Clone, Deserialize)]
pub struct PluginEntry {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub requires_review: bool,
    /// 为空时允许全部决策
    #[serde(default)]
    pub allowed_decisions: Vec<DecisionKind>,
}

impl PluginEntry {
    pub fn policy(&self) -> ActionPolicy {
        policy_from(self.requires_review, &self.allowed_decisions)
    }
}

/// [review] 段：挂起描述前缀与审批策略覆盖
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReviewSection {
    pub description_prefix: String,
    pub policies: Vec<PolicyEntry>,
}

impl Default for ReviewSection {
    fn default() -> Self {
        Self {
            description_prefix: crate::core::DEFAULT_DESCRIPTION_PREFIX.to_string(),
            policies: Vec::new(),
        }
    }
}

/// [[review.policies]]：覆盖某个动作的审批策略
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyEntry {
    pub action: String,
    #[serde(default = "default_requires_review")]
    pub requires_review: bool,
    #[serde(default)]
    pub allowed_decisions: Vec<DecisionKind>,
}

fn default_requires_review() -> bool {
    true
}

impl PolicyEntry {
    pub fn policy(&self) -> ActionPolicy {
        policy_from(self.requires_review, &self.allowed_decisions)
    }
}

fn policy_from(requires_review: bool, allowed: &[DecisionKind]) -> ActionPolicy {
    match (requires_review, allowed.is_empty()) {
        (false, _) => ActionPolicy::auto(),
        (true, true) => ActionPolicy::review(),
        (true, false) => ActionPolicy::review_with(allowed.iter().copied()),
    }
}

/// [storage] 段：检查点与长期记忆存放位置
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// memory / file / sqlite（sqlite 需要 async-sqlite feature）
    pub backend: String,
    pub path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            backend: "memory".to_string(),
            path: PathBuf::from("data/checkpoints"),
        }
    }
}

/// 从 config 目录加载配置，环境变量 TICKET__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 TICKET__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("TICKET")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
