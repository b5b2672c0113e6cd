//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `QNA__*` 覆盖（双下划线表示嵌套，如 `QNA__APP__MAX_ATTEMPTS=5`）。
//! 远端连接信息缺省时回退到 AZURE_OPENAI_ENDPOINT / AZURE_OPENAI_API_KEY / AZURE_OPENAI_MODEL_DEPLOYMENT。

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core::{AgentSpec, StageKind, DEFAULT_MAX_ATTEMPTS};
use crate::llm::foundry::DEFAULT_API_VERSION;
use crate::stages::load_instructions;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub remote: RemoteSection,
    pub agents: AgentsSection,
    pub links: LinksSection,
}

/// [app] 段：重试次数、反馈开关、上下文与字数限制
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
    #[serde(default = "default_true")]
    pub feed_back_rejections: bool,
    pub context: Option<String>,
    pub char_limit: Option<usize>,
}

fn default_max_attempts() -> usize {
    DEFAULT_MAX_ATTEMPTS
}

fn default_true() -> bool {
    true
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            feed_back_rejections: true,
            context: None,
            char_limit: None,
        }
    }
}

/// [remote] 段：后端（foundry / mock）、端点与轮询参数
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteSection {
    #[serde(default = "default_provider")]
    pub provider: String,
    pub endpoint: Option<String>,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
    /// 各阶段共用的模型部署名；阶段内的 model 优先
    pub model: Option<String>,
}

fn default_provider() -> String {
    "foundry".to_string()
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_run_timeout_secs() -> u64 {
    300
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            endpoint: None,
            api_version: default_api_version(),
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            run_timeout_secs: default_run_timeout_secs(),
            model: None,
        }
    }
}

impl RemoteSection {
    /// 用环境变量补齐未配置的 endpoint / api_key / model
    pub fn fill_from_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if self.endpoint.is_none() {
            self.endpoint = non_blank("AZURE_OPENAI_ENDPOINT");
        }
        if self.api_key.is_none() {
            self.api_key = non_blank("AZURE_OPENAI_API_KEY");
        }
        if self.model.is_none() {
            self.model = non_blank("AZURE_OPENAI_MODEL_DEPLOYMENT");
        }
    }
}

/// [agents.*] 段：单个阶段的 agent 创建参数
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AgentSection {
    pub model: Option<String>,
    pub name: Option<String>,
    pub instructions: Option<String>,
    pub tools: Option<Vec<Value>>,
    pub metadata: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AgentsSection {
    #[serde(default)]
    pub answerer: AgentSection,
    #[serde(default)]
    pub answer_checker: AgentSection,
    #[serde(default)]
    pub link_checker: AgentSection,
}

impl AgentsSection {
    pub fn for_stage(&self, stage: StageKind) -> &AgentSection {
        match stage {
            StageKind::Generation => &self.answerer,
            StageKind::AnswerCheck => &self.answer_checker,
            StageKind::LinkCheck => &self.link_checker,
        }
    }
}

/// [links] 段：链接校验策略
#[derive(Debug, Clone, Deserialize)]
pub struct LinksSection {
    #[serde(default)]
    pub require_links: bool,
    #[serde(default)]
    pub probe: bool,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

fn default_probe_timeout_secs() -> u64 {
    10
}

impl Default for LinksSection {
    fn default() -> Self {
        Self {
            require_links: false,
            probe: false,
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

/// 阶段的默认模型：生成用轻量模型，校验用更强的模型
fn default_stage_model(stage: StageKind) -> &'static str {
    match stage {
        StageKind::Generation => "gpt-4o-mini",
        StageKind::AnswerCheck | StageKind::LinkCheck => "gpt-4.1",
    }
}

impl AppConfig {
    /// 解析某阶段的 agent 参数：阶段段 > [remote].model > 内置默认
    pub fn agent_spec(&self, stage: StageKind) -> AgentSpec {
        let section = self.agents.for_stage(stage);
        let model = section
            .model
            .clone()
            .or_else(|| self.remote.model.clone())
            .unwrap_or_else(|| default_stage_model(stage).to_string());
        let name = section
            .name
            .clone()
            .unwrap_or_else(|| stage.agent_name().to_string());
        let instructions = section
            .instructions
            .clone()
            .unwrap_or_else(|| load_instructions(stage));

        let mut spec = AgentSpec::new(model, name).with_instructions(instructions);
        spec.tools = section.tools.clone();
        spec.metadata = section.metadata.clone();
        spec
    }
}

/// 从 config 目录加载配置，环境变量 QNA__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 叠加环境变量 QNA__*（双下划线表示嵌套键）
/// 4. 远端连接信息仍缺省时读取 AZURE_OPENAI_*
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
        } else {
            tracing::warn!("Config file {} not found, ignoring", path.display());
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("QNA")
            .separator("__")
            .try_parsing(true),
    );

    let mut cfg: AppConfig = builder.build()?.try_deserialize()?;
    cfg.remote.fill_from_env(|key| std::env::var(key).ok());
    Ok(cfg)
}
