//! 编排器：重试循环
//!
//! 每轮按固定顺序 generate -> check answer -> check links，两个校验器每轮都会执行；
//! 二者都通过即成功，否则进入下一轮，直到用完 max_attempts。
//! 生成或校验阶段的调用失败（而非拒绝）直接向上传播，不消耗重试次数。

use std::sync::Arc;
use std::time::Duration;

use crate::config::AppConfig;
use crate::core::{
    Attempt, CandidateAnswer, QnaError, Rejection, RejectionSource, RunOutcome, StageKind,
};
use crate::llm::{AgentsApi, FoundryClient, MockAgentsApi};
use crate::stages::{
    AnswerChecker, AnswerGenerator, AnswerValidator, AttemptFeedback, GenerationRequest,
    LinkChecker, LinkPolicy, LinkProbe, LinkValidator, QuestionAnswerer,
};

/// 默认最大轮数
pub const DEFAULT_MAX_ATTEMPTS: usize = 10;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_attempts: usize,
    /// 是否把上一轮的拒绝原因带入下一轮生成
    pub feed_back_rejections: bool,
    pub char_limit: Option<usize>,
    pub context: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            feed_back_rejections: true,
            char_limit: None,
            context: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_app(cfg: &AppConfig) -> Self {
        Self {
            max_attempts: cfg.app.max_attempts,
            feed_back_rejections: cfg.app.feed_back_rejections,
            char_limit: cfg.app.char_limit,
            context: cfg.app.context.clone(),
        }
    }
}

pub struct Orchestrator<G, A, L> {
    generator: G,
    answer_checker: A,
    link_checker: L,
    config: OrchestratorConfig,
}

/// 使用远端 agent 的三个阶段组成的编排器
pub type AgentOrchestrator = Orchestrator<QuestionAnswerer, AnswerChecker, LinkChecker>;

impl<G, A, L> Orchestrator<G, A, L>
where
    G: AnswerGenerator,
    A: AnswerValidator,
    L: LinkValidator,
{
    pub fn new(generator: G, answer_checker: A, link_checker: L) -> Self {
        Self {
            generator,
            answer_checker,
            link_checker,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// 回答一个问题；Exhausted 作为正常结果返回，只有阶段调用失败才返回 Err
    pub async fn answer_question(&self, question: &str) -> Result<RunOutcome, QnaError> {
        self.answer_with_context(question, self.config.context.as_deref())
            .await
    }

    /// 同 answer_question，但使用给定的上下文（批处理时每行各自的 context）
    pub async fn answer_with_context(
        &self,
        question: &str,
        context: Option<&str>,
    ) -> Result<RunOutcome, QnaError> {
        let max = self.config.max_attempts;
        let mut feedback: Vec<AttemptFeedback> = Vec::new();
        let mut last_reasons: Vec<Rejection> = Vec::new();

        for number in 1..=max {
            tracing::info!("Attempt {}/{}", number, max);

            let request = GenerationRequest {
                question,
                context,
                char_limit: self.config.char_limit,
                feedback: &feedback,
            };
            let candidate = self
                .generator
                .generate_answer(&request)
                .await
                .map_err(|e| abort(number, e))?;

            let answer_verdict = self
                .answer_checker
                .validate_answer(question, &candidate)
                .await
                .map_err(|e| abort(number, e))?;
            let link_verdict = self
                .link_checker
                .validate_links(&candidate)
                .await
                .map_err(|e| abort(number, e))?;

            let limit_violation = self.check_char_limit(&candidate);
            let attempt = Attempt {
                number,
                candidate,
                answer_verdict,
                link_verdict,
                limit_violation,
            };

            if attempt.is_accepted() {
                tracing::info!("Answer accepted on attempt {}", number);
                return Ok(RunOutcome::Success {
                    answer: attempt.candidate,
                    attempts_used: number,
                });
            }

            let rejections = attempt.rejections();
            for r in &rejections {
                tracing::warn!("Attempt {} rejected by {}: {}", number, r.source, r.reason);
            }
            if self.config.feed_back_rejections {
                feedback.push(AttemptFeedback {
                    attempt: number,
                    answer: attempt.candidate.text.clone(),
                    rejections: rejections.clone(),
                });
            }
            last_reasons = rejections;
        }

        tracing::warn!("No acceptable answer after {} attempts", max);
        Ok(RunOutcome::Exhausted {
            attempts_used: max,
            reasons: last_reasons,
        })
    }

    fn check_char_limit(&self, candidate: &CandidateAnswer) -> Option<Rejection> {
        let limit = self.config.char_limit?;
        let count = candidate.char_count();
        (count > limit).then(|| {
            Rejection::new(
                RejectionSource::CharLimit,
                format!("answer is {} characters, limit is {}", count, limit),
            )
        })
    }
}

fn abort(number: usize, e: QnaError) -> QnaError {
    tracing::error!("Attempt {} aborted: {}", number, e);
    e
}

/// 根据 [remote] 段选择远端实现（Foundry HTTP / 离线 Mock）
pub fn create_api_from_config(cfg: &AppConfig) -> Result<Arc<dyn AgentsApi>, QnaError> {
    let remote = &cfg.remote;
    match remote.provider.to_lowercase().as_str() {
        "mock" => {
            tracing::warn!("Using offline mock agents");
            Ok(Arc::new(MockAgentsApi::offline()))
        }
        "foundry" | "azure" => {
            let endpoint = remote.endpoint.as_deref().ok_or_else(|| {
                QnaError::Config(
                    "remote endpoint is not set (remote.endpoint or AZURE_OPENAI_ENDPOINT)".into(),
                )
            })?;
            let client = FoundryClient::new(
                endpoint,
                remote.api_key.as_deref(),
                Duration::from_secs(remote.request_timeout_secs),
            )
            .map_err(|e| QnaError::Config(e.to_string()))?
            .with_api_version(&remote.api_version)
            .with_polling(
                Duration::from_millis(remote.poll_interval_ms),
                Duration::from_secs(remote.run_timeout_secs),
            );
            tracing::info!("Using Foundry agents at {}", endpoint);
            Ok(Arc::new(client))
        }
        other => Err(QnaError::Config(format!("unknown remote provider: {}", other))),
    }
}

/// 由配置装配三个阶段与编排器
pub fn create_orchestrator(cfg: &AppConfig) -> Result<AgentOrchestrator, QnaError> {
    if cfg.app.max_attempts == 0 {
        return Err(QnaError::Config("max_attempts must be at least 1".into()));
    }
    let api = create_api_from_config(cfg)?;
    Ok(orchestrator_with_api(cfg, api))
}

/// 用给定的远端实现装配编排器（测试中注入 Mock）
pub fn orchestrator_with_api(cfg: &AppConfig, api: Arc<dyn AgentsApi>) -> AgentOrchestrator {
    let policy = LinkPolicy {
        require_links: cfg.links.require_links,
        probe: cfg
            .links
            .probe
            .then(|| LinkProbe::new(cfg.links.probe_timeout_secs)),
    };
    Orchestrator::new(
        QuestionAnswerer::new(api.clone(), cfg.agent_spec(StageKind::Generation)),
        AnswerChecker::new(api.clone(), cfg.agent_spec(StageKind::AnswerCheck)),
        LinkChecker::new(api, cfg.agent_spec(StageKind::LinkCheck)).with_policy(policy),
    )
    .with_config(OrchestratorConfig::from_app(cfg))
}
