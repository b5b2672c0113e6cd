//! 阶段适配层：生成答案、校验答案、校验链接
//!
//! 每次调用都在一个独立的 AgentSession 内完成：写入一条消息、触发一次 run、取第一条文本回复。

pub mod answer_checker;
pub mod answerer;
pub mod link_checker;
pub mod links;
pub mod prompts;
pub mod verdict;

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{
    AgentSession, AgentSpec, CandidateAnswer, QnaError, Rejection, StageKind, Verdict,
};
use crate::llm::{first_text_reply, AgentsApi, RunStatus, TextContent};

pub use answer_checker::AnswerChecker;
pub use answerer::QuestionAnswerer;
pub use link_checker::{LinkChecker, LinkPolicy};
pub use links::{collect_links, extract_urls, strip_links, LinkProbe, ProbeResult};
pub use prompts::{builtin_instructions, load_instructions};
pub use verdict::{parse_verdict, verdict_or_rejection, VerdictParseError};

/// 上一轮被拒答案的摘要，用于下一轮生成
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptFeedback {
    pub attempt: usize,
    /// 被拒的完整答案；写入提示词时才截断
    pub answer: String,
    pub rejections: Vec<Rejection>,
}

/// 生成阶段的输入
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'a> {
    pub question: &'a str,
    pub context: Option<&'a str>,
    pub char_limit: Option<usize>,
    /// 之前各轮的拒绝反馈；关闭反馈时为空
    pub feedback: &'a [AttemptFeedback],
}

impl<'a> GenerationRequest<'a> {
    pub fn new(question: &'a str) -> Self {
        Self {
            question,
            context: None,
            char_limit: None,
            feedback: &[],
        }
    }
}

/// 生成候选答案；总是返回非空答案，否则报错
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    async fn generate_answer(
        &self,
        request: &GenerationRequest<'_>,
    ) -> Result<CandidateAnswer, QnaError>;
}

#[async_trait]
pub trait AnswerValidator: Send + Sync {
    async fn validate_answer(
        &self,
        question: &str,
        candidate: &CandidateAnswer,
    ) -> Result<Verdict, QnaError>;
}

#[async_trait]
pub trait LinkValidator: Send + Sync {
    async fn validate_links(&self, candidate: &CandidateAnswer) -> Result<Verdict, QnaError>;
}

/// 在一个新会话中完成一次「发消息 -> run -> 取回复」；没有文本回复时返回 None
pub(crate) async fn exchange(
    api: &Arc<dyn AgentsApi>,
    spec: &AgentSpec,
    stage: StageKind,
    prompt: String,
) -> Result<Option<TextContent>, QnaError> {
    let mut session = AgentSession::new(api.clone(), spec.clone());
    let remote = api.clone();
    session
        .run(|handles| async move {
            remote
                .post_message(&handles.thread, &prompt)
                .await
                .map_err(|e| QnaError::stage_call(stage, e))?;

            let run = remote
                .create_and_process_run(&handles.thread, &handles.agent)
                .await
                .map_err(|e| QnaError::stage_call(stage, e))?;
            tracing::debug!("{} run {} finished: {:?}", stage, run.id, run.status);
            if run.status != RunStatus::Completed {
                return Err(QnaError::stage_call(stage, run.failure_summary()));
            }

            let messages = remote
                .list_messages(&handles.thread)
                .await
                .map_err(|e| QnaError::stage_call(stage, e))?;
            Ok(first_text_reply(&messages).cloned())
        })
        .await
}

/// 截断到 max_chars 个字符，超出时追加 ...
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}
