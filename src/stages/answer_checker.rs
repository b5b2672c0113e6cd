//! 答案校验阶段
//!
//! 把问题与候选答案交给 answer-checker agent，回复按 VALID / INVALID 标记解析。
//! 回复缺失或格式不符时记为一次拒绝（消耗一轮），而不是中断运行。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{AgentSpec, CandidateAnswer, QnaError, StageKind, Verdict};
use crate::llm::AgentsApi;
use crate::stages::{exchange, verdict_or_rejection, AnswerValidator};

pub struct AnswerChecker {
    api: Arc<dyn AgentsApi>,
    spec: AgentSpec,
}

impl AnswerChecker {
    pub fn new(api: Arc<dyn AgentsApi>, spec: AgentSpec) -> Self {
        Self { api, spec }
    }

    pub fn build_prompt(question: &str, answer: &str) -> String {
        format!(
            "Please validate this answer to the given question.\n\n\
             QUESTION: {question}\n\n\
             ANSWER: {answer}\n\n\
             Check factual accuracy (use web search to verify claims), completeness and relevance, \
             presence of source citations, third-person voice, \
             and absence of follow-up questions or offers.\n\n\
             Respond with either 'VALID' or 'INVALID: [specific reasons]'"
        )
    }
}

#[async_trait]
impl AnswerValidator for AnswerChecker {
    async fn validate_answer(
        &self,
        question: &str,
        candidate: &CandidateAnswer,
    ) -> Result<Verdict, QnaError> {
        tracing::info!("Answer Checker: validating answer");
        let prompt = Self::build_prompt(question, &candidate.text);
        let reply = exchange(&self.api, &self.spec, StageKind::AnswerCheck, prompt).await?;
        let text = reply.map(|r| r.value).unwrap_or_default();
        let verdict = verdict_or_rejection(&text);
        match &verdict {
            Verdict::Accepted => tracing::info!("Answer Checker approved the answer"),
            Verdict::Rejected(reason) => tracing::warn!("Answer Checker rejected: {}", reason),
        }
        Ok(verdict)
    }
}
