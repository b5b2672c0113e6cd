//! 答案生成阶段
//!
//! 拼接 Context / Question / 历次拒绝反馈 / 字数要求为一条消息，交给 question-answerer agent；
//! 回复正文即候选答案，回复注解中的 url_citation 作为引用一并带回。

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{AgentSpec, CandidateAnswer, QnaError, StageKind};
use crate::llm::AgentsApi;
use crate::stages::links::is_search_api_url;
use crate::stages::{exchange, preview, AnswerGenerator, GenerationRequest};

/// 反馈中每个历史答案的最大展示字符数
const FEEDBACK_ANSWER_PREVIEW_CHARS: usize = 500;

pub struct QuestionAnswerer {
    api: Arc<dyn AgentsApi>,
    spec: AgentSpec,
}

impl QuestionAnswerer {
    pub fn new(api: Arc<dyn AgentsApi>, spec: AgentSpec) -> Self {
        Self { api, spec }
    }

    pub fn build_prompt(request: &GenerationRequest<'_>) -> String {
        let mut prompt = String::new();
        if let Some(context) = request.context.filter(|c| !c.trim().is_empty()) {
            let _ = write!(prompt, "Context: {}\n\n", context.trim());
        }
        let _ = write!(prompt, "Question: {}\n\n", request.question.trim());

        if !request.feedback.is_empty() {
            prompt.push_str("PREVIOUS ATTEMPTS AND FEEDBACK:\n");
            for fb in request.feedback {
                let _ = writeln!(prompt, "\nAttempt {}:", fb.attempt);
                let _ = writeln!(
                    prompt,
                    "Previous Answer: {}",
                    preview(&fb.answer, FEEDBACK_ANSWER_PREVIEW_CHARS)
                );
                for r in &fb.rejections {
                    let _ = writeln!(prompt, "Rejected by {}: {}", r.source, r.reason);
                }
            }
            prompt.push_str(
                "\nBased on the above feedback, generate an improved answer \
                 that addresses the identified issues.\n\n",
            );
        }

        prompt.push_str(
            "Please provide a comprehensive answer with supporting evidence and citations.",
        );
        if let Some(limit) = request.char_limit {
            let _ = write!(prompt, " Keep it under {} characters.", limit);
        }
        prompt
    }
}

#[async_trait]
impl AnswerGenerator for QuestionAnswerer {
    async fn generate_answer(
        &self,
        request: &GenerationRequest<'_>,
    ) -> Result<CandidateAnswer, QnaError> {
        tracing::info!("Question Answerer: generating answer");
        let prompt = Self::build_prompt(request);
        let reply = exchange(&self.api, &self.spec, StageKind::Generation, prompt)
            .await?
            .ok_or_else(|| {
                QnaError::stage_call(StageKind::Generation, "no text reply from agent")
            })?;

        let text = reply.value.trim();
        if text.is_empty() {
            return Err(QnaError::stage_call(
                StageKind::Generation,
                "agent returned an empty answer",
            ));
        }

        let citations: Vec<String> = reply
            .citation_urls()
            .into_iter()
            .filter(|u| !is_search_api_url(u))
            .collect();
        tracing::debug!(
            "Generated candidate ({} chars, {} citations): {}",
            text.chars().count(),
            citations.len(),
            preview(text, 200)
        );
        Ok(CandidateAnswer::new(text).with_citations(citations))
    }
}
