//! 链接校验阶段
//!
//! 答案中没有链接时直接通过（除非 require_links），不开会话；
//! 开启探测时先 HEAD 一遍，只把可达的链接交给 link-checker agent 判断相关性。

use std::fmt::Write as _;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::{AgentSpec, CandidateAnswer, QnaError, StageKind, Verdict};
use crate::llm::AgentsApi;
use crate::stages::links::{collect_links, LinkProbe};
use crate::stages::{exchange, preview, verdict_or_rejection, LinkValidator};

const ANSWER_PREVIEW_CHARS: usize = 1000;

/// 链接校验策略
#[derive(Default)]
pub struct LinkPolicy {
    /// 答案必须带至少一个链接
    pub require_links: bool,
    /// 为 None 时不做 HEAD 探测
    pub probe: Option<LinkProbe>,
}

pub struct LinkChecker {
    api: Arc<dyn AgentsApi>,
    spec: AgentSpec,
    policy: LinkPolicy,
}

impl LinkChecker {
    pub fn new(api: Arc<dyn AgentsApi>, spec: AgentSpec) -> Self {
        Self {
            api,
            spec,
            policy: LinkPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: LinkPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn build_prompt(urls: &[String], answer: &str) -> String {
        let mut prompt =
            String::from("Please validate the following URLs found in this answer:\n\n");
        for url in urls {
            let _ = writeln!(prompt, "- {}", url);
        }
        let _ = write!(
            prompt,
            "\nANSWER (for relevance context): {}\n\n\
             For each URL check that it is reachable, relevant to the answer \
             and from a credible source.\n\n\
             Respond with either 'VALID' or 'INVALID: [specific issues]'",
            preview(answer, ANSWER_PREVIEW_CHARS)
        );
        prompt
    }
}

#[async_trait]
impl LinkValidator for LinkChecker {
    async fn validate_links(&self, candidate: &CandidateAnswer) -> Result<Verdict, QnaError> {
        let mut urls = collect_links(&candidate.citations, &candidate.text);
        tracing::info!("Link Checker: {} link(s) found", urls.len());

        if urls.is_empty() {
            return Ok(if self.policy.require_links {
                Verdict::rejected("the answer contains no source links")
            } else {
                Verdict::Accepted
            });
        }

        if let Some(probe) = &self.policy.probe {
            let results = probe.probe(&urls).await;
            if !results.iter().any(|r| r.is_reachable()) {
                let details: Vec<String> = results.iter().map(|r| r.describe()).collect();
                return Ok(Verdict::rejected(format!(
                    "no reachable links: {}",
                    details.join("; ")
                )));
            }
            urls = results
                .into_iter()
                .filter(|r| r.is_reachable())
                .map(|r| r.url)
                .collect();
        }

        let prompt = Self::build_prompt(&urls, &candidate.text);
        let reply = exchange(&self.api, &self.spec, StageKind::LinkCheck, prompt).await?;
        let text = reply.map(|r| r.value).unwrap_or_default();
        let verdict = verdict_or_rejection(&text);
        match &verdict {
            Verdict::Accepted => tracing::info!("Link Checker approved the links"),
            Verdict::Rejected(reason) => tracing::warn!("Link Checker rejected: {}", reason),
        }
        Ok(verdict)
    }
}
