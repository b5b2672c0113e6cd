//! 状态定义：Verdict、Attempt 与最终 RunOutcome
//!
//! 编排器每轮只保留最近一次候选答案与两个 Verdict；历史仅在开启反馈时以 AttemptFeedback 形式累积。

use std::fmt::Display;

use serde::Serialize;

/// 三个远程阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Generation,
    AnswerCheck,
    LinkCheck,
}

impl StageKind {
    /// 远程 agent 的默认名称
    pub fn agent_name(&self) -> &'static str {
        match self {
            StageKind::Generation => "question-answerer",
            StageKind::AnswerCheck => "answer-checker",
            StageKind::LinkCheck => "link-checker",
        }
    }
}

impl Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKind::Generation => write!(f, "question answerer"),
            StageKind::AnswerCheck => write!(f, "answer checker"),
            StageKind::LinkCheck => write!(f, "link checker"),
        }
    }
}

/// 校验结论：通过或拒绝（附原因）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", content = "reason", rename_all = "snake_case")]
pub enum Verdict {
    Accepted,
    Rejected(String),
}

impl Verdict {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Verdict::Accepted => None,
            Verdict::Rejected(reason) => Some(reason),
        }
    }
}

/// 拒绝来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionSource {
    AnswerCheck,
    LinkCheck,
    CharLimit,
}

impl Display for RejectionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionSource::AnswerCheck => write!(f, "Answer Checker"),
            RejectionSource::LinkCheck => write!(f, "Link Checker"),
            RejectionSource::CharLimit => write!(f, "Character Limit Check"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rejection {
    pub source: RejectionSource,
    pub reason: String,
}

impl Rejection {
    pub fn new(source: RejectionSource, reason: impl Into<String>) -> Self {
        Self {
            source,
            reason: reason.into(),
        }
    }
}

impl Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.source, self.reason)
    }
}

/// 生成阶段的产出：答案正文 + 回复注解里带回的引用 URL
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CandidateAnswer {
    pub text: String,
    pub citations: Vec<String>,
}

impl CandidateAnswer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            citations: Vec::new(),
        }
    }

    pub fn with_citations(mut self, citations: Vec<String>) -> Self {
        self.citations = citations;
        self
    }

    /// 去掉链接与引用角标后的正文
    pub fn clean_text(&self) -> String {
        crate::stages::strip_links(&self.text)
    }

    /// 字数限制按去掉链接后的正文计算
    pub fn char_count(&self) -> usize {
        self.clean_text().chars().count()
    }
}

/// 一轮 generate -> check answer -> check links 的结果
#[derive(Debug, Clone)]
pub struct Attempt {
    /// 从 1 开始
    pub number: usize,
    pub candidate: CandidateAnswer,
    pub answer_verdict: Verdict,
    pub link_verdict: Verdict,
    /// 本地字数检查的拒绝（未配置 char_limit 时恒为 None）
    pub limit_violation: Option<Rejection>,
}

impl Attempt {
    /// 两个校验器都通过且没有本地拒绝
    pub fn is_accepted(&self) -> bool {
        self.answer_verdict.is_accepted()
            && self.link_verdict.is_accepted()
            && self.limit_violation.is_none()
    }

    /// 本轮所有拒绝原因，顺序固定：answer、links、字数
    pub fn rejections(&self) -> Vec<Rejection> {
        let mut out = Vec::new();
        if let Some(reason) = self.answer_verdict.reason() {
            out.push(Rejection::new(RejectionSource::AnswerCheck, reason));
        }
        if let Some(reason) = self.link_verdict.reason() {
            out.push(Rejection::new(RejectionSource::LinkCheck, reason));
        }
        if let Some(r) = &self.limit_violation {
            out.push(r.clone());
        }
        out
    }
}

/// 整次运行的结果；Exhausted 是正常返回值，而不是错误
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Success {
        answer: CandidateAnswer,
        attempts_used: usize,
    },
    Exhausted {
        attempts_used: usize,
        reasons: Vec<Rejection>,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }

    pub fn attempts_used(&self) -> usize {
        match self {
            RunOutcome::Success { attempts_used, .. }
            | RunOutcome::Exhausted { attempts_used, .. } => *attempts_used,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(answer: Verdict, links: Verdict) -> Attempt {
        Attempt {
            number: 1,
            candidate: CandidateAnswer::new("text"),
            answer_verdict: answer,
            link_verdict: links,
            limit_violation: None,
        }
    }

    #[test]
    fn test_attempt_requires_both_verdicts() {
        assert!(attempt(Verdict::Accepted, Verdict::Accepted).is_accepted());
        assert!(!attempt(Verdict::rejected("x"), Verdict::Accepted).is_accepted());
        assert!(!attempt(Verdict::Accepted, Verdict::rejected("y")).is_accepted());
    }

    #[test]
    fn test_rejections_keep_both_reasons() {
        let a = attempt(Verdict::rejected("wrong"), Verdict::rejected("dead link"));
        let reasons = a.rejections();
        assert_eq!(reasons.len(), 2);
        assert_eq!(reasons[0].source, RejectionSource::AnswerCheck);
        assert_eq!(reasons[1].reason, "dead link");
    }

    #[test]
    fn test_limit_violation_fails_attempt() {
        let mut a = attempt(Verdict::Accepted, Verdict::Accepted);
        a.limit_violation = Some(Rejection::new(RejectionSource::CharLimit, "too long"));
        assert!(!a.is_accepted());
        assert_eq!(a.rejections().len(), 1);
    }

    #[test]
    fn test_char_count_ignores_links() {
        let answer = CandidateAnswer::new(
            "Sunlight scatters off air molecules. \
             https://en.wikipedia.org/wiki/Rayleigh_scattering",
        );
        assert_eq!(answer.clean_text(), "Sunlight scatters off air molecules.");
        assert_eq!(answer.char_count(), 36);
    }

    #[test]
    fn test_outcome_serializes_with_tag() {
        let outcome = RunOutcome::Exhausted {
            attempts_used: 3,
            reasons: vec![Rejection::new(RejectionSource::LinkCheck, "404")],
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "exhausted");
        assert_eq!(json["reasons"][0]["source"], "link_check");
    }
}
