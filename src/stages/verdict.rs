//! 校验回复解析
//!
//! 只看回复的首个词：VALID 为通过，INVALID 为拒绝（其后的文字即原因）。
//! 大小写与前导空白、Markdown 强调符号可以容忍；出现在正文中间的 VALID 不算。

use thiserror::Error;

use crate::core::Verdict;

pub const ACCEPT_MARKER: &str = "VALID";
pub const REJECT_MARKER: &str = "INVALID";

const NO_REASON: &str = "rejected without a stated reason";

/// 回复既不以 VALID 也不以 INVALID 开头
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unrecognised validator reply: {reply}")]
pub struct VerdictParseError {
    pub reply: String,
}

fn is_decoration(c: char) -> bool {
    c.is_whitespace() || matches!(c, '*' | '_' | '`' | '#' | '"' | '\'' | '>')
}

/// 标记词只能在这些字符或结尾处终止，"VALID2"、"VALID-ish" 都不算
fn ends_token(c: char) -> bool {
    c.is_whitespace() || matches!(c, ':' | '.' | ',' | ';' | '*' | '`')
}

fn is_separator(c: char) -> bool {
    c.is_whitespace() || matches!(c, ':' | '-' | '–' | '—' | '.' | ',' | ';' | '*' | '_' | '`')
}

pub fn parse_verdict(reply: &str) -> Result<Verdict, VerdictParseError> {
    let body = reply.trim_start_matches(is_decoration);
    let token_end = body
        .find(ends_token)
        .unwrap_or(body.len());
    let (token, rest) = body.split_at(token_end);

    if token.eq_ignore_ascii_case(ACCEPT_MARKER) {
        Ok(Verdict::Accepted)
    } else if token.eq_ignore_ascii_case(REJECT_MARKER) {
        let reason = rest.trim_start_matches(is_separator).trim();
        Ok(Verdict::rejected(if reason.is_empty() { NO_REASON } else { reason }))
    } else {
        Err(VerdictParseError {
            reply: reply.trim().to_string(),
        })
    }
}

/// 解析失败时也不中断运行：记为一次带合成原因的拒绝
pub fn verdict_or_rejection(reply: &str) -> Verdict {
    parse_verdict(reply).unwrap_or_else(|e| {
        tracing::warn!("{}", e);
        Verdict::rejected(e.to_string())
    })
}
