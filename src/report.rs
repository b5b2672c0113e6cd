//! 结果输出：成功时在 stdout 打印最终答案，用尽重试时打印最后一轮的拒绝原因

use std::fmt::Write as _;

use crate::core::RunOutcome;

/// 成功
pub const EXIT_SUCCESS: u8 = 0;
/// 用尽重试次数
pub const EXIT_EXHAUSTED: u8 = 1;
/// 阶段调用失败、配置错误等
pub const EXIT_FAILURE: u8 = 2;

const BANNER: &str = "============================================================";

pub fn exit_code(outcome: &RunOutcome) -> u8 {
    match outcome {
        RunOutcome::Success { .. } => EXIT_SUCCESS,
        RunOutcome::Exhausted { .. } => EXIT_EXHAUSTED,
    }
}

/// 文本形式的结果
pub fn render(outcome: &RunOutcome) -> String {
    let mut out = String::new();
    match outcome {
        RunOutcome::Success {
            answer,
            attempts_used,
        } => {
            let _ = writeln!(out, "{}", BANNER);
            let _ = writeln!(out, "FINAL ANSWER (accepted after {} attempt(s))", attempts_used);
            let _ = writeln!(out, "{}", BANNER);
            let _ = writeln!(out, "{}", answer.text);
            if !answer.citations.is_empty() {
                let _ = writeln!(out, "\nSources:");
                for url in &answer.citations {
                    let _ = writeln!(out, "- {}", url);
                }
            }
            let _ = writeln!(out, "{}", BANNER);
        }
        RunOutcome::Exhausted {
            attempts_used,
            reasons,
        } => {
            let _ = writeln!(
                out,
                "Could not produce an acceptable answer after {} attempts.",
                attempts_used
            );
            if !reasons.is_empty() {
                let _ = writeln!(out, "Last rejection reasons:");
                for r in reasons {
                    let _ = writeln!(out, "- {}", r);
                }
            }
        }
    }
    out
}

/// 输出结果：成功写 stdout，失败写 stderr；json 模式下统一写 stdout
pub fn print_outcome(outcome: &RunOutcome, json: bool) -> serde_json::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(outcome)?);
        return Ok(());
    }
    match outcome {
        RunOutcome::Success { .. } => print!("{}", render(outcome)),
        RunOutcome::Exhausted { .. } => eprint!("{}", render(outcome)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CandidateAnswer, Rejection, RejectionSource};

    #[test]
    fn test_render_success() {
        let outcome = RunOutcome::Success {
            answer: CandidateAnswer::new("Rayleigh scattering.")
                .with_citations(vec!["https://www.nasa.gov/sky".into()]),
            attempts_used: 2,
        };
        let text = render(&outcome);
        assert!(text.contains("FINAL ANSWER (accepted after 2 attempt(s))"));
        assert!(text.contains("Rayleigh scattering."));
        assert!(text.contains("- https://www.nasa.gov/sky"));
        assert_eq!(exit_code(&outcome), EXIT_SUCCESS);
    }

    #[test]
    fn test_render_exhausted() {
        let outcome = RunOutcome::Exhausted {
            attempts_used: 10,
            reasons: vec![
                Rejection::new(RejectionSource::AnswerCheck, "inaccurate"),
                Rejection::new(RejectionSource::LinkCheck, "dead link"),
            ],
        };
        let text = render(&outcome);
        assert!(text.starts_with("Could not produce an acceptable answer after 10 attempts."));
        assert!(text.contains("- Answer Checker: inaccurate"));
        assert!(text.contains("- Link Checker: dead link"));
        assert_eq!(exit_code(&outcome), EXIT_EXHAUSTED);
    }

    #[test]
    fn test_json_shape() {
        let outcome = RunOutcome::Exhausted {
            attempts_used: 1,
            reasons: vec![Rejection::new(RejectionSource::CharLimit, "too long")],
        };
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["outcome"], "exhausted");
        assert_eq!(value["reasons"][0]["source"], "char_limit");
    }
}
