//! 批量问答：从 JSON Lines 文件逐行读取问题，依次回答
//!
//! 每行形如 `{"question": "...", "context": "..."}`，context 可省略（省略时用配置里的上下文）。
//! 每答完一行立即写出一条结果并 flush，中途中断时已完成的结果不会丢失。
//! 单行失败只记录在该行结果里，不影响后续行。

use std::io::{BufRead, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{Orchestrator, QnaError, Rejection, RunOutcome};
use crate::report::{EXIT_EXHAUSTED, EXIT_FAILURE, EXIT_SUCCESS};
use crate::stages::{AnswerGenerator, AnswerValidator, LinkValidator};

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("line {line}: invalid batch item: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode result: {0}")]
    Encode(#[from] serde_json::Error),
}

/// 输入文件中的一行
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BatchItem {
    pub question: String,
    #[serde(default)]
    pub context: Option<String>,
}

/// 一行的处理结果
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RowResult {
    Success {
        answer: String,
        citations: Vec<String>,
        attempts_used: usize,
    },
    Exhausted {
        attempts_used: usize,
        reasons: Vec<Rejection>,
    },
    Failed {
        error: String,
    },
}

impl From<Result<RunOutcome, QnaError>> for RowResult {
    fn from(result: Result<RunOutcome, QnaError>) -> Self {
        match result {
            Ok(RunOutcome::Success {
                answer,
                attempts_used,
            }) => RowResult::Success {
                answer: answer.text,
                citations: answer.citations,
                attempts_used,
            },
            Ok(RunOutcome::Exhausted {
                attempts_used,
                reasons,
            }) => RowResult::Exhausted {
                attempts_used,
                reasons,
            },
            Err(e) => RowResult::Failed {
                error: e.to_string(),
            },
        }
    }
}

/// 写入输出文件的一条记录；line 为输入文件中的行号（从 1 开始）
#[derive(Debug, Clone, Serialize)]
pub struct BatchRecord {
    pub line: usize,
    pub question: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(flatten)]
    pub result: RowResult,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub exhausted: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.succeeded + self.exhausted + self.failed
    }

    /// 有失败行为 2，否则有用尽重试的行为 1，全部成功为 0
    pub fn exit_code(&self) -> u8 {
        if self.failed > 0 {
            EXIT_FAILURE
        } else if self.exhausted > 0 {
            EXIT_EXHAUSTED
        } else {
            EXIT_SUCCESS
        }
    }

    fn record(&mut self, result: &RowResult) {
        match result {
            RowResult::Success { .. } => self.succeeded += 1,
            RowResult::Exhausted { .. } => self.exhausted += 1,
            RowResult::Failed { .. } => self.failed += 1,
        }
    }
}

/// 读取并校验全部输入行；空行与空问题跳过，任一行格式错误则整体报错
pub fn read_items<R: BufRead>(reader: R) -> Result<Vec<(usize, BatchItem)>, BatchError> {
    let mut items = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line_no = idx + 1;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let mut item: BatchItem =
            serde_json::from_str(&line).map_err(|source| BatchError::Parse {
                line: line_no,
                source,
            })?;
        if item.question.trim().is_empty() {
            tracing::warn!("Skipping line {}: empty question", line_no);
            continue;
        }
        item.question = item.question.trim().to_string();
        item.context = item.context.filter(|c| !c.trim().is_empty());
        items.push((line_no, item));
    }
    Ok(items)
}

/// 逐行回答并写出结果
pub async fn run_batch<G, A, L, W>(
    orchestrator: &Orchestrator<G, A, L>,
    items: &[(usize, BatchItem)],
    out: &mut W,
) -> Result<BatchSummary, BatchError>
where
    G: AnswerGenerator,
    A: AnswerValidator,
    L: LinkValidator,
    W: Write,
{
    let mut summary = BatchSummary::default();
    for (n, (line, item)) in items.iter().enumerate() {
        tracing::info!(
            "Batch question {}/{} (line {}): {}",
            n + 1,
            items.len(),
            line,
            item.question
        );
        let result = match item.context.as_deref() {
            Some(context) => {
                orchestrator
                    .answer_with_context(&item.question, Some(context))
                    .await
            }
            None => orchestrator.answer_question(&item.question).await,
        };
        if let Err(e) = &result {
            tracing::error!("Line {} failed: {}", line, e);
        }

        let record = BatchRecord {
            line: *line,
            question: item.question.clone(),
            context: item.context.clone(),
            result: RowResult::from(result),
        };
        summary.record(&record.result);
        serde_json::to_writer(&mut *out, &record)?;
        writeln!(out)?;
        out.flush()?;
    }
    tracing::info!(
        "Batch finished: {}/{} answered, {} exhausted, {} failed",
        summary.succeeded,
        summary.total(),
        summary.exhausted,
        summary.failed
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;

    use serde_json::Value;

    use crate::config::AppConfig;
    use crate::core::orchestrator_with_api;
    use crate::llm::{AgentsApi, CallKind, MockAgentsApi};

    fn config(max_attempts: usize) -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.remote.provider = "mock".into();
        cfg.app.max_attempts = max_attempts;
        cfg.app.context = Some("General knowledge".into());
        cfg
    }

    fn output_lines(out: Vec<u8>) -> Vec<Value> {
        String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_read_items_skips_blank_rows() {
        let input = "{\"question\": \"Why is the sky blue?\"}\n\
                     \n\
                     {\"question\": \"   \"}\n\
                     {\"question\": \" What is Azure? \", \"context\": \"Microsoft Azure AI\"}\n";
        let items = read_items(Cursor::new(input)).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].0, 1);
        assert_eq!(items[0].1.context, None);
        assert_eq!(items[1].0, 4);
        assert_eq!(items[1].1.question, "What is Azure?");
        assert_eq!(items[1].1.context.as_deref(), Some("Microsoft Azure AI"));
    }

    #[test]
    fn test_read_items_reports_bad_line() {
        let input = "{\"question\": \"Q1\"}\nnot json\n";
        match read_items(Cursor::new(input)) {
            Err(BatchError::Parse { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_batch_answers_every_row_with_row_context() {
        let mock = Arc::new(
            MockAgentsApi::new()
                .with_replies(
                    "question-answerer",
                    ["Rayleigh scattering.", "Azure is a cloud platform."],
                )
                .with_default_reply("answer-checker", "VALID"),
        );
        let api: Arc<dyn AgentsApi> = mock.clone();
        let orch = orchestrator_with_api(&config(2), api);
        let items = read_items(Cursor::new(
            "{\"question\": \"Why is the sky blue?\"}\n\
             {\"question\": \"What is Azure?\", \"context\": \"Microsoft Azure AI\"}\n",
        ))
        .unwrap();

        let mut out = Vec::new();
        let summary = run_batch(&orch, &items, &mut out).await.unwrap();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.exit_code(), EXIT_SUCCESS);

        let records = output_lines(out);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["line"], 1);
        assert_eq!(records[0]["outcome"], "success");
        assert_eq!(records[0]["answer"], "Rayleigh scattering.");
        assert!(records[0].get("context").is_none());
        assert_eq!(records[1]["context"], "Microsoft Azure AI");

        // 行内 context 优先于配置里的上下文
        let prompts = mock.prompts_for("question-answerer");
        assert!(prompts[0].starts_with("Context: General knowledge"));
        assert!(prompts[1].starts_with("Context: Microsoft Azure AI"));
    }

    #[tokio::test]
    async fn test_failed_row_is_recorded_and_batch_goes_on() {
        let mock = Arc::new(MockAgentsApi::offline().failing(CallKind::CreateAgent));
        let api: Arc<dyn AgentsApi> = mock.clone();
        let orch = orchestrator_with_api(&config(2), api);
        let items = vec![
            (1, BatchItem { question: "Q1".into(), context: None }),
            (2, BatchItem { question: "Q2".into(), context: None }),
        ];

        let mut out = Vec::new();
        let summary = run_batch(&orch, &items, &mut out).await.unwrap();
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.exit_code(), EXIT_FAILURE);
        assert_eq!(mock.count(CallKind::CreateAgent), 2);

        let records = output_lines(out);
        assert_eq!(records[1]["outcome"], "failed");
        assert!(records[1]["error"].as_str().unwrap().contains("agent"));
    }

    #[tokio::test]
    async fn test_exhausted_row_sets_exit_code() {
        let mock = Arc::new(
            MockAgentsApi::new()
                .with_default_reply("question-answerer", "An answer.")
                .with_default_reply("answer-checker", "INVALID: not accurate"),
        );
        let api: Arc<dyn AgentsApi> = mock.clone();
        let orch = orchestrator_with_api(&config(1), api);
        let items = vec![(1, BatchItem { question: "Q?".into(), context: None })];

        let mut out = Vec::new();
        let summary = run_batch(&orch, &items, &mut out).await.unwrap();
        assert_eq!(summary.exhausted, 1);
        assert_eq!(summary.exit_code(), EXIT_EXHAUSTED);

        let records = output_lines(out);
        assert_eq!(records[0]["outcome"], "exhausted");
        assert_eq!(records[0]["reasons"][0]["reason"], "not accurate");
    }
}
