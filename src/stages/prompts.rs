//! 各阶段 agent 的默认指令
//!
//! 优先读取 config/prompts/<stage>.txt（或上一级目录），找不到时使用内置文本。

use crate::core::StageKind;

const ANSWERER_INSTRUCTIONS: &str = "You are a questionnaire answering system that provides \
factual, comprehensive answers using web search and grounding.
Write in third person only and never ask follow-up questions or offer further help.
Search for authoritative information, synthesize a well-structured answer, \
and include the URL of every source referenced.
End the response when the question is fully answered.";

const ANSWER_CHECKER_INSTRUCTIONS: &str = "You are an expert fact-checker and answer validator \
for a questionnaire system.
Validate a candidate answer for factual accuracy (use web search), completeness, relevance, \
presence of source citations, third-person voice, and absence of follow-up questions.
Respond with 'VALID' if the answer passes all checks, \
or 'INVALID: ' followed by the specific reasons for rejection.";

const LINK_CHECKER_INSTRUCTIONS: &str = "You are a URL validator and relevance checker.
For each URL, check that it is reachable, relevant to the answer it supports, \
and from a credible source.
Respond with 'VALID' if all URLs pass, \
or 'INVALID: ' followed by the specific issue with each problematic URL.";

fn prompt_file_stem(stage: StageKind) -> &'static str {
    match stage {
        StageKind::Generation => "answerer",
        StageKind::AnswerCheck => "answer_checker",
        StageKind::LinkCheck => "link_checker",
    }
}

/// 内置默认指令
pub fn builtin_instructions(stage: StageKind) -> &'static str {
    match stage {
        StageKind::Generation => ANSWERER_INSTRUCTIONS,
        StageKind::AnswerCheck => ANSWER_CHECKER_INSTRUCTIONS,
        StageKind::LinkCheck => LINK_CHECKER_INSTRUCTIONS,
    }
}

/// 读取该阶段的指令：文件优先，否则内置
pub fn load_instructions(stage: StageKind) -> String {
    let stem = prompt_file_stem(stage);
    [
        format!("config/prompts/{}.txt", stem),
        format!("../config/prompts/{}.txt", stem),
    ]
    .into_iter()
    .find_map(|p| std::fs::read_to_string(p).ok())
    .map(|s| s.trim().to_string())
    .filter(|s| !s.is_empty())
    .unwrap_or_else(|| builtin_instructions(stage).to_string())
}
