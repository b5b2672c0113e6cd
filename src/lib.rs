//! Questionnaire - 多 agent 问答系统
//!
//! 模块划分：
//! - **batch**: JSON Lines 批量问答
//! - **cli**: 命令行参数
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、运行状态、agent 会话生命周期、重试编排
//! - **llm**: 远端 agent 平台抽象与实现（Foundry HTTP / Mock）
//! - **observability**: 日志初始化
//! - **report**: 结果输出与退出码
//! - **stages**: 生成、答案校验、链接校验三个阶段

pub mod batch;
pub mod cli;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod report;
pub mod stages;

pub use crate::core::{Orchestrator, RunOutcome, Verdict};
