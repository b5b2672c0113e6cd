//! 命令行参数（clap derive）

use std::path::PathBuf;

use clap::Parser;

use crate::config::AppConfig;

/// Answer a question with a generate / validate / retry loop over remote AI agents.
#[derive(Parser, Debug)]
#[command(name = "questionnaire")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// The question to answer
    #[arg(required_unless_present = "import")]
    pub question: Option<String>,

    /// Answer every question in a JSON Lines file ({"question": ..., "context": ...} per line)
    #[arg(long, value_name = "PATH", conflicts_with = "question")]
    pub import: Option<PathBuf>,

    /// Write batch results to this file instead of stdout
    #[arg(long, value_name = "PATH", requires = "import")]
    pub output: Option<PathBuf>,

    /// Log progress (info level)
    #[arg(short, long)]
    pub verbose: bool,

    /// Log everything including raw agent replies (debug level)
    #[arg(long)]
    pub debug: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Specify alternate configuration file
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Maximum number of attempts (default: 10)
    #[arg(long, value_name = "N")]
    pub max_attempts: Option<usize>,

    /// Context that frames the question
    #[arg(long)]
    pub context: Option<String>,

    /// Reject answers longer than this many characters
    #[arg(long, value_name = "N")]
    pub char_limit: Option<usize>,

    /// Output the result as JSON
    #[arg(long)]
    pub json: bool,
}

impl Cli {
    /// 命令行参数覆盖配置文件中的值
    pub fn apply_overrides(&self, cfg: &mut AppConfig) {
        if let Some(n) = self.max_attempts {
            cfg.app.max_attempts = n;
        }
        if let Some(context) = &self.context {
            cfg.app.context = Some(context.clone());
        }
        if let Some(limit) = self.char_limit {
            cfg.app.char_limit = Some(limit);
        }
    }
}
