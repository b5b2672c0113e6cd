//! 可观测性：tracing 日志初始化
//!
//! 级别优先级：RUST_LOG > --debug > --verbose > 默认 warn。
//! 指定日志文件时写入文件（无 ANSI 颜色），否则写 stderr，stdout 只留给最终答案。

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 由命令行开关得出默认级别
pub fn level_for(verbose: bool, debug: bool) -> &'static str {
    if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        "warn"
    }
}

/// 初始化全局 subscriber；重复调用时静默忽略
pub fn init(level: &str, log_file: Option<&Path>) -> std::io::Result<()> {
    let default_filter = format!("warn,questionnaire={}", level);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let file_layer = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };
    let stderr_layer = file_layer
        .is_none()
        .then(|| fmt::layer().with_target(false).with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .ok();
    Ok(())
}
