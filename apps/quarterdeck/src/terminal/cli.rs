use clap::{Args, Parser};
use std::path::PathBuf;

use crate::telemetry::logging::{LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "quarterdeck",
    about = "Control surface for a remote command shell with risk-gated execution",
    author,
    version
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "QUARTERDECK_SESSION_SERVER",
        default_value = "127.0.0.1:8080",
        help = "Address of the executor socket"
    )]
    pub session_server: String,

    #[command(flatten)]
    pub logging: LoggingArgs,

    /// Logical host target to attach (defaults to "default")
    pub target: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        env = "QUARTERDECK_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        env = "QUARTERDECK_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    pub fn to_config(&self) -> LogConfig {
        LogConfig {
            level: self.level,
            file: self.file.clone(),
        }
    }
}
