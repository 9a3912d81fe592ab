use clap::{Args, Parser, builder::BoolishValueParser};
use std::path::PathBuf;

use crate::session::{InteractionMode, ResourceKind};
use crate::telemetry::logging::{ConsoleSink, LogConfig, LogLevel};

#[derive(Parser, Debug)]
#[command(
    name = "upservx-term",
    about = "Open an interactive shell on an upservx container or VM",
    author,
    version
)]
pub struct Cli {
    #[arg(value_name = "NAME", help = "Name of the container or VM")]
    pub name: String,

    #[arg(
        long,
        value_enum,
        env = "UPSERVX_KIND",
        default_value_t = ResourceKind::Container,
        help = "Kind of resource to attach to"
    )]
    pub kind: ResourceKind,

    #[command(flatten)]
    pub connection: ConnectionArgs,

    #[command(flatten)]
    pub logging: LoggingArgs,
}

/// Settings that may also come from the config file. Anything left unset here
/// falls through to the file, then to built-in defaults.
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectionArgs {
    #[arg(
        long,
        value_name = "PATH",
        env = "UPSERVX_CONFIG",
        help = "Config file to read instead of ~/.upservx/terminal.toml"
    )]
    pub config: Option<PathBuf>,

    #[arg(long, env = "UPSERVX_HOST", help = "Host running the upservx service")]
    pub host: Option<String>,

    #[arg(long, env = "UPSERVX_PORT", help = "Port of the upservx service")]
    pub port: Option<u16>,

    #[arg(
        long,
        env = "UPSERVX_TLS",
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        default_missing_value = "true",
        help = "Connect with wss:// instead of ws://"
    )]
    pub tls: Option<bool>,

    #[arg(
        long,
        value_enum,
        env = "UPSERVX_MODE",
        help = "raw forwards every key; line edits locally and sends on Enter"
    )]
    pub mode: Option<InteractionMode>,

    #[arg(
        long,
        env = "UPSERVX_TOKEN",
        hide_env_values = true,
        help = "Basic auth token (base64 of user:password)"
    )]
    pub token: Option<String>,

    #[arg(
        long = "user",
        env = "UPSERVX_USER",
        help = "Log in as this user and prompt for the password"
    )]
    pub username: Option<String>,

    #[arg(
        long,
        env = "UPSERVX_PROMPT",
        help = "Line-mode prompt; {target} expands to the resource name"
    )]
    pub prompt: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        value_enum,
        env = "UPSERVX_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        value_name = "PATH",
        env = "UPSERVX_LOG_FILE",
        help = "Write structured logs to the specified file"
    )]
    pub file: Option<PathBuf>,
}

impl LoggingArgs {
    /// Console output would land in the middle of the remote screen once the
    /// tty is handed to the session, so it is dropped unless a file is given.
    pub fn to_config(&self, owns_tty: bool) -> LogConfig {
        let console = if owns_tty && self.file.is_none() {
            ConsoleSink::Silent
        } else {
            ConsoleSink::Stderr
        };
        LogConfig {
            level: self.level,
            file: self.file.clone(),
            console,
        }
    }
}
