fn env_truthy(var: &str) -> Option<bool> {
    std::env::var(var).map(|v| v != "0" && !v.is_empty()).ok()
}

pub mod logging {
    use clap::ValueEnum;
    use serde::Deserialize;
    use std::fs::OpenOptions;
    use std::path::PathBuf;
    use std::sync::OnceLock;
    use tracing::level_filters::LevelFilter;
    use tracing_appender::non_blocking::WorkerGuard;
    use tracing_subscriber::EnvFilter;

    #[derive(
        Clone, Copy, Debug, Default, ValueEnum, Deserialize, PartialEq, Eq, PartialOrd, Ord,
    )]
    #[serde(rename_all = "lowercase")]
    pub enum LogLevel {
        Error,
        #[default]
        Warn,
        Info,
        Debug,
        Trace,
    }

    impl LogLevel {
        pub fn as_str(self) -> &'static str {
            match self {
                LogLevel::Error => "error",
                LogLevel::Warn => "warn",
                LogLevel::Info => "info",
                LogLevel::Debug => "debug",
                LogLevel::Trace => "trace",
            }
        }

        pub fn to_filter(self) -> LevelFilter {
            match self {
                LogLevel::Error => LevelFilter::ERROR,
                LogLevel::Warn => LevelFilter::WARN,
                LogLevel::Info => LevelFilter::INFO,
                LogLevel::Debug => LevelFilter::DEBUG,
                LogLevel::Trace => LevelFilter::TRACE,
            }
        }
    }

    /// Where log lines go while the session owns the tty.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub enum ConsoleSink {
        #[default]
        Stderr,
        /// Raw mode shares stderr with the remote screen; drop console output.
        Silent,
    }

    #[derive(Clone, Debug, Default)]
    pub struct LogConfig {
        pub level: LogLevel,
        pub file: Option<PathBuf>,
        pub console: ConsoleSink,
    }

    #[derive(thiserror::Error, Debug)]
    pub enum InitError {
        #[error("failed to open log file {path:?}: {source}")]
        Io {
            path: PathBuf,
            source: std::io::Error,
        },
        #[error("failed to configure logger: {0}")]
        Configure(String),
    }

    static INIT: OnceLock<()> = OnceLock::new();
    static GUARD: OnceLock<Option<WorkerGuard>> = OnceLock::new();

    pub fn init(config: &LogConfig) -> Result<(), InitError> {
        if INIT.get().is_some() {
            return Ok(());
        }

        inner_init(config)?;
        INIT.set(()).ok();
        Ok(())
    }

    /// Line decoration chosen from the level and the sink.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct Format {
        target: bool,
        thread_info: bool,
        ansi: bool,
    }

    impl Format {
        fn for_config(config: &LogConfig) -> Self {
            Self {
                target: config.level >= LogLevel::Debug,
                thread_info: config.level >= LogLevel::Trace,
                ansi: config.file.is_none(),
            }
        }
    }

    fn inner_init(config: &LogConfig) -> Result<(), InitError> {
        let level = match (&config.file, config.console) {
            (None, ConsoleSink::Silent) => LevelFilter::OFF,
            _ => config.level.to_filter(),
        };
        let directives = filter_directives(
            level,
            std::env::var("UPSERVX_LOG_FILTER").ok(),
            super::env_truthy("UPSERVX_TRACE_DEPS").unwrap_or(false),
        );

        let (writer, guard) = match &config.file {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map_err(|source| InitError::Io {
                        path: path.clone(),
                        source,
                    })?;
                tracing_appender::non_blocking(file)
            }
            None => tracing_appender::non_blocking(std::io::stderr()),
        };

        let format = Format::for_config(config);
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new(directives))
            .with_target(format.target)
            .with_thread_ids(format.thread_info)
            .with_thread_names(format.thread_info)
            .with_ansi(format.ansi)
            .with_writer(writer)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|err| InitError::Configure(err.to_string()))?;
        let _ = GUARD.set(Some(guard));
        Ok(())
    }

    /// Websocket and TLS crates are held at info under trace unless
    /// `UPSERVX_TRACE_DEPS` is set; their frame-level output drowns ours.
    const NOISY_TARGETS: &[&str] = &["tokio_tungstenite", "tungstenite", "native_tls", "mio"];

    /// `EnvFilter` directives for `level`. An explicit filter replaces the
    /// defaults, except that a silenced console stays off.
    fn filter_directives(level: LevelFilter, explicit: Option<String>, trace_deps: bool) -> String {
        if level == LevelFilter::OFF {
            return "off".to_owned();
        }
        if let Some(filter) = explicit {
            return filter;
        }
        let mut directives = match level {
            LevelFilter::TRACE => "info,upservx_term_core=trace,upservx_term=trace",
            LevelFilter::DEBUG => "info,upservx_term_core=debug,upservx_term=debug",
            LevelFilter::INFO => "info",
            LevelFilter::WARN => "warn",
            _ => "error",
        }
        .to_owned();
        if level == LevelFilter::TRACE && !trace_deps {
            for target in NOISY_TARGETS {
                directives.push_str(&format!(",{target}=info"));
            }
        }
        directives
    }

    pub fn hexdump(bytes: &[u8]) -> String {
        const WIDTH: usize = 16;
        let mut out = String::new();
        for (i, chunk) in bytes.chunks(WIDTH).enumerate() {
            use std::fmt::Write as _;
            let offset = i * WIDTH;
            let _ = write!(out, "{offset:08x}  ");
            for (j, byte) in chunk.iter().enumerate() {
                if j == WIDTH / 2 {
                    out.push(' ');
                }
                let _ = write!(out, "{byte:02x} ");
            }
            for _ in chunk.len()..WIDTH {
                out.push_str("   ");
            }
            out.push(' ');
            for &byte in chunk {
                let ch = if (0x20..=0x7e).contains(&byte) {
                    byte as char
                } else {
                    '.'
                };
                out.push(ch);
            }
            out.push('\n');
        }
        out
    }

}
