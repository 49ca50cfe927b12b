pub mod logging {
    use clap::ValueEnum;
    use std::fs::OpenOptions;
    use std::path::PathBuf;
    use std::sync::OnceLock;
    use tracing::level_filters::LevelFilter;
    use tracing_appender::non_blocking::WorkerGuard;
    use tracing_subscriber::EnvFilter;

    #[derive(Clone, Copy, Debug, Default, ValueEnum, PartialEq, Eq, PartialOrd, Ord)]
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

    #[derive(Clone, Debug, Default)]
    pub struct LogConfig {
        pub level: LogLevel,
        pub file: Option<PathBuf>,
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

    fn inner_init(config: &LogConfig) -> Result<(), InitError> {
        let level_filter = config.level.to_filter();
        let (env_filter, throttled_deps) = build_env_filter(level_filter);

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

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_level(true)
            .with_target(config.level >= LogLevel::Debug)
            .with_ansi(config.file.is_none())
            .with_writer(writer)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .map_err(|err| InitError::Configure(err.to_string()))?;

        let _ = GUARD.set(Some(guard));
        if throttled_deps {
            eprintln!(
                "[quarterdeck-log] suppressing dependency trace noise; set QUARTERDECK_TRACE_DEPS=1 or QUARTERDECK_LOG_FILTER to override"
            );
        }
        Ok(())
    }

    fn build_env_filter(level: LevelFilter) -> (EnvFilter, bool) {
        if let Ok(filter) = std::env::var("QUARTERDECK_LOG_FILTER") {
            return (EnvFilter::new(filter), false);
        }
        let (filter, throttled) = default_filter_for(level);
        (EnvFilter::new(filter), throttled)
    }

    // Socket libraries are extremely chatty at trace level; cap them at
    // debug unless explicitly asked for.
    const TRACE_DEP_TARGETS: &[&str] = &["tokio_tungstenite", "tungstenite", "mio"];

    fn default_filter_for(level: LevelFilter) -> (String, bool) {
        let base = level.to_string().to_lowercase();
        if level < LevelFilter::TRACE {
            return (base, false);
        }
        if std::env::var("QUARTERDECK_TRACE_DEPS").is_ok() {
            return (base, false);
        }
        let mut directives = vec![base];
        for target in TRACE_DEP_TARGETS {
            directives.push(format!("{target}=debug"));
        }
        (directives.join(","), true)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn level_maps_to_filter() {
            assert_eq!(LogLevel::Error.to_filter(), LevelFilter::ERROR);
            assert_eq!(LogLevel::Trace.to_filter(), LevelFilter::TRACE);
            assert_eq!(LogLevel::default().as_str(), "warn");
        }

        #[test]
        fn trace_level_throttles_dependency_targets() {
            let (filter, throttled) = default_filter_for(LevelFilter::TRACE);
            if std::env::var("QUARTERDECK_TRACE_DEPS").is_err() {
                assert!(throttled);
                assert!(filter.contains("tungstenite=debug"));
            }
        }

        #[test]
        fn lower_levels_pass_through_unthrottled() {
            let (filter, throttled) = default_filter_for(LevelFilter::INFO);
            assert!(!throttled);
            assert_eq!(filter, "info");
        }
    }
}
