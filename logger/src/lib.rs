use std::{fs::OpenOptions, sync::Arc};

use colored::Colorize;
use db::Tables;
use middleware::logger::{LoggerMiddleware, RequestLogSink};
use sqlx::PgPool;

pub mod middleware {
    pub mod logger;
}

/// Installs the global logger: colored levels on stdout, mirrored into
/// `log_file` (appended).
pub fn setup(log_file: &str) -> Result<(), fern::InitError> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(fern::InitError::Io)?;

    fern::Dispatch::new()
        .format(|out, message, record| {
            let color = match record.level() {
                log::Level::Info => "green",
                log::Level::Warn => "yellow",
                log::Level::Error => "red",
                log::Level::Debug => "magenta",
                log::Level::Trace => "bright black",
            };
            out.finish(format_args!(
                "{}[{}][{}] {}",
                chrono::Local::now().format("[%H:%M:%S]"),
                record.target(),
                record.level().to_string().color(color),
                message
            ))
        })
        .level(log::LevelFilter::Debug)
        .level_for("hyper", log::LevelFilter::Off)
        .level_for("hyper_util", log::LevelFilter::Off)
        .level_for("aws_smithy_runtime", log::LevelFilter::Warn)
        .level_for("aws_config", log::LevelFilter::Warn)
        .level_for("sqlx", log::LevelFilter::Warn)
        .chain(std::io::stdout())
        .chain(fern::log_file(log_file)?)
        .apply()?;
    Ok(())
}

/// Request logger. Every handled request is written to the request-log table
/// of `tables`; `console` also prints it.
pub fn middleware(pool: Arc<PgPool>, tables: Tables, console: bool) -> LoggerMiddleware {
    LoggerMiddleware::new(RequestLogSink::new(Some(pool), tables), console)
}
