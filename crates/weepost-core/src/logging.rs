//! Logging setup on top of env_logger

use std::io::IsTerminal;

/// ANSI color code and padded label for a log level.
fn level_style(level: log::Level, color: bool) -> (&'static str, &'static str, &'static str) {
    let label = match level {
        log::Level::Error => "ERROR",
        log::Level::Warn => "WARN ",
        log::Level::Info => "INFO ",
        log::Level::Debug => "DEBUG",
        log::Level::Trace => "TRACE",
    };
    if !color {
        return ("", label, "");
    }
    let ansi = match level {
        log::Level::Error => "\x1b[31m",
        log::Level::Warn => "\x1b[33m",
        log::Level::Info => "\x1b[32m",
        log::Level::Debug => "\x1b[36m",
        log::Level::Trace => "\x1b[35m",
    };
    (ansi, label, "\x1b[0m")
}

fn default_level(quiet: bool, debug: bool) -> &'static str {
    if debug {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    }
}

/// Initialize logging. `RUST_LOG` overrides the level chosen here.
///
/// Colored labels on a terminal; plain labels with millisecond timestamps
/// otherwise, for log aggregation.
pub fn init_logging(quiet: bool, debug: bool) {
    use std::io::Write;

    let env = env_logger::Env::default().default_filter_or(default_level(quiet, debug));
    let mut builder = env_logger::Builder::from_env(env);

    if std::io::stderr().is_terminal() {
        builder.format(|buf, record| {
            let (pre, label, post) = level_style(record.level(), true);
            writeln!(buf, "[{pre}{label}{post}] {}", record.args())
        });
    } else {
        builder.format(|buf, record| {
            let (_, label, _) = level_style(record.level(), false);
            writeln!(buf, "{} [{label}] {}", buf.timestamp_millis(), record.args())
        });
    }

    // A second init (tests, embedding) keeps the first logger
    if builder.try_init().is_err() {
        log::debug!("logger already initialized");
    }
}
