use std::io::IsTerminal;

use jiff::{ToSpan, civil::Date};
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::{services::tasks::TaskStore, storage::Storage};

#[derive(Debug, Error)]
pub enum InitTracingError {
    #[error("Invalid RUST_LOG / log filter: {0}")]
    InvalidFilter(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveTaskError {
    #[error("No task matches '{0}'")]
    NotFound(String),

    #[error("'{prefix}' matches {count} tasks, use more characters of the id")]
    Ambiguous { prefix: String, count: usize },
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Could not understand date '{0}' (use today, tomorrow, +3d or YYYY-MM-DD)")]
pub struct ParseDateError(pub String);

/// `-q` beats `-v`; both default to `warn`
pub fn default_level(verbose: u8, quiet: u8) -> &'static str {
    match (verbose, quiet) {
        (_, q) if q >= 2 => "error",
        (_, 1) => "warn",
        (v, _) if v >= 3 => "trace",
        (2, _) => "debug",
        (1, _) => "info",
        _ => "warn",
    }
}

/// Logs go to stderr so rendered output on stdout stays clean
pub fn init_tracing(verbose: u8, quiet: u8) -> Result<(), InitTracingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level(verbose, quiet)))
        .map_err(|e| InitTracingError::InvalidFilter(e.to_string()))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Resolves a user-typed id prefix to exactly one task
pub fn resolve_task<S: Storage>(
    store: &TaskStore<S>,
    prefix: &str,
) -> Result<Uuid, ResolveTaskError> {
    let matches = store.find_by_prefix(prefix);
    match matches.as_slice() {
        [task] => Ok(task.id),
        [] => Err(ResolveTaskError::NotFound(prefix.to_string())),
        many => Err(ResolveTaskError::Ambiguous {
            prefix: prefix.to_string(),
            count: many.len(),
        }),
    }
}

/// Accepts `today`, `tomorrow`, `+Nd` offsets and ISO dates
pub fn parse_date(input: &str, today: Date) -> Result<Date, ParseDateError> {
    let trimmed = input.trim().to_lowercase();
    let error = || ParseDateError(input.to_string());

    match trimmed.as_str() {
        "today" => return Ok(today),
        "tomorrow" => return today.checked_add(1.day()).map_err(|_| error()),
        _ => {}
    }

    if let Some(days) = trimmed.strip_prefix('+') {
        let days: i32 = days.trim_end_matches('d').parse().map_err(|_| error())?;
        return today.checked_add(days.days()).map_err(|_| error());
    }

    trimmed.parse::<Date>().map_err(|_| error())
}
