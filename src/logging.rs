//! Process-wide log level and tracing bootstrap (spec.md §6, §9).
//!
//! `TRACEGRAPH_INIT_LOG_LEVEL` selects the library's initial log level at
//! init, mirroring `LIBBABELTRACE2_INIT_LOG_LEVEL`. Setuid/setgid processes
//! ignore the variable and start at `LogLevel::None`, matching
//! `bt_logging_set_global_level`'s "library cannot log below the minimal
//! build-time level" posture by giving the *running* process no way to
//! escalate its own privilege-sensitive verbosity via environment.
use once_cell::sync::OnceCell;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

pub const INIT_LOG_LEVEL_ENV_VAR: &str = "TRACEGRAPH_INIT_LOG_LEVEL";

/// Ordering matches `include/babeltrace/logging.h`: `None` sits above every
/// real level (logging disabled), the rest are ordered from quietest to
/// loudest so `level >= global` is the "should this log?" check.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
#[repr(u8)]
pub enum LogLevel {
    Fatal = 0,
    Error = 1,
    Warning = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
    #[default]
    None = 0xff,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NONE" => Ok(LogLevel::None),
            "FATAL" => Ok(LogLevel::Fatal),
            "ERROR" => Ok(LogLevel::Error),
            "WARNING" => Ok(LogLevel::Warning),
            "INFO" => Ok(LogLevel::Info),
            "DEBUG" => Ok(LogLevel::Debug),
            "TRACE" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level {other:?}")),
        }
    }
}

impl LogLevel {
    fn as_tracing_level(self) -> Option<tracing::Level> {
        match self {
            LogLevel::None => None,
            LogLevel::Fatal | LogLevel::Error => Some(tracing::Level::ERROR),
            LogLevel::Warning => Some(tracing::Level::WARN),
            LogLevel::Info => Some(tracing::Level::INFO),
            LogLevel::Debug => Some(tracing::Level::DEBUG),
            LogLevel::Trace => Some(tracing::Level::TRACE),
        }
    }

    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Fatal,
            1 => LogLevel::Error,
            2 => LogLevel::Warning,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::None,
        }
    }
}

static GLOBAL_LEVEL: AtomicU8 = AtomicU8::new(0xff);
static INIT_GUARD: OnceCell<()> = OnceCell::new();

/// True when the effective uid/gid differ from the real uid/gid, i.e. the
/// process is running setuid or setgid. Such processes ignore
/// `TRACEGRAPH_INIT_LOG_LEVEL` and start at `LogLevel::None`.
#[cfg(unix)]
fn is_setuid_or_setgid() -> bool {
    use nix::unistd::{getegid, geteuid, getgid, getuid};
    getuid() != geteuid() || getgid() != getegid()
}

#[cfg(not(unix))]
fn is_setuid_or_setgid() -> bool {
    false
}

/// Reads the environment once and sets the process-wide log level.
/// Idempotent: subsequent calls are no-ops so libraries embedding
/// `tracegraph` can call it defensively.
pub fn init() {
    INIT_GUARD.get_or_init(|| {
        let level = if is_setuid_or_setgid() {
            LogLevel::None
        } else {
            std::env::var(INIT_LOG_LEVEL_ENV_VAR)
                .ok()
                .and_then(|v| LogLevel::from_str(&v).ok())
                .unwrap_or_default()
        };
        GLOBAL_LEVEL.store(level.to_u8(), Ordering::SeqCst);
    });
}

pub fn global_level() -> LogLevel {
    LogLevel::from_u8(GLOBAL_LEVEL.load(Ordering::SeqCst))
}

pub fn set_global_level(level: LogLevel) {
    GLOBAL_LEVEL.store(level.to_u8(), Ordering::SeqCst);
}

/// Installs a `tracing_subscriber` filtered to the current global level,
/// following teacher's `try_init_tracing_subscriber`. Safe to call from a
/// binary's `main`; a library consumer may skip this and install its own
/// subscriber instead.
pub fn try_init_tracing_subscriber() -> Result<(), Box<dyn std::error::Error>> {
    init();
    let builder = tracing_subscriber::fmt::Subscriber::builder();
    let env_filter = std::env::var(tracing_subscriber::EnvFilter::DEFAULT_ENV)
        .map(tracing_subscriber::EnvFilter::new)
        .unwrap_or_else(|_| {
            let level = global_level().as_tracing_level().unwrap_or(tracing::Level::ERROR);
            tracing_subscriber::EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                level,
            ))
        });
    let builder = builder.with_env_filter(env_filter);
    let subscriber = builder.finish();
    use tracing_subscriber::util::SubscriberInitExt;
    subscriber.try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_matches_logging_h() {
        assert!(LogLevel::Fatal < LogLevel::Error);
        assert!(LogLevel::Error < LogLevel::Warning);
        assert!(LogLevel::Warning < LogLevel::Info);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
        assert!(LogLevel::Trace < LogLevel::None);
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!(LogLevel::from_str("debug").unwrap(), LogLevel::Debug);
        assert_eq!(LogLevel::from_str("WARNING").unwrap(), LogLevel::Warning);
        assert!(LogLevel::from_str("bogus").is_err());
    }
}
