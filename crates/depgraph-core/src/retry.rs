//! Bounded retry with fixed backoff for backend operations.
//!
//! Attempts run strictly one after another. A failed attempt is classified by
//! walking its whole `source()` chain, because drivers routinely wrap the
//! network or lock error that actually matters:
//!
//! - [`ErrorClass::Transient`] failures sleep for the backoff and retry until
//!   the attempt budget runs out.
//! - Every other class returns after the first failing attempt.

use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::io;
use std::time::Duration;

use crate::error::{BoxError, ExportError};

/// Retry budget. Passed explicitly to every executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff_ms: u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Fixed delay between two attempts.
    #[must_use]
    pub const fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// # Errors
    ///
    /// Returns [`ExportError::Configuration`] when no attempt is allowed.
    pub fn validate(&self) -> Result<(), ExportError> {
        if self.max_attempts == 0 {
            return Err(ExportError::Configuration(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_backoff_ms() -> u64 {
    2_000
}

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Unreachable, busy or timed out. Worth another attempt.
    Transient,
    /// Authentication or authorization failure.
    Auth,
    /// Constraint violation or malformed statement.
    Rejected,
    /// Anything else; not retried.
    Other,
}

impl ErrorClass {
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self, Self::Transient)
    }
}

/// Classify `err` by the first decisive link in its cause chain.
#[must_use]
pub fn classify(err: &(dyn StdError + 'static)) -> ErrorClass {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(link) = current {
        let class = classify_link(link);
        if class != ErrorClass::Other {
            return class;
        }
        current = link.source();
    }
    ErrorClass::Other
}

fn classify_link(err: &(dyn StdError + 'static)) -> ErrorClass {
    if let Some(sqlite) = err.downcast_ref::<rusqlite::Error>() {
        return classify_sqlite(sqlite);
    }
    if let Some(io_err) = err.downcast_ref::<io::Error>() {
        return classify_io(io_err.kind());
    }
    ErrorClass::Other
}

fn classify_sqlite(err: &rusqlite::Error) -> ErrorClass {
    use rusqlite::ErrorCode;

    match err {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::CannotOpen
            | ErrorCode::SystemIoFailure
            | ErrorCode::FileLockingProtocolFailed => ErrorClass::Transient,
            ErrorCode::PermissionDenied
            | ErrorCode::AuthorizationForStatementDenied
            | ErrorCode::ReadOnly => ErrorClass::Auth,
            ErrorCode::ConstraintViolation
            | ErrorCode::TypeMismatch
            | ErrorCode::TooBig
            | ErrorCode::ParameterOutOfRange
            | ErrorCode::Unknown => ErrorClass::Rejected,
            _ => ErrorClass::Other,
        },
        rusqlite::Error::InvalidQuery
        | rusqlite::Error::MultipleStatement
        | rusqlite::Error::InvalidParameterCount(..)
        | rusqlite::Error::InvalidParameterName(_)
        | rusqlite::Error::InvalidColumnName(_)
        | rusqlite::Error::InvalidColumnIndex(_)
        | rusqlite::Error::InvalidColumnType(..) => ErrorClass::Rejected,
        _ => ErrorClass::Other,
    }
}

const fn classify_io(kind: io::ErrorKind) -> ErrorClass {
    match kind {
        io::ErrorKind::ConnectionRefused
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected
        | io::ErrorKind::NetworkUnreachable
        | io::ErrorKind::HostUnreachable
        | io::ErrorKind::AddrNotAvailable
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::TimedOut
        | io::ErrorKind::WouldBlock
        | io::ErrorKind::Interrupted => ErrorClass::Transient,
        io::ErrorKind::PermissionDenied => ErrorClass::Auth,
        _ => ErrorClass::Other,
    }
}

/// Terminal outcome of a retried operation.
#[derive(Debug)]
pub struct RetryFailure {
    pub class: ErrorClass,
    /// Attempts consumed, including the failing one.
    pub attempts: u32,
    pub source: BoxError,
}

/// Blocks between attempts.
pub trait Sleeper {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the calling thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone)]
pub struct RetryExecutor<S = ThreadSleeper> {
    policy: RetryPolicy,
    sleeper: S,
}

impl RetryExecutor<ThreadSleeper> {
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            sleeper: ThreadSleeper,
        }
    }
}

impl<S: Sleeper> RetryExecutor<S> {
    pub const fn with_sleeper(policy: RetryPolicy, sleeper: S) -> Self {
        Self { policy, sleeper }
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run `op` until it succeeds, fails non-transiently or the budget is
    /// spent. `op` receives the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// Returns a [`RetryFailure`] carrying the last error and its class.
    pub fn run<T, E, F>(&self, label: &str, mut op: F) -> Result<T, RetryFailure>
    where
        F: FnMut(u32) -> Result<T, E>,
        E: Into<BoxError>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(
                            operation = label,
                            attempt,
                            "operation succeeded after retry"
                        );
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let source: BoxError = err.into();
                    let class = classify(source.as_ref());
                    if !class.is_transient() || attempt >= max_attempts {
                        if class.is_transient() {
                            tracing::error!(
                                operation = label,
                                attempts = attempt,
                                error = %source,
                                "giving up after transient failures"
                            );
                        }
                        return Err(RetryFailure {
                            class,
                            attempts: attempt,
                            source,
                        });
                    }

                    tracing::warn!(
                        operation = label,
                        attempt,
                        max_attempts,
                        backoff_ms = self.policy.backoff_ms,
                        error = %source,
                        "transient backend failure, retrying"
                    );
                    self.sleeper.sleep(self.policy.backoff());
                    attempt += 1;
                }
            }
        }
    }
}
