use std::fmt;

use crate::retry::{ErrorClass, RetryFailure};

/// Boxed backend error carried inside [`ExportError`] variants.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    InvalidConfiguration,
    InvalidInput,
    BackendUnreachable,
    NotConnected,
    TransactionRolledBack,
    ConstraintRejected,
    AccessDenied,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::InvalidConfiguration => "E1001",
            Self::InvalidInput => "E1002",
            Self::BackendUnreachable => "E2001",
            Self::NotConnected => "E2002",
            Self::TransactionRolledBack => "E3001",
            Self::ConstraintRejected => "E3002",
            Self::AccessDenied => "E4001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InvalidConfiguration => "Invalid export configuration",
            Self::InvalidInput => "Unreadable resolver input",
            Self::BackendUnreachable => "Backend unreachable",
            Self::NotConnected => "Sink used before connect",
            Self::TransactionRolledBack => "Transaction rolled back",
            Self::ConstraintRejected => "Backend rejected the write",
            Self::AccessDenied => "Backend denied access",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::InvalidConfiguration => Some("Fix depgraph.toml or the CLI flags and retry."),
            Self::InvalidInput => Some("Regenerate the resolver tree JSON and retry."),
            Self::BackendUnreachable => {
                Some("Check that the database path is reachable and not locked by another writer.")
            }
            Self::NotConnected => None,
            Self::TransactionRolledBack => {
                Some("Nothing was written. Retry once; report a bug if persistent.")
            }
            Self::ConstraintRejected => {
                Some("Inspect the backend schema; it may belong to another tool version.")
            }
            Self::AccessDenied => Some("Check file permissions on the database."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// The backend operation an error surfaced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Connect,
    Schema,
    Export,
    Structure,
    Query,
    Cleanup,
}

impl Stage {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Schema => "schema",
            Self::Export => "export",
            Self::Structure => "structure",
            Self::Query => "query",
            Self::Cleanup => "cleanup",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure surfaced by the export core.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{stage}: backend unreachable after {attempts} attempt(s): {source}")]
    Connection {
        stage: Stage,
        attempts: u32,
        #[source]
        source: BoxError,
    },

    #[error("{stage}: transaction rolled back: {source}")]
    Transaction {
        stage: Stage,
        #[source]
        source: BoxError,
    },

    #[error("{stage}: backend rejected operation: {source}")]
    Constraint {
        stage: Stage,
        #[source]
        source: BoxError,
    },

    #[error("{stage}: backend denied access: {source}")]
    Auth {
        stage: Stage,
        #[source]
        source: BoxError,
    },

    #[error("sink is not connected")]
    NotConnected,
}

impl ExportError {
    /// Convert an exhausted or non-retryable attempt into the taxonomy.
    #[must_use]
    pub fn from_failure(stage: Stage, failure: RetryFailure) -> Self {
        let RetryFailure {
            class,
            attempts,
            source,
        } = failure;
        match class {
            ErrorClass::Transient => Self::Connection {
                stage,
                attempts,
                source,
            },
            ErrorClass::Auth => Self::Auth { stage, source },
            ErrorClass::Rejected => Self::Constraint { stage, source },
            ErrorClass::Other if stage == Stage::Connect => Self::Connection {
                stage,
                attempts,
                source,
            },
            ErrorClass::Other => Self::Transaction { stage, source },
        }
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Configuration(_) => ErrorCode::InvalidConfiguration,
            Self::InvalidInput(_) => ErrorCode::InvalidInput,
            Self::Connection { .. } => ErrorCode::BackendUnreachable,
            Self::Transaction { .. } => ErrorCode::TransactionRolledBack,
            Self::Constraint { .. } => ErrorCode::ConstraintRejected,
            Self::Auth { .. } => ErrorCode::AccessDenied,
            Self::NotConnected => ErrorCode::NotConnected,
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }

    /// Configuration errors abort regardless of any continue-on-error policy.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    /// The backend stage the error came from, if any.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::Connection { stage, .. }
            | Self::Transaction { stage, .. }
            | Self::Constraint { stage, .. }
            | Self::Auth { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io;

    fn failure(class: ErrorClass) -> RetryFailure {
        RetryFailure {
            class,
            attempts: 2,
            source: Box::new(io::Error::other("boom")),
        }
    }

    #[test]
    fn all_codes_are_unique() {
        let all = [
            ErrorCode::InvalidConfiguration,
            ErrorCode::InvalidInput,
            ErrorCode::BackendUnreachable,
            ErrorCode::NotConnected,
            ErrorCode::TransactionRolledBack,
            ErrorCode::ConstraintRejected,
            ErrorCode::AccessDenied,
        ];

        let mut seen = HashSet::new();
        for code in all {
            assert!(seen.insert(code.code()), "duplicate code {}", code.code());
        }
    }

    #[test]
    fn failure_classes_map_to_taxonomy() {
        let err = ExportError::from_failure(Stage::Export, failure(ErrorClass::Transient));
        assert!(matches!(err, ExportError::Connection { attempts: 2, .. }));

        let err = ExportError::from_failure(Stage::Export, failure(ErrorClass::Rejected));
        assert!(matches!(err, ExportError::Constraint { stage: Stage::Export, .. }));

        let err = ExportError::from_failure(Stage::Cleanup, failure(ErrorClass::Auth));
        assert_eq!(err.code(), ErrorCode::AccessDenied);

        let err = ExportError::from_failure(Stage::Export, failure(ErrorClass::Other));
        assert!(matches!(err, ExportError::Transaction { .. }));

        let err = ExportError::from_failure(Stage::Connect, failure(ErrorClass::Other));
        assert!(matches!(err, ExportError::Connection { .. }));
    }

    #[test]
    fn only_configuration_is_fatal() {
        assert!(ExportError::Configuration("depth".into()).is_fatal());
        assert!(!ExportError::NotConnected.is_fatal());
        let err = ExportError::from_failure(Stage::Query, failure(ErrorClass::Transient));
        assert!(!err.is_fatal());
        assert_eq!(err.stage(), Some(Stage::Query));
    }
}
