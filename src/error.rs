//! Error types for the state engine.

use thiserror::Error;

/// Errors raised by stores, batches, tries, and the working set.
///
/// The variant is the error's identity: wrapping layers fold their context
/// into the message but never change the kind, so callers can keep matching
/// on sentinels (`is_not_found`, `is_already_exists`) across layers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Namespace, key, or state entry does not exist.
    #[error("not found: {context}")]
    NotFound {
        /// What was looked up, and where.
        context: String,
    },

    /// A `put_if_absent` collided with a live entry.
    #[error("already exists: {context}")]
    AlreadyExists {
        /// The colliding namespace/key.
        context: String,
    },

    /// An action would drive a balance negative.
    #[error("not enough balance: {context}")]
    NotEnoughBalance {
        /// The account and amount involved.
        context: String,
    },

    /// The block's gas limit is exhausted.
    #[error("out of gas: {context}")]
    OutOfGas {
        /// The action that ran out.
        context: String,
    },

    /// The run context is missing or unusable.
    #[error("invalid run context: {message}")]
    InvalidContext {
        /// Error message.
        message: String,
    },

    /// Encoding or decoding failed; treated as a data-corruption signal.
    #[error("serialization error: {message}")]
    Serialization {
        /// Error message.
        message: String,
    },

    /// Backend I/O failure, surfaced verbatim.
    #[error("storage backend error: {message}")]
    Backend {
        /// Error message from the backend.
        message: String,
    },

    /// Operation not valid in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Error message.
        message: String,
    },
}

impl StateError {
    /// Create a not-found error.
    pub fn not_found<S: Into<String>>(context: S) -> Self {
        Self::NotFound {
            context: context.into(),
        }
    }

    /// Create an already-exists error.
    pub fn already_exists<S: Into<String>>(context: S) -> Self {
        Self::AlreadyExists {
            context: context.into(),
        }
    }

    /// Create a not-enough-balance error.
    pub fn not_enough_balance<S: Into<String>>(context: S) -> Self {
        Self::NotEnoughBalance {
            context: context.into(),
        }
    }

    /// Create an out-of-gas error.
    pub fn out_of_gas<S: Into<String>>(context: S) -> Self {
        Self::OutOfGas {
            context: context.into(),
        }
    }

    /// Create an invalid-context error.
    pub fn invalid_context<S: Into<String>>(message: S) -> Self {
        Self::InvalidContext {
            message: message.into(),
        }
    }

    /// Create a serialization error.
    pub fn serialization<S: Into<String>>(message: S) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create a backend error.
    pub fn backend<S: Into<String>>(message: S) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Create an invalid-operation error.
    pub fn invalid_operation<S: Into<String>>(message: S) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Prefixes `context` onto the error's message without changing its
    /// kind, so sentinel matching keeps working across layers.
    pub fn wrap(self, context: impl std::fmt::Display) -> Self {
        match self {
            Self::NotFound { context: inner } => Self::NotFound {
                context: format!("{context}: {inner}"),
            },
            Self::AlreadyExists { context: inner } => Self::AlreadyExists {
                context: format!("{context}: {inner}"),
            },
            Self::NotEnoughBalance { context: inner } => Self::NotEnoughBalance {
                context: format!("{context}: {inner}"),
            },
            Self::OutOfGas { context: inner } => Self::OutOfGas {
                context: format!("{context}: {inner}"),
            },
            Self::InvalidContext { message } => Self::InvalidContext {
                message: format!("{context}: {message}"),
            },
            Self::Serialization { message } => Self::Serialization {
                message: format!("{context}: {message}"),
            },
            Self::Backend { message } => Self::Backend {
                message: format!("{context}: {message}"),
            },
            Self::InvalidOperation { message } => Self::InvalidOperation {
                message: format!("{context}: {message}"),
            },
        }
    }

    /// True when the error is the not-found sentinel.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// True when the error is the already-exists sentinel.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

impl From<bincode::Error> for StateError {
    fn from(err: bincode::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

/// Result type for state-engine operations.
pub type StateResult<T> = std::result::Result<T, StateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_sentinel() {
        let err = StateError::not_found("ns1/key");
        assert!(err.is_not_found());
        assert!(!err.is_already_exists());
        assert!(err.to_string().contains("ns1/key"));
    }

    #[test]
    fn test_already_exists_sentinel() {
        let err = StateError::already_exists("ns1/key");
        assert!(err.is_already_exists());
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_error_equality() {
        let err1 = StateError::not_found("k");
        let err2 = StateError::not_found("k");
        let err3 = StateError::not_found("other");
        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }

    #[test]
    fn test_kind_survives_context() {
        let err = StateError::out_of_gas("transfer 0xabc");
        assert!(matches!(err, StateError::OutOfGas { .. }));
    }

    #[test]
    fn test_wrap_keeps_kind_and_adds_context() {
        let err = StateError::not_found("ns1/key").wrap("loading account");
        assert!(err.is_not_found());
        let message = err.to_string();
        assert!(message.contains("loading account"));
        assert!(message.contains("ns1/key"));
    }
}
