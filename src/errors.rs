//! Harness error handling.
//!
//! Every failure the harness itself produces is a [`HarnessError`]. Test bodies
//! return [`miette::Result`], so a `HarnessError` raised by an HTTP helper or the
//! polling helper converts with `?`, and ad-hoc failures are built with
//! [`miette::miette!`].
//!
//! Two families matter to the runner:
//! - **assertion failures** (status mismatch, bad JSON, poll timeout): ordinary
//!   test failures, contained at the testset boundary;
//! - **internal errors** ([`HarnessError::UnmetAfterReconcile`]): a requirement
//!   whose mutation did not satisfy its own predicate. These are contract bugs and
//!   propagate out of the reconciler instead of being recorded as test errors.

use miette::Diagnostic;
use thiserror::Error;

use crate::http::Method;

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;

/// Type-safe error classification, used when summarising a failure on one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// HTTP status, JSON and key assertions, unbounded polls
    Assertion,
    /// Polling bounds exceeded
    Poll,
    /// Cluster launch, teardown or bucket management failures
    Cluster,
    /// Transport level failures reported by the HTTP client
    Transport,
    /// Configuration and seed parsing
    Config,
    /// Broken harness invariants
    Internal,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorType::Assertion => "AssertionError",
            ErrorType::Poll => "PollError",
            ErrorType::Cluster => "ClusterError",
            ErrorType::Transport => "TransportError",
            ErrorType::Config => "ConfigError",
            ErrorType::Internal => "InternalError",
        }
    }
}

impl std::fmt::Display for ErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Diagnostic, Debug)]
pub enum HarnessError {
    #[error("{method} {url} returned {status} {reason} (expected {expected}), response body: {body}")]
    #[diagnostic(code(harness::http::status))]
    HttpStatus {
        method: Method,
        url: String,
        status: u16,
        reason: String,
        expected: String,
        body: String,
    },

    #[error("{context}")]
    #[diagnostic(code(harness::http::json), help("response body: {body}"))]
    JsonDecode { context: String, body: String },

    #[error("({context}) '{key}' missing in json: {json}")]
    #[diagnostic(code(harness::json::missing_key))]
    MissingJsonKey {
        key: String,
        context: String,
        json: String,
    },

    #[error("{method} {url} failed: {message}")]
    #[diagnostic(code(harness::http::transport))]
    Transport {
        method: Method,
        url: String,
        message: String,
    },

    #[error("{0}")]
    #[diagnostic(code(harness::assertion))]
    Assertion(String),

    #[error("Condition not met within {timeout:.1}s (elapsed {elapsed:.1}s, {attempts} attempts)")]
    #[diagnostic(code(harness::poll::timeout))]
    PollTimeout {
        timeout: f64,
        elapsed: f64,
        attempts: usize,
    },

    #[error("Condition not met after {attempts} attempts")]
    #[diagnostic(code(harness::poll::attempts))]
    PollAttemptsExhausted { attempts: usize },

    #[error("Polling requires an attempt budget or a timeout")]
    #[diagnostic(code(harness::poll::unbounded))]
    PollUnbounded,

    #[error("Cluster has no connected nodes")]
    #[diagnostic(code(harness::cluster::no_nodes))]
    NoConnectedNodes,

    #[error("Cluster error: {0}")]
    #[diagnostic(code(harness::cluster))]
    Cluster(String),

    #[error("Invalid seed '{value}': {reason}")]
    #[diagnostic(code(harness::config::seed), help("seeds are 32 hexadecimal characters"))]
    InvalidSeed { value: String, reason: String },

    #[error("Failed to load config '{path}': {message}")]
    #[diagnostic(code(harness::config::load))]
    Config { path: String, message: String },

    #[error("Requirements still unmet after reconciliation: {unmet}")]
    #[diagnostic(
        code(harness::internal::unmet_requirements),
        help("a requirement's make_met did not satisfy its own predicate")
    )]
    UnmetAfterReconcile { unmet: String },
}

impl HarnessError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            HarnessError::HttpStatus { .. }
            | HarnessError::JsonDecode { .. }
            | HarnessError::MissingJsonKey { .. }
            | HarnessError::Assertion(_)
            | HarnessError::PollUnbounded => ErrorType::Assertion,
            HarnessError::PollTimeout { .. } | HarnessError::PollAttemptsExhausted { .. } => ErrorType::Poll,
            HarnessError::NoConnectedNodes | HarnessError::Cluster(_) => ErrorType::Cluster,
            HarnessError::Transport { .. } => ErrorType::Transport,
            HarnessError::InvalidSeed { .. } | HarnessError::Config { .. } => ErrorType::Config,
            HarnessError::UnmetAfterReconcile { .. } => ErrorType::Internal,
        }
    }

    /// True for broken harness contracts that must not be contained as test failures.
    pub fn is_internal(&self) -> bool {
        self.error_type() == ErrorType::Internal
    }
}

/// Build an [`HarnessError::Assertion`] from a format string.
#[macro_export]
macro_rules! harness_assert {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::errors::HarnessError::Assertion(format!($($arg)+)).into());
        }
    };
}
