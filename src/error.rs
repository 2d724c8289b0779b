use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error as ThisError;

use crate::dispatcher::NoMatchReport;
use crate::evaluation::{BoxError, Dimension};
use crate::expectation::ExpectationId;
use crate::verification::UnusedReport;

/// Misuse of the registration API.
///
/// These are raised as soon as the offending builder method is called, never when a request
/// is being dispatched.
#[derive(Debug, ThisError)]
pub enum ConfigurationError {
    #[error("Assertion on {0} is already set")]
    AlreadySet(Dimension),
    #[error("Body assertion is already set: a body cannot be both empty and matching a predicate")]
    ConflictingBody,
    #[error("`{0}` is not a valid HTTP method")]
    InvalidMethod(String),
    #[error("`{0}` is not a valid header name")]
    InvalidHeaderName(String),
    #[error("`{pattern}` is not a valid regular expression: {source}")]
    InvalidRegex {
        pattern: String,
        source: regex::Error,
    },
    #[error("The expected JSON document cannot be serialized: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("Can't match the path `{0}` because it contains a `?`. Use `queries_contain` or `queries_match` to match on query parameters (the part of the path after the `?`).")]
    QueryInPath(String),
    #[error("Can't match the path `{path}` because it contains the host `{host}`. You don't have to specify the host. Try replacing your path with `path_is(\"{suggestion}\")`")]
    HostInPath {
        path: String,
        host: String,
        suggestion: String,
    },
    #[error("Request order is 1-based: an expectation with order 0 can never match")]
    ZeroOrder,
    #[error("The session has already been finalized: start a new session before registering expectations")]
    SessionFinalized,
}

/// A fixture could not be loaded from disk.
#[derive(Debug, ThisError)]
#[error("Failed to read fixture with path {}", .path.display())]
pub struct FixtureError {
    pub(crate) path: PathBuf,
    pub(crate) source: io::Error,
}

/// Everything that can make a session fail, as surfaced at teardown.
#[derive(Debug, ThisError)]
pub enum MatchError {
    /// A request did not satisfy any pending expectation.
    #[error("Unexpected exception during assertion. {0}")]
    NoMatch(NoMatchReport),
    /// A custom evaluator failed while checking a request (returned a fault or panicked).
    #[error("Unexpected exception during assertion. Evaluating {expectation} against request #{order} ({request_line}) failed: {source}")]
    Evaluator {
        expectation: ExpectationId,
        order: u64,
        request_line: String,
        source: BoxError,
    },
    /// The test completed but some expectations never received a request.
    #[error("Failed assertion. {0}")]
    Unused(UnusedReport),
    /// `finish` was called on a session that had already been finalized.
    #[error("The session has already been finalized")]
    Finalized,
}

/// The outcome of a failed test session.
///
/// Request matching failures take precedence over the error produced by the test body itself;
/// when matching went fine, the test error is handed back untouched.
#[derive(Debug)]
pub enum Failure<E> {
    Matching(MatchError),
    Test(E),
}

impl<E> Failure<E> {
    /// The matching error, if this failure was caused by request matching.
    pub fn matching(&self) -> Option<&MatchError> {
        match self {
            Failure::Matching(e) => Some(e),
            Failure::Test(_) => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for Failure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Matching(e) => write!(f, "{}", e),
            Failure::Test(e) => write!(f, "{}", e),
        }
    }
}

impl<E: StdError + 'static> StdError for Failure<E> {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Failure::Matching(e) => Some(e),
            Failure::Test(e) => Some(e),
        }
    }
}
