use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error as ThisError;

use crate::request::Request;

/// A type-erased error, as returned by faulty evaluators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The part of a request a [`Mismatch`] refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dimension {
    Method,
    Path,
    Query,
    Headers,
    Body,
    JsonBody,
    Order,
    /// A user-provided assertion, labelled with a free-form name.
    Custom(String),
}

impl Dimension {
    /// The label used when rendering a predicate group, e.g. `query parameters`.
    pub fn label(&self) -> &str {
        match self {
            Dimension::Method => "method",
            Dimension::Path => "path",
            Dimension::Query => "query parameters",
            Dimension::Headers => "headers",
            Dimension::Body => "body",
            Dimension::JsonBody => "JSON body",
            Dimension::Order => "request order",
            Dimension::Custom(label) => label,
        }
    }

    /// The header used when rendering a mismatch, e.g. `QUERY PARAMETERS`.
    pub fn heading(&self) -> String {
        match self {
            Dimension::Custom(_) => "CUSTOM ASSERTION".to_owned(),
            other => other.label().to_uppercase(),
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One dimension of a request did not satisfy its predicate.
///
/// A mismatch is an ordinary outcome: the dispatcher moves on to the next pending expectation.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("{} did NOT match.\nExpected: {expected}\n     but: {actual}", .dimension.heading())]
pub struct Mismatch {
    dimension: Dimension,
    expected: String,
    actual: String,
}

impl Mismatch {
    /// A rejection along `dimension`, with the rendered expectation and actual value.
    pub fn new<E: Into<String>, A: Into<String>>(
        dimension: Dimension,
        expected: E,
        actual: A,
    ) -> Self {
        Self {
            dimension,
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// A mismatch reported by a custom assertion.
    pub fn custom<E: Into<String>, A: Into<String>>(expected: E, actual: A) -> Self {
        Self::new(Dimension::Custom("custom".to_owned()), expected, actual)
    }

    pub fn dimension(&self) -> &Dimension {
        &self.dimension
    }

    pub fn expected(&self) -> &str {
        &self.expected
    }

    pub fn actual(&self) -> &str {
        &self.actual
    }
}

/// Why an evaluator did not accept a request.
#[derive(Debug, ThisError)]
pub enum EvaluationError {
    /// The request does not satisfy the predicate.
    #[error(transparent)]
    Mismatch(#[from] Mismatch),
    /// The evaluator itself failed. The session is marked as failed.
    #[error("{0}")]
    Fault(#[source] BoxError),
}

impl EvaluationError {
    pub fn fault<E: Into<BoxError>>(error: E) -> Self {
        EvaluationError::Fault(error.into())
    }
}

/// Anything that implements `Evaluate` can decide whether a request claims an expectation.
///
/// [`RequestMatchers`] is the built-in implementation; custom assertions are plugged in either
/// as a standalone evaluator (see [`MockServer::add_evaluator`]) or appended to a group with
/// [`RequestMatchers::and`].
///
/// `Fn` closures taking a request and its arrival order implement `Evaluate` out of the box:
///
/// ```rust
/// use requestmatcher::{Evaluate, EvaluationError, Mismatch, Request};
/// use requestmatcher::http::Method;
///
/// let signed = |request: &Request, _order: u64| -> Result<(), EvaluationError> {
///     if request.headers.contains_key("x-signature") {
///         Ok(())
///     } else {
///         Err(Mismatch::custom("a signed request", "no signature").into())
///     }
/// };
///
/// let request = Request::new(Method::GET, "/").unwrap();
/// assert!(signed.evaluate(&request, 1).is_err());
/// ```
///
/// [`RequestMatchers`]: crate::RequestMatchers
/// [`RequestMatchers::and`]: crate::RequestMatchers::and
/// [`MockServer::add_evaluator`]: crate::MockServer::add_evaluator
pub trait Evaluate: Send + Sync {
    /// Check `request`, stopping at the first mismatch.
    fn evaluate(&self, request: &Request, order: u64) -> Result<(), EvaluationError>;

    /// Check `request` and collect every mismatch, for diagnostics.
    fn explain(&self, request: &Request, order: u64) -> Result<Vec<Mismatch>, EvaluationError> {
        match self.evaluate(request, order) {
            Ok(()) => Ok(Vec::new()),
            Err(EvaluationError::Mismatch(mismatch)) => Ok(vec![mismatch]),
            Err(e) => Err(e),
        }
    }

    /// Write a description of the requests this evaluator accepts.
    fn describe(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        out.write_str("a custom evaluator")
    }
}

impl<F> Evaluate for F
where
    F: Fn(&Request, u64) -> Result<(), EvaluationError>,
    F: Send + Sync,
{
    fn evaluate(&self, request: &Request, order: u64) -> Result<(), EvaluationError> {
        self(request, order)
    }
}

/// Render the description of an evaluator into a `String`.
pub(crate) fn describe_evaluator(evaluator: &dyn Evaluate) -> String {
    let mut out = String::new();
    let _ = evaluator.describe(&mut out);
    out
}

/// An evaluator panicked while checking a request.
#[derive(Debug, ThisError)]
#[error("evaluator panicked: {0}")]
pub(crate) struct EvaluatorPanic(String);

impl EvaluatorPanic {
    fn from_payload(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_owned()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "<non-string panic payload>".to_owned()
        };
        Self(message)
    }
}

/// Run a piece of user code, turning a panic into an [`EvaluationError::Fault`].
pub(crate) fn guarded<R>(
    f: impl FnOnce() -> Result<R, EvaluationError>,
) -> Result<R, EvaluationError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(EvaluationError::fault(EvaluatorPanic::from_payload(payload))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Method;

    #[test]
    fn mismatches_render_expected_and_actual() {
        let mismatch = Mismatch::new(Dimension::Method, "is <GET>", "was <POST>");

        assert_eq!(
            mismatch.to_string(),
            "METHOD did NOT match.\nExpected: is <GET>\n     but: was <POST>"
        );
    }

    #[test]
    fn custom_mismatches_have_their_own_heading() {
        let mismatch = Mismatch::custom("a signed request", "no signature");

        assert!(mismatch
            .to_string()
            .starts_with("CUSTOM ASSERTION did NOT match."));
    }

    #[test]
    fn panics_become_faults() {
        let request = Request::new(Method::GET, "/").unwrap();
        let exploding = |_: &Request, _: u64| -> Result<(), EvaluationError> { panic!("boom") };

        let outcome = guarded(|| exploding.evaluate(&request, 1));

        match outcome {
            Err(EvaluationError::Fault(e)) => assert_eq!(e.to_string(), "evaluator panicked: boom"),
            other => panic!("Expected a fault, got {:?}", other),
        }
    }

    #[test]
    fn default_explain_wraps_the_single_mismatch() {
        let request = Request::new(Method::GET, "/").unwrap();
        let never = |_: &Request, _: u64| -> Result<(), EvaluationError> {
            Err(Mismatch::custom("nothing", "something").into())
        };

        let mismatches = never.explain(&request, 1).unwrap();

        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].expected(), "nothing");
    }
}
