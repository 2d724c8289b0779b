use std::fmt;

use crate::evaluation::{describe_evaluator, Evaluate};
use crate::response_template::ResponseTemplate;

/// Identifies an expectation registered on a [`MockServer`].
///
/// Ids are handed out in registration order and never reused within a server.
///
/// [`MockServer`]: crate::MockServer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExpectationId(pub(crate) u64);

impl fmt::Display for ExpectationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expectation #{}", self.0)
    }
}

/// A canned response waiting for the first request its evaluator accepts.
pub(crate) struct Expectation {
    pub(crate) response: ResponseTemplate,
    pub(crate) evaluator: Box<dyn Evaluate>,
}

impl Expectation {
    pub(crate) fn new(response: ResponseTemplate, evaluator: Box<dyn Evaluate>) -> Self {
        Self {
            response,
            evaluator,
        }
    }

    pub(crate) fn description(&self) -> String {
        describe_evaluator(self.evaluator.as_ref())
    }
}
