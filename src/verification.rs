use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, error};

use crate::error::{Failure, MatchError};
use crate::expectation::ExpectationId;

/// An expectation that never received a matching request, rendered when the session ended.
#[derive(Debug, Clone)]
pub struct UnusedExpectation {
    pub(crate) id: ExpectationId,
    pub(crate) description: String,
    pub(crate) response: String,
}

impl UnusedExpectation {
    pub fn id(&self) -> ExpectationId {
        self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn response(&self) -> &str {
        &self.response
    }
}

/// A report of the expectations left pending at the end of a session.
#[derive(Debug, Clone)]
pub struct UnusedReport {
    expectations: Vec<UnusedExpectation>,
    /// Dumps of the requests received during the session, `None` if recording is disabled.
    received_requests: Option<Vec<String>>,
}

impl UnusedReport {
    pub(crate) fn new(
        expectations: Vec<UnusedExpectation>,
        received_requests: Option<Vec<String>>,
    ) -> Self {
        Self {
            expectations,
            received_requests,
        }
    }

    pub fn expectations(&self) -> &[UnusedExpectation] {
        &self.expectations
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.expectations.is_empty()
    }
}

impl fmt::Display for UnusedReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("There are unused expectations:\n")?;
        for expectation in &self.expectations {
            write!(f, "Not used matcher:       {}", expectation.description)?;
            if !expectation.description.ends_with('\n') {
                f.write_str("\n")?;
            }
            writeln!(f, "with expected response: {}", expectation.response)?;
            f.write_str("---------------------\n")?;
        }

        match &self.received_requests {
            Some(requests) if requests.is_empty() => {
                f.write_str("The server did not receive any request.")
            }
            Some(requests) => {
                f.write_str("Received requests:\n")?;
                for (index, request) in requests.iter().enumerate() {
                    writeln!(f, "- Request #{}", index + 1)?;
                    for line in request.lines() {
                        writeln!(f, "\t{}", line)?;
                    }
                }
                Ok(())
            }
            None => f.write_str(
                "Enable request recording on the mock server to get the list of incoming requests as part of the failure message.",
            ),
        }
    }
}

/// Collects the outcome of a session: at most one hard failure, the first one reported.
#[derive(Default)]
pub(crate) struct Verdict {
    hard_failure: Mutex<Option<MatchError>>,
}

impl Verdict {
    fn lock(&self) -> MutexGuard<'_, Option<MatchError>> {
        self.hard_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Remember `failure`, unless another one was recorded first.
    pub(crate) fn record(&self, failure: MatchError) {
        let mut slot = self.lock();
        if slot.is_some() {
            debug!("A hard failure was already recorded, dropping: {}", failure);
        } else {
            *slot = Some(failure);
        }
    }

    pub(crate) fn has_failed(&self) -> bool {
        self.lock().is_some()
    }

    pub(crate) fn take(&self) -> Option<MatchError> {
        self.lock().take()
    }

    /// Combine the recorded hard failure, the outcome of the test body and the expectations
    /// left pending into the final outcome of the session.
    ///
    /// A hard failure wins over everything, then the test error, then unused expectations.
    pub(crate) fn conclude<E: fmt::Debug>(
        &self,
        test_result: Result<(), E>,
        unused: UnusedReport,
    ) -> Result<(), Failure<E>> {
        if let Some(failure) = self.take() {
            if let Err(test_error) = &test_result {
                error!(
                    "The test failed as well, but request matching failed first: {:?}",
                    test_error
                );
            }
            return Err(Failure::Matching(failure));
        }
        test_result.map_err(Failure::Test)?;
        if !unused.is_empty() {
            return Err(Failure::Matching(MatchError::Unused(unused)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unused(description: &str) -> UnusedExpectation {
        UnusedExpectation {
            id: ExpectationId(1),
            description: description.to_owned(),
            response: "200 OK".to_owned(),
        }
    }

    fn nothing_left() -> UnusedReport {
        UnusedReport::new(vec![], Some(vec![]))
    }

    #[test]
    fn a_clean_session_succeeds() {
        let verdict = Verdict::default();

        assert!(verdict.conclude(Ok::<(), String>(()), nothing_left()).is_ok());
    }

    #[test]
    fn the_first_hard_failure_wins() {
        let verdict = Verdict::default();
        verdict.record(MatchError::Finalized);
        verdict.record(MatchError::Unused(nothing_left()));

        assert!(matches!(verdict.take(), Some(MatchError::Finalized)));
        assert!(!verdict.has_failed());
    }

    #[test]
    fn hard_failures_dominate_test_errors() {
        let verdict = Verdict::default();
        verdict.record(MatchError::Finalized);

        let outcome = verdict.conclude(Err("assertion failed"), nothing_left());

        assert!(matches!(
            outcome,
            Err(Failure::Matching(MatchError::Finalized))
        ));
    }

    #[test]
    fn test_errors_are_handed_back_untouched() {
        let verdict = Verdict::default();

        let outcome = verdict.conclude(
            Err("assertion failed"),
            UnusedReport::new(vec![unused("Request matchers group:\n")], None),
        );

        assert!(matches!(outcome, Err(Failure::Test("assertion failed"))));
    }

    #[test]
    fn unused_expectations_are_reported() {
        let verdict = Verdict::default();

        let outcome = verdict.conclude(
            Ok::<(), String>(()),
            UnusedReport::new(
                vec![unused("Request matchers group:\n - path: is \"/unused\"\n")],
                Some(vec![]),
            ),
        );

        let message = match outcome {
            Err(failure) => failure.to_string(),
            Ok(()) => panic!("Expected the session to fail"),
        };
        assert_eq!(
            message,
            "Failed assertion. There are unused expectations:\n\
             Not used matcher:       Request matchers group:\n \
             - path: is \"/unused\"\n\
             with expected response: 200 OK\n\
             ---------------------\n\
             The server did not receive any request."
        );
    }

    #[test]
    fn received_requests_are_listed_in_the_unused_report() {
        let report = UnusedReport::new(
            vec![unused("a custom evaluator")],
            Some(vec!["> GET /\n> host: localhost".to_owned()]),
        );

        let message = report.to_string();

        assert!(message.contains("Not used matcher:       a custom evaluator\n"));
        assert!(message.ends_with("- Request #1\n\t> GET /\n\t> host: localhost\n"));
    }
}
