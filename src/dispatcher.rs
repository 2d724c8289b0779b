use std::fmt;
use std::time::Duration;

use http::Method;
use log::{debug, error, warn};

use crate::error::MatchError;
use crate::expectation_set::{Claim, ExpectationSet, RejectedCandidate, Rejection, SequenceCounter};
use crate::request::{BodyPrintLimit, Request};
use crate::response_template::ResponseTemplate;
use crate::verification::Verdict;

/// What the transport should do with a request.
#[derive(Debug)]
pub enum Dispatch {
    /// Send `template` back, after waiting for `delay` if any.
    Respond {
        template: ResponseTemplate,
        delay: Option<Duration>,
    },
    /// Answer with an empty `404 Not Found`.
    NotFound,
    /// Abort the connection without answering: the client observes an I/O error.
    Disconnect,
}

impl Dispatch {
    fn respond(template: ResponseTemplate) -> Self {
        let delay = template.delay().copied();
        Dispatch::Respond { template, delay }
    }
}

/// Routes incoming requests to the pending expectations of a session.
pub(crate) struct Dispatcher {
    expectations: ExpectationSet,
    counter: SequenceCounter,
    body_print_limit: BodyPrintLimit,
    ignore_favicon: bool,
}

impl Dispatcher {
    pub(crate) fn new(body_print_limit: BodyPrintLimit, ignore_favicon: bool) -> Self {
        Self {
            expectations: ExpectationSet::new(),
            counter: SequenceCounter::default(),
            body_print_limit,
            ignore_favicon,
        }
    }

    pub(crate) fn expectations(&self) -> &ExpectationSet {
        &self.expectations
    }

    /// Forget every pending expectation and restart the arrival count from 1.
    pub(crate) fn reset(&self) {
        self.expectations.clear();
        self.counter.reset();
    }

    pub(crate) fn dispatch(&self, request: &Request, verdict: &Verdict) -> Dispatch {
        if self.ignore_favicon && is_favicon(request) {
            debug!("Ignoring favicon request.");
            return Dispatch::NotFound;
        }

        match self.expectations.claim(request, &self.counter) {
            Claim::Matched { id, response, order } => {
                debug!(
                    "Request #{} ({} {}) claimed {}.",
                    order,
                    request.method,
                    request.target(),
                    id
                );
                Dispatch::respond(response)
            }
            Claim::Faulted {
                id,
                response,
                order,
                error,
            } => {
                error!(
                    "Evaluating {} against request #{} ({} {}) failed: {}",
                    id,
                    order,
                    request.method,
                    request.target(),
                    error
                );
                verdict.record(MatchError::Evaluator {
                    expectation: id,
                    order,
                    request_line: format!("{} {}", request.method, request.target()),
                    source: error,
                });
                Dispatch::respond(response)
            }
            Claim::Unmatched { order, candidates } => {
                let mut dump = String::new();
                let _ = request.print_with_limit(&mut dump, self.body_print_limit);
                let report = NoMatchReport {
                    request: dump,
                    order,
                    candidates,
                };
                warn!("{}", report);
                verdict.record(MatchError::NoMatch(report));
                Dispatch::Disconnect
            }
        }
    }
}

fn is_favicon(request: &Request) -> bool {
    request.method == Method::GET && request.url.path() == "/favicon.ico"
}

/// Why a request could not be matched: the request as received and, for every pending
/// expectation, the reasons it was turned down.
#[derive(Debug, Clone)]
pub struct NoMatchReport {
    request: String,
    order: u64,
    candidates: Vec<RejectedCandidate>,
}

impl NoMatchReport {
    /// The request dump, with its body subject to the configured print limit.
    pub fn request(&self) -> &str {
        &self.request
    }

    /// The arrival order assigned to the request.
    pub fn order(&self) -> u64 {
        self.order
    }

    pub fn candidates(&self) -> &[RejectedCandidate] {
        &self.candidates
    }
}

impl fmt::Display for NoMatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "No matcher found for request: \n\n{}\n\n", self.request)?;
        if self.candidates.is_empty() {
            return f.write_str("There were no pending expectations.");
        }

        f.write_str("Tried the following matchers:\n")?;
        for (index, candidate) in self.candidates.iter().enumerate() {
            write!(f, "\n{}. {}", index + 1, candidate.description)?;
            if !candidate.description.ends_with('\n') {
                f.write_str("\n")?;
            }
            f.write_str(" Failed because:\n")?;
            match &candidate.rejection {
                Rejection::Mismatches(mismatches) => {
                    for mismatch in mismatches {
                        for line in mismatch.to_string().lines() {
                            writeln!(f, " {}", line)?;
                        }
                    }
                }
                Rejection::Fault(message) => writeln!(f, " the evaluator failed: {}", message)?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RequestMatchers;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(BodyPrintLimit::default(), true)
    }

    #[test]
    fn favicon_requests_do_not_consume_an_arrival_order() {
        let dispatcher = dispatcher();
        let verdict = Verdict::default();
        dispatcher.expectations().add(
            ResponseTemplate::new(200),
            Box::new(RequestMatchers::new().order_is(1)),
        );

        let favicon = Request::new(Method::GET, "/favicon.ico").unwrap();
        assert!(matches!(
            dispatcher.dispatch(&favicon, &verdict),
            Dispatch::NotFound
        ));

        let request = Request::new(Method::GET, "/").unwrap();
        assert!(matches!(
            dispatcher.dispatch(&request, &verdict),
            Dispatch::Respond { .. }
        ));
        assert!(!verdict.has_failed());
    }

    #[test]
    fn unmatched_requests_disconnect_and_fail_the_session() {
        let dispatcher = dispatcher();
        let verdict = Verdict::default();
        dispatcher.expectations().add(
            ResponseTemplate::new(200),
            Box::new(RequestMatchers::new().method_is("GET").path_is("/get")),
        );

        let mut request = Request::new(Method::POST, "/get").unwrap();
        request.body = b"payload".to_vec();

        assert!(matches!(
            dispatcher.dispatch(&request, &verdict),
            Dispatch::Disconnect
        ));
        assert!(verdict.has_failed());
    }

    #[test]
    fn no_match_report_lists_every_candidate() {
        let dispatcher = dispatcher();
        let verdict = Verdict::default();
        dispatcher.expectations().add(
            ResponseTemplate::new(200),
            Box::new(RequestMatchers::new().method_is("GET").path_is("/get")),
        );
        dispatcher.expectations().add(
            ResponseTemplate::new(200),
            Box::new(RequestMatchers::new().path_is("/other")),
        );

        let request = Request::new(Method::POST, "/get").unwrap();
        dispatcher.dispatch(&request, &verdict);

        let error = verdict.take().unwrap();
        let message = error.to_string();
        assert!(message.starts_with("Unexpected exception during assertion. No matcher found"));
        assert!(message.contains("> POST /get"));
        assert!(message.contains("1. Request matchers group:\n - method: is <GET>"));
        assert!(message.contains(" METHOD did NOT match.\n Expected: is <GET>\n      but: was <POST>"));
        assert!(message.contains("2. Request matchers group:\n - path: is \"/other\""));
    }

    #[test]
    fn delays_are_surfaced_to_the_transport() {
        let dispatcher = dispatcher();
        let verdict = Verdict::default();
        dispatcher.expectations().add(
            ResponseTemplate::new(200).set_delay(Duration::from_millis(50)),
            Box::new(RequestMatchers::new()),
        );

        let request = Request::new(Method::GET, "/").unwrap();
        match dispatcher.dispatch(&request, &verdict) {
            Dispatch::Respond { delay, .. } => assert_eq!(delay, Some(Duration::from_millis(50))),
            other => panic!("Expected a response, got {:?}", other),
        }
    }
}
