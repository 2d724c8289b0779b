use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use http::HeaderMap;
use log::{debug, warn};

use crate::dispatcher::{Dispatch, Dispatcher};
use crate::error::{ConfigurationError, Failure, FixtureError, MatchError};
use crate::evaluation::Evaluate;
use crate::expectation::ExpectationId;
use crate::fixtures::{mime_type_from_extension, Fixtures};
use crate::request::{BodyPrintLimit, Request};
use crate::request_matchers::RequestMatchers;
use crate::response_template::ResponseTemplate;
use crate::verification::{UnusedReport, Verdict};

/// Settings shared by every session run on the same server.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum number of body bytes shown in failure reports.
    pub body_print_limit: BodyPrintLimit,
    /// Keep a copy of every received request, for `received_requests` and failure reports.
    pub record_requests: bool,
    /// Headers added to every response that does not set them already.
    pub default_headers: HeaderMap,
    pub fixtures: Fixtures,
    /// Set the content type of fixture responses from the fixture extension.
    pub guess_mime_type: bool,
    /// Answer `GET /favicon.ico` with a 404 without evaluating any expectation.
    pub ignore_favicon: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            body_print_limit: BodyPrintLimit::default(),
            record_requests: true,
            default_headers: HeaderMap::new(),
            fixtures: Fixtures::default(),
            guess_mime_type: true,
            ignore_favicon: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Requests are being dispatched.
    Active,
    /// The outcome has been computed; requests are refused until the next `start`.
    Finalized,
}

/// The lifetime of one test against a server: the expectations registered by the test, the
/// arrival count, the requests received and the hard failure (if any).
///
/// [`MockServer`](crate::MockServer) drives a `Session` from its HTTP transport; it can also be
/// driven by hand, which is handy to exercise evaluators without a network round-trip:
///
/// ```rust
/// use requestmatcher::{Dispatch, RequestMatchers, ResponseTemplate, Session, SessionConfig};
/// use requestmatcher::{Request, http::Method};
///
/// let session = Session::new(SessionConfig::default());
/// session.add(ResponseTemplate::new(204), RequestMatchers::new().path_is("/ping"));
///
/// let outcome = session.dispatch(Request::new(Method::GET, "/ping").unwrap());
///
/// assert!(matches!(outcome, Dispatch::Respond { .. }));
/// assert!(session.finish(Ok::<(), String>(())).is_ok());
/// ```
pub struct Session {
    dispatcher: Dispatcher,
    verdict: Verdict,
    received_requests: Mutex<Option<Vec<Request>>>,
    finalized: AtomicBool,
    config: SessionConfig,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        let received_requests = if config.record_requests {
            Some(Vec::new())
        } else {
            None
        };
        Self {
            dispatcher: Dispatcher::new(config.body_print_limit, config.ignore_favicon),
            verdict: Verdict::default(),
            received_requests: Mutex::new(received_requests),
            finalized: AtomicBool::new(false),
            config,
        }
    }

    fn received(&self) -> MutexGuard<'_, Option<Vec<Request>>> {
        self.received_requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Begin a fresh session: pending expectations, arrival count, recorded requests and hard
    /// failure are all forgotten.
    pub fn start(&self) {
        debug!("Starting a new session.");
        self.dispatcher.reset();
        self.verdict.take();
        if let Some(requests) = self.received().as_mut() {
            requests.clear();
        }
        self.finalized.store(false, Ordering::SeqCst);
    }

    /// Whether the session still dispatches requests.
    pub fn state(&self) -> SessionState {
        if self.finalized.load(Ordering::SeqCst) {
            SessionState::Finalized
        } else {
            SessionState::Active
        }
    }

    /// Register an expectation: `response` is returned to the first request `evaluator`
    /// accepts.
    ///
    /// Panics if the session has been finalized.
    pub fn add<E>(&self, response: ResponseTemplate, evaluator: E) -> ExpectationId
    where
        E: Evaluate + 'static,
    {
        if self.state() == SessionState::Finalized {
            panic!("{}", ConfigurationError::SessionFinalized);
        }
        self.dispatcher
            .expectations()
            .add(response, Box::new(evaluator))
    }

    /// Register an expectation whose body is read from a fixture file.
    ///
    /// The content type is guessed from the extension of `path`, unless disabled in the
    /// configuration.
    pub fn add_fixture<P: AsRef<Path>>(
        &self,
        status: u16,
        path: P,
        matchers: RequestMatchers,
    ) -> Result<ExpectationId, FixtureError> {
        let path = path.as_ref();
        let body = self.config.fixtures.read_bytes(path)?;
        let template = ResponseTemplate::new(status);
        let template = match mime_type_from_extension(path) {
            Some(mime) if self.config.guess_mime_type => template.set_body_raw(body, mime),
            _ => template.set_body_bytes(body),
        };
        Ok(self.add(template, matchers))
    }

    /// Route a request to the first pending expectation that accepts it.
    pub fn dispatch(&self, request: Request) -> Dispatch {
        if self.state() == SessionState::Finalized {
            warn!(
                "Received {} {} after the session was finalized, dropping the connection.",
                request.method,
                request.target()
            );
            return Dispatch::Disconnect;
        }

        let dispatch = self.dispatcher.dispatch(&request, &self.verdict);
        if let Some(requests) = self.received().as_mut() {
            requests.push(request);
        }
        dispatch
    }

    /// End the session and compute its outcome.
    ///
    /// A request matching failure recorded during the session wins over `test_result`; if there
    /// was none, a failed `test_result` is handed back as is. Finally, expectations that were
    /// never claimed fail the session.
    pub fn finish<E: fmt::Debug>(&self, test_result: Result<(), E>) -> Result<(), Failure<E>> {
        if self.finalized.swap(true, Ordering::SeqCst) {
            return Err(Failure::Matching(MatchError::Finalized));
        }
        debug!("Finishing the session.");

        let received_requests = self.received().as_ref().map(|requests| {
            requests
                .iter()
                .map(|request| {
                    let mut dump = String::new();
                    let _ = request.print_with_limit(&mut dump, self.config.body_print_limit);
                    dump
                })
                .collect()
        });
        let unused = UnusedReport::new(
            self.dispatcher.expectations().remaining(),
            received_requests,
        );
        self.verdict.conclude(test_result, unused)
    }

    /// How many expectations have not been claimed yet.
    pub fn pending(&self) -> usize {
        self.dispatcher.expectations().len()
    }

    /// The requests received since the session started, `None` if recording is disabled.
    pub fn received_requests(&self) -> Option<Vec<Request>> {
        self.received().clone()
    }

    pub fn default_headers(&self) -> &HeaderMap {
        &self.config.default_headers
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}
