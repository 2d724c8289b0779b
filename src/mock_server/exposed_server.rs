use crate::error::Failure;
use crate::evaluation::Evaluate;
use crate::expectation::ExpectationId;
use crate::mock_server::bare_server::BareMockServer;
use crate::mock_server::pool::{get_pooled_mock_server, PooledMockServer};
use crate::mock_server::MockServerBuilder;
use crate::session::{Session, SessionState};
use crate::{Request, RequestMatchers, ResponseTemplate};
use log::{debug, error};
use std::convert::Infallible;
use std::fmt;
use std::net::SocketAddr;
use std::ops::Deref;
use std::path::Path;

/// An HTTP web-server running in the background to stand in for one of your dependencies.
///
/// Each instance of `MockServer` is fully isolated: [`MockServer::start`] takes care of finding a random port
/// available on your local machine which is assigned to the new `MockServer`.
///
/// You can use [`MockServer::builder`] if you need to specify custom configuration - e.g.
/// run on a specific port or disable request recording.
///
/// ## Best practices
///
/// You should use one instance of `MockServer` for each REST API that your application interacts
/// with and needs mocking for testing purposes.
///
/// To ensure full isolation and no cross-test interference, `MockServer`s shouldn't be
/// shared between tests. Instead, `MockServer`s should be created in the test where they are used.
///
/// When a `MockServer` goes out of scope it verifies the session (see [`MockServer::verify`])
/// unless you already did so with [`MockServer::finish`] or [`MockServer::verify`].
pub struct MockServer(InnerServer);

/// `MockServer` is either a wrapper around a `BareMockServer` retrieved from an
/// object pool or a wrapper around an exclusive `BareMockServer`.
/// We use the pool when the user does not care about the port the mock server listens to, while
/// we provision a dedicated one if they use the builder.
///
/// `InnerServer` implements `Deref<Target=BareMockServer>`, so we never actually have to match
/// on `InnerServer` in `MockServer` - the compiler does all the boring heavy-lifting for us.
pub(super) enum InnerServer {
    Bare(BareMockServer),
    Pooled(PooledMockServer),
}

impl Deref for InnerServer {
    type Target = BareMockServer;

    fn deref(&self) -> &Self::Target {
        match self {
            InnerServer::Bare(b) => b,
            InnerServer::Pooled(p) => p.deref(),
        }
    }
}

impl MockServer {
    pub(super) fn new(server: InnerServer) -> Self {
        Self(server)
    }

    /// You can use `MockServer::builder` if you need to specify custom configuration - e.g.
    /// run on a specific port or disable request recording.
    ///
    /// If this is not your case, use [`MockServer::start`].
    pub fn builder() -> MockServerBuilder {
        MockServerBuilder::new()
    }

    /// Start a new instance of a `MockServer` listening on a random port.
    ///
    /// Each instance of `MockServer` is fully isolated: `start` takes care of finding a random port
    /// available on your local machine which is assigned to the new `MockServer`.
    ///
    /// ### Example:
    /// ```rust
    /// use requestmatcher::{MockServer, RequestMatchers, ResponseTemplate};
    ///
    /// #[async_std::main]
    /// async fn main() {
    ///     // Arrange
    ///     let mock_server_one = MockServer::start().await;
    ///     let mock_server_two = MockServer::start().await;
    ///
    ///     assert!(mock_server_one.address() != mock_server_two.address());
    ///
    ///     // Registering the expectation with the first mock server only.
    ///     mock_server_one.add_response(
    ///         ResponseTemplate::new(200),
    ///         RequestMatchers::new().method_is("GET"),
    ///     );
    ///
    ///     // Act
    ///     let status = reqwest::get(&mock_server_one.uri())
    ///         .await
    ///         .unwrap()
    ///         .status();
    ///     assert_eq!(status, 200);
    ///
    ///     // The second mock server has nothing pending: it drops the connection and fails.
    ///     assert!(reqwest::get(&mock_server_two.uri()).await.is_err());
    ///     assert!(mock_server_two.finish(Ok::<(), String>(())).is_err());
    /// }
    /// ```
    pub async fn start() -> Self {
        Self(InnerServer::Pooled(get_pooled_mock_server().await))
    }

    fn session(&self) -> &Session {
        self.0.session()
    }

    /// Expect a request satisfying `matchers`: the first one to arrive gets `template` back.
    ///
    /// Each expectation is claimed at most once. Register it multiple times if you expect
    /// several identical requests.
    ///
    /// Panics if the session has already been finished.
    pub fn add_response(&self, template: ResponseTemplate, matchers: RequestMatchers) -> ExpectationId {
        self.session().add(template, matchers)
    }

    /// Like [`add_response`](MockServer::add_response), with a custom [`Evaluate`]
    /// implementation deciding which request claims the expectation.
    ///
    /// ### Example:
    /// ```rust
    /// use requestmatcher::{EvaluationError, Mismatch, MockServer, Request, ResponseTemplate};
    ///
    /// #[async_std::main]
    /// async fn main() {
    ///     // Arrange
    ///     let mock_server = MockServer::start().await;
    ///     mock_server.add_evaluator(
    ///         ResponseTemplate::new(200),
    ///         |request: &Request, _order: u64| -> Result<(), EvaluationError> {
    ///             if request.url.path().len() % 2 == 1 {
    ///                 Ok(())
    ///             } else {
    ///                 Err(Mismatch::custom("a path of odd length", request.url.path()).into())
    ///             }
    ///         },
    ///     );
    ///
    ///     // Act
    ///     let status = reqwest::get(format!("{}/odd1", &mock_server.uri()))
    ///         .await
    ///         .unwrap()
    ///         .status();
    ///
    ///     // Assert
    ///     assert_eq!(status, 200);
    /// }
    /// ```
    pub fn add_evaluator<E: Evaluate + 'static>(
        &self,
        template: ResponseTemplate,
        evaluator: E,
    ) -> ExpectationId {
        self.session().add(template, evaluator)
    }

    /// Expect a request satisfying `matchers` and answer with the content of a fixture file.
    ///
    /// `path` is resolved against the fixture root (see
    /// [`MockServerBuilder::fixtures_root`]); the "Content-Type" is guessed from its extension.
    ///
    /// Panics if the fixture cannot be read.
    pub fn add_fixture<P: AsRef<Path>>(
        &self,
        status: u16,
        path: P,
        matchers: RequestMatchers,
    ) -> ExpectationId {
        match self.session().add_fixture(status, path, matchers) {
            Ok(id) => id,
            Err(e) => panic!("{}", e),
        }
    }

    /// How many expectations have not been claimed yet.
    pub fn pending(&self) -> usize {
        self.session().pending()
    }

    /// Drop all pending expectations, forget the received requests and any failure: the
    /// `MockServer` is as good as new.
    pub fn reset(&self) {
        self.0.reset();
    }

    /// End the session and combine its outcome with the outcome of your test body.
    ///
    /// A request matching failure (a request no expectation accepted, a faulty evaluator) wins
    /// over `test_result`; if there was none, a failed `test_result` is handed back as
    /// [`Failure::Test`]. Finally, expectations left unused fail the session.
    ///
    /// ### Example:
    /// ```rust
    /// use requestmatcher::{Failure, MockServer, RequestMatchers, ResponseTemplate};
    ///
    /// #[async_std::main]
    /// async fn main() {
    ///     // Arrange
    ///     let mock_server = MockServer::start().await;
    ///     mock_server.add_response(ResponseTemplate::new(200), RequestMatchers::new().path_is("/hello"));
    ///
    ///     // Act
    ///     let test_result = async {
    ///         let status = reqwest::get(format!("{}/hello", &mock_server.uri()))
    ///             .await
    ///             .map_err(|e| e.to_string())?
    ///             .status();
    ///         if status != 200 {
    ///             return Err(format!("Unexpected status {}", status));
    ///         }
    ///         Ok(())
    ///     }
    ///     .await;
    ///
    ///     // Assert
    ///     assert!(mock_server.finish(test_result).is_ok());
    /// }
    /// ```
    pub fn finish<E: fmt::Debug>(&self, test_result: Result<(), E>) -> Result<(), Failure<E>> {
        self.session().finish(test_result)
    }

    /// End the session and panic if it failed.
    pub fn verify(&self) {
        debug!("Verify mock expectations.");
        if let Err(failure) = self.finish(Ok::<(), Infallible>(())) {
            panic!("{}", failure);
        }
    }

    /// Return the base uri of this running instance of `MockServer`, e.g. `http://127.0.0.1:4372`.
    ///
    /// Use this method to compose uris when interacting with this instance of `MockServer` via
    /// an HTTP client.
    pub fn uri(&self) -> String {
        self.0.uri()
    }

    /// Return the socket address of this running instance of `MockServer`, e.g. `127.0.0.1:4372`.
    ///
    /// Use this method to interact with the `MockServer` using `TcpStream`s.
    ///
    /// ### Example:
    /// ```rust
    /// use requestmatcher::MockServer;
    /// use std::net::TcpStream;
    ///
    /// #[async_std::main]
    /// async fn main() {
    ///     // Act - the server is started
    ///     let mock_server = MockServer::start().await;
    ///
    ///     // Assert - we can connect to it
    ///     assert!(TcpStream::connect(mock_server.address()).is_ok());
    /// }
    /// ```
    pub fn address(&self) -> &SocketAddr {
        self.0.address()
    }

    /// Return a vector with all the requests received by the `MockServer` since the session
    /// started, `None` if request recording has been disabled.
    ///
    /// ### Example:
    /// ```rust
    /// use requestmatcher::{MockServer, RequestMatchers, ResponseTemplate};
    /// use requestmatcher::http::Method;
    ///
    /// #[async_std::main]
    /// async fn main() {
    ///     // Arrange
    ///     let mock_server = MockServer::start().await;
    ///     mock_server.add_response(ResponseTemplate::new(200), RequestMatchers::new());
    ///
    ///     // Act
    ///     reqwest::get(&mock_server.uri()).await.unwrap();
    ///
    ///     // Assert
    ///     let received_requests = mock_server.received_requests().unwrap();
    ///     assert_eq!(received_requests.len(), 1);
    ///
    ///     let received_request = &received_requests[0];
    ///     assert_eq!(received_request.method, Method::GET);
    ///     assert_eq!(received_request.url.path(), "/");
    ///     assert!(received_request.body.is_empty());
    /// }
    /// ```
    pub fn received_requests(&self) -> Option<Vec<Request>> {
        self.session().received_requests()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        if self.session().state() == SessionState::Finalized {
            return;
        }
        if std::thread::panicking() {
            // The test already failed: report, do not panic again.
            if let Err(Failure::Matching(e)) = self.finish(Err("the test panicked")) {
                error!("{}", e);
            }
        } else {
            self.verify();
        }
    }
}
