use crate::fixtures::{Fixtures, FIXTURES_ROOT};
use crate::mock_server::bare_server::BareMockServer;
use crate::mock_server::exposed_server::InnerServer;
use crate::request::{BodyPrintLimit, BODY_PRINT_LIMIT};
use crate::session::SessionConfig;
use crate::MockServer;
use http::{HeaderMap, HeaderName, HeaderValue};
use std::convert::TryInto;
use std::env;
use std::net::TcpListener;
use std::path::PathBuf;

/// A builder providing a fluent API to assemble a [`MockServer`] step-by-step.
/// Use [`MockServer::builder`] to get started.
pub struct MockServerBuilder {
    listener: Option<TcpListener>,
    record_incoming_requests: bool,
    body_print_limit: BodyPrintLimit,
    fixtures_root: PathBuf,
    guess_mime_type: bool,
    default_headers: HeaderMap,
    ignore_favicon: bool,
}

impl MockServerBuilder {
    pub(super) fn new() -> Self {
        let body_print_limit = match env::var("REQUESTMATCHER_BODY_PRINT_LIMIT")
            .ok()
            .and_then(|x| x.parse::<usize>().ok())
        {
            Some(limit) => BodyPrintLimit::Limited(limit),
            None => BodyPrintLimit::Limited(BODY_PRINT_LIMIT),
        };
        let fixtures_root = env::var_os("REQUESTMATCHER_FIXTURES_ROOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(FIXTURES_ROOT));
        Self {
            listener: None,
            record_incoming_requests: true,
            body_print_limit,
            fixtures_root,
            guess_mime_type: true,
            default_headers: HeaderMap::new(),
            ignore_favicon: true,
        }
    }

    /// Each instance of [`MockServer`] is, by default, running on a random
    /// port available on your local machine.
    /// With `MockServerBuilder::listener` you can choose to start the `MockServer`
    /// instance on a specific port you have already bound.
    ///
    /// ### Example:
    /// ```rust
    /// use requestmatcher::MockServer;
    ///
    /// #[async_std::main]
    /// async fn main() {
    ///     // Arrange
    ///     let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    ///     let expected_server_address = listener
    ///         .local_addr()
    ///         .expect("Failed to get server address.");
    ///
    ///     // Act
    ///     let mock_server = MockServer::builder().listener(listener).start().await;
    ///
    ///     // Assert
    ///     assert_eq!(&expected_server_address, mock_server.address());
    /// }
    /// ```
    pub fn listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// By default, [`MockServer`] will record all incoming requests to display
    /// more meaningful error messages when your expectations are not met.
    ///
    /// This can sometimes be undesirable (e.g. a long-lived server serving
    /// high volumes of traffic) - you can disable request recording using
    /// `MockServerBuilder::disable_request_recording`.
    ///
    /// ### Example (Request recording disabled):
    ///
    /// ```rust
    /// use requestmatcher::MockServer;
    ///
    /// #[async_std::main]
    /// async fn main() {
    ///     // Arrange
    ///     let mock_server = MockServer::builder().disable_request_recording().start().await;
    ///
    ///     // Act
    ///     let received_requests = mock_server.received_requests();
    ///
    ///     // Assert
    ///     assert!(received_requests.is_none());
    /// }
    /// ```
    pub fn disable_request_recording(mut self) -> Self {
        self.record_incoming_requests = false;
        self
    }

    /// The mock server prints the requests it received when a request cannot be matched or
    /// expectations are left unused. By default, the size of the printed body is limited
    /// (override the default with the `REQUESTMATCHER_BODY_PRINT_LIMIT` environment variable).
    pub fn body_print_limit(mut self, limit: BodyPrintLimit) -> Self {
        self.body_print_limit = limit;
        self
    }

    /// The directory fixture paths are resolved against, `fixtures` by default (override the
    /// default with the `REQUESTMATCHER_FIXTURES_ROOT` environment variable).
    pub fn fixtures_root<P: Into<PathBuf>>(mut self, root: P) -> Self {
        self.fixtures_root = root.into();
        self
    }

    /// Whether fixture responses get a "Content-Type" guessed from the fixture extension.
    /// Enabled by default.
    pub fn guess_mime_type(mut self, enabled: bool) -> Self {
        self.guess_mime_type = enabled;
        self
    }

    /// Add a header to every response that does not set it already.
    ///
    /// ### Example:
    /// ```rust
    /// use requestmatcher::{MockServer, RequestMatchers, ResponseTemplate};
    ///
    /// #[async_std::main]
    /// async fn main() {
    ///     // Arrange
    ///     let mock_server = MockServer::builder()
    ///         .default_header("Cache-Control", "no-store")
    ///         .start()
    ///         .await;
    ///     mock_server.add_response(ResponseTemplate::new(200), RequestMatchers::new());
    ///
    ///     // Act
    ///     let response = reqwest::get(&mock_server.uri()).await.unwrap();
    ///
    ///     // Assert
    ///     assert_eq!(response.headers()["cache-control"], "no-store");
    /// }
    /// ```
    pub fn default_header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        <K as TryInto<HeaderName>>::Error: std::fmt::Debug,
        V: TryInto<HeaderValue>,
        <V as TryInto<HeaderValue>>::Error: std::fmt::Debug,
    {
        let key = key.try_into().expect("Failed to convert into header name.");
        let value = value
            .try_into()
            .expect("Failed to convert into header value.");
        self.default_headers.append(key, value);
        self
    }

    /// Browsers ask for `/favicon.ico` on their own: by default such requests get a `404`
    /// without being matched against (or counted by) your expectations.
    pub fn ignore_favicon(mut self, enabled: bool) -> Self {
        self.ignore_favicon = enabled;
        self
    }

    /// Finalise the builder to get an instance of a [`BareMockServer`].
    pub(super) async fn build_bare(self) -> BareMockServer {
        let listener = if let Some(listener) = self.listener {
            listener
        } else {
            TcpListener::bind("127.0.0.1:0").expect("Failed to bind an OS port for a mock server.")
        };
        let config = SessionConfig {
            body_print_limit: self.body_print_limit,
            record_requests: self.record_incoming_requests,
            default_headers: self.default_headers,
            fixtures: Fixtures::new(self.fixtures_root),
            guess_mime_type: self.guess_mime_type,
            ignore_favicon: self.ignore_favicon,
        };
        BareMockServer::start(listener, config).await
    }

    /// Finalise the builder and launch the [`MockServer`] instance!
    pub async fn start(self) -> MockServer {
        MockServer::new(InnerServer::Bare(self.build_bare().await))
    }
}
