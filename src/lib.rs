#![allow(clippy::needless_doctest_main)]
//! `requestmatcher` stands in for the HTTP dependencies of your application during tests: you
//! tell it which requests to expect and what to answer, it tells you whether your application
//! behaved.
//!
//! # Table of Contents
//! 1. [Getting started](#getting-started)
//! 2. [Request matchers](#request-matchers)
//! 3. [Ordering](#ordering)
//! 4. [Verification](#verification)
//! 5. [Fixtures](#fixtures)
//! 6. [Runtime compatibility](#runtime-compatibility)
//!
//! ## Getting started
//! ```rust
//! use requestmatcher::{MockServer, RequestMatchers, ResponseTemplate};
//! use requestmatcher::matchers::has_key;
//!
//! #[async_std::main]
//! async fn main() {
//!     // Start a background HTTP server on a random local port
//!     let mock_server = MockServer::start().await;
//!
//!     // Expect one GET request on '/hello' with a `who` query parameter.
//!     mock_server.add_response(
//!         ResponseTemplate::new(200).set_body_string("Hi!"),
//!         RequestMatchers::new()
//!             .method_is("GET")
//!             .path_is("/hello")
//!             .queries_match(has_key("who")),
//!     );
//!
//!     // If we probe the MockServer using any HTTP client it behaves as expected.
//!     let body = reqwest::get(format!("{}/hello?who=the+world", &mock_server.uri()))
//!         .await
//!         .unwrap()
//!         .text()
//!         .await
//!         .unwrap();
//!     assert_eq!(body, "Hi!");
//!
//!     // Every expectation was claimed, no request went unmatched.
//!     assert!(mock_server.finish(Ok::<(), String>(())).is_ok());
//! }
//! ```
//!
//! ## Request matchers
//!
//! A [`RequestMatchers`] group checks a request along several dimensions: method, path,
//! query parameters, headers, body, JSON body and arrival order. Each dimension takes a
//! [`Matcher`](matchers::Matcher) - check the [`matchers`] module for the built-in ones.
//!
//! When the built-in dimensions are not enough, implement [`Evaluate`] (or pass a closure)
//! and attach it with [`RequestMatchers::and`] or [`MockServer::add_evaluator`].
//!
//! ## Ordering
//!
//! Every expectation is claimed by at most one request. Incoming requests are compared to the
//! pending expectations in registration order and the first one accepting the request wins.
//! Use [`RequestMatchers::order_is`] to pin an expectation to the n-th request received by the
//! server.
//!
//! ## Verification
//!
//! A request no expectation accepts makes the server drop the connection and fails the session.
//! [`MockServer::finish`] combines the outcome of the session with the outcome of your test:
//! matching failures first, then your test error, then expectations left unused.
//!
//! If you do not call it, the [`MockServer`] verifies the session when it goes out of scope and
//! panics if it failed.
//!
//! ## Fixtures
//!
//! [`MockServer::add_fixture`] answers with the content of a file, with a "Content-Type"
//! guessed from its extension. See the [`fixtures`] module.
//!
//! ## Runtime compatibility
//!
//! Each [`MockServer`] runs on its own thread: `requestmatcher` can be used with both
//! [`async_std`] and [`tokio`] as futures runtimes.
//!
//! [`async_std`]: https://docs.rs/async-std/
//! [`tokio`]: https://docs.rs/tokio/
mod dispatcher;
mod error;
mod evaluation;
mod expectation;
mod expectation_set;
pub mod fixtures;
pub mod http;
pub mod matchers;
mod mock_server;
mod request;
mod request_matchers;
mod response_template;
mod session;
mod verification;

pub use dispatcher::{Dispatch, NoMatchReport};
pub use error::{ConfigurationError, Failure, FixtureError, MatchError};
pub use evaluation::{BoxError, Dimension, Evaluate, EvaluationError, Mismatch};
pub use expectation::ExpectationId;
pub use expectation_set::RejectedCandidate;
pub use mock_server::{MockServer, MockServerBuilder};
pub use request::{BodyPrintLimit, HeaderValues, QueryMap, Request};
pub use request_matchers::RequestMatchers;
pub use response_template::ResponseTemplate;
pub use session::{Session, SessionConfig, SessionState};
pub use verification::{UnusedExpectation, UnusedReport};
