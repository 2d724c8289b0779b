use std::fmt::{self, Debug, Formatter, Write};

use http::{HeaderName, Method};
use serde_json::Value;
use url::Url;

use crate::error::ConfigurationError;
use crate::evaluation::{describe_evaluator, Dimension, Evaluate, EvaluationError, Mismatch};
use crate::matchers::{
    all_of, description_of, empty_map, equal_to, has_entry, is, is_empty_string, mismatch_of,
    AllOf, DescribeValue, Matcher,
};
use crate::request::{HeaderValues, QueryMap, Request};

/// A group of predicates an incoming request must satisfy, all of them, to claim an
/// expectation.
///
/// `RequestMatchers` is built fluently and then handed to [`MockServer::add_response`]:
///
/// ```rust
/// use requestmatcher::{MockServer, RequestMatchers, ResponseTemplate};
/// use requestmatcher::matchers::contains_string;
///
/// #[async_std::main]
/// async fn main() {
///     // Arrange
///     let mock_server = MockServer::start().await;
///
///     mock_server.add_response(
///         ResponseTemplate::new(201),
///         RequestMatchers::new()
///             .method_is("POST")
///             .path_is("/orders")
///             .headers_contain("Content-Type", "application/json")
///             .body_matches(contains_string("\"quantity\": 2")),
///     );
///
///     // Act
///     let status = reqwest::Client::new()
///         .post(format!("{}/orders", &mock_server.uri()))
///         .header("Content-Type", "application/json")
///         .body(r#"{"item": "book", "quantity": 2}"#)
///         .send()
///         .await
///         .unwrap()
///         .status();
///
///     // Assert
///     assert_eq!(status, 201);
/// }
/// ```
///
/// Each dimension is checked in a fixed order: method, path, query parameters, headers, body,
/// JSON body, request order and finally custom evaluators attached with [`and`].
///
/// Misusing the builder (setting the path twice, asking for an empty body that should also
/// match a predicate, ...) panics straight away with a [`ConfigurationError`] message.
///
/// [`MockServer::add_response`]: crate::MockServer::add_response
/// [`and`]: RequestMatchers::and
#[derive(Default)]
pub struct RequestMatchers {
    method: Option<Box<dyn Matcher<Method>>>,
    path: Option<Box<dyn Matcher<str>>>,
    queries: Option<AllOf<QueryMap>>,
    headers: Option<AllOf<HeaderValues>>,
    body: Option<BodyExpectation>,
    json_body: Option<AllOf<Value>>,
    order: Option<Box<dyn Matcher<u64>>>,
    evaluators: Vec<Box<dyn Evaluate>>,
}

enum BodyExpectation {
    Empty,
    Matching(AllOf<str>),
}

impl RequestMatchers {
    /// An empty group, matching every request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Match requests with the given HTTP method (case-insensitive).
    pub fn method_is<T: AsRef<str>>(self, method: T) -> Self {
        let method = method.as_ref().to_uppercase();
        match Method::from_bytes(method.as_bytes()) {
            Ok(method) => self.method_matches(is(method)),
            Err(_) => panic!("{}", ConfigurationError::InvalidMethod(method)),
        }
    }

    /// Require the method to satisfy `matcher`. One per group.
    pub fn method_matches<M: Matcher<Method> + 'static>(mut self, matcher: M) -> Self {
        set_once(&mut self.method, Box::new(matcher), Dimension::Method);
        self
    }

    /// Match requests on the exact path, ignoring the query string.
    ///
    /// A missing leading `/` is added for you.
    pub fn path_is<T: Into<String>>(self, path: T) -> Self {
        let path = path.into();

        if path.contains('?') {
            panic!("{}", ConfigurationError::QueryInPath(path));
        }

        if let Ok(url) = Url::parse(&path) {
            if let Some(host) = url.host_str() {
                panic!(
                    "{}",
                    ConfigurationError::HostInPath {
                        host: host.to_owned(),
                        suggestion: url.path().to_owned(),
                        path,
                    }
                );
            }
        }

        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };
        self.path_matches(equal_to(path))
    }

    /// Match requests whose path satisfies `matcher`.
    ///
    /// It conflicts with [`path_is`](RequestMatchers::path_is): a group has at most one path
    /// constraint.
    pub fn path_matches<M: Matcher<str> + 'static>(mut self, matcher: M) -> Self {
        set_once(&mut self.path, Box::new(matcher), Dimension::Path);
        self
    }

    /// Require a query parameter with the given value. Calls accumulate.
    pub fn queries_contain<K: Into<String>, V: Into<String>>(self, key: K, value: V) -> Self {
        self.queries_match(has_entry(key, value))
    }

    /// Require the query parameters to satisfy `matcher`. Calls accumulate.
    pub fn queries_match<M: Matcher<QueryMap> + 'static>(mut self, matcher: M) -> Self {
        push(&mut self.queries, Box::new(matcher));
        self
    }

    /// Require the request to carry no query parameters at all.
    pub fn has_no_queries(self) -> Self {
        self.queries_match(empty_map())
    }

    /// Require a header with the given value. Header names are case-insensitive.
    /// Calls accumulate.
    pub fn headers_contain<K: Into<String>, V: Into<String>>(self, key: K, value: V) -> Self {
        let key = key.into().to_lowercase();
        if HeaderName::from_bytes(key.as_bytes()).is_err() {
            panic!("{}", ConfigurationError::InvalidHeaderName(key));
        }
        self.headers_match(has_entry(key, value))
    }

    /// Require the headers to satisfy `matcher`. Calls accumulate.
    ///
    /// Header names are lower-cased and repeated headers joined with `,` before matching.
    pub fn headers_match<M: Matcher<HeaderValues> + 'static>(mut self, matcher: M) -> Self {
        push(&mut self.headers, Box::new(matcher));
        self
    }

    /// Require the body, decoded as UTF-8, to satisfy `matcher`. Calls accumulate.
    pub fn body_matches<M: Matcher<str> + 'static>(mut self, matcher: M) -> Self {
        let matcher: Box<dyn Matcher<str>> = Box::new(matcher);
        match &mut self.body {
            Some(BodyExpectation::Empty) => panic!("{}", ConfigurationError::ConflictingBody),
            Some(BodyExpectation::Matching(matchers)) => matchers.push(matcher),
            None => self.body = Some(BodyExpectation::Matching(all_of(vec![matcher]))),
        }
        self
    }

    /// Require the request to have no body.
    pub fn body_is_empty(mut self) -> Self {
        match &self.body {
            Some(BodyExpectation::Empty) => {
                panic!("{}", ConfigurationError::AlreadySet(Dimension::Body))
            }
            Some(BodyExpectation::Matching(_)) => {
                panic!("{}", ConfigurationError::ConflictingBody)
            }
            None => self.body = Some(BodyExpectation::Empty),
        }
        self
    }

    /// Require the body to be a JSON document satisfying `matcher`. Calls accumulate.
    ///
    /// A body that cannot be parsed as JSON never matches.
    pub fn body_as_json_matches<M: Matcher<Value> + 'static>(mut self, matcher: M) -> Self {
        push(&mut self.json_body, Box::new(matcher));
        self
    }

    /// Require the request to be the `order`-th one received by the server (1-based).
    pub fn order_is(self, order: u64) -> Self {
        if order == 0 {
            panic!("{}", ConfigurationError::ZeroOrder);
        }
        self.order_matches(is(order))
    }

    /// Require the arrival order of the request to satisfy `matcher`.
    pub fn order_matches<M: Matcher<u64> + 'static>(mut self, matcher: M) -> Self {
        set_once(&mut self.order, Box::new(matcher), Dimension::Order);
        self
    }

    /// Append a custom evaluator, run after every built-in dimension.
    pub fn and<E: Evaluate + 'static>(mut self, evaluator: E) -> Self {
        self.evaluators.push(Box::new(evaluator));
        self
    }

    fn run(
        &self,
        request: &Request,
        order: u64,
        fail_fast: bool,
    ) -> Result<Vec<Mismatch>, EvaluationError> {
        let mut mismatches = Vec::new();
        macro_rules! check {
            ($outcome:expr) => {
                if let Err(mismatch) = $outcome {
                    mismatches.push(mismatch);
                    if fail_fast {
                        return Ok(mismatches);
                    }
                }
            };
        }

        if let Some(matcher) = &self.method {
            check!(verify(Dimension::Method, matcher.as_ref(), &request.method));
        }
        if let Some(path) = &self.path {
            check!(verify(Dimension::Path, path.as_ref(), request.url.path()));
        }
        if let Some(matcher) = &self.queries {
            check!(verify(Dimension::Query, matcher, &request.query_map()));
        }
        if let Some(matcher) = &self.headers {
            check!(verify(Dimension::Headers, matcher, &request.header_values()));
        }

        let body = request.body_string();
        match &self.body {
            Some(BodyExpectation::Empty) => {
                check!(verify(Dimension::Body, &is_empty_string(), body.as_str()))
            }
            Some(BodyExpectation::Matching(matcher)) => {
                check!(verify(Dimension::Body, matcher, body.as_str()))
            }
            None => {}
        }
        if let Some(matcher) = &self.json_body {
            let outcome = match serde_json::from_str::<Value>(&body) {
                Ok(json) => verify(Dimension::JsonBody, matcher, &json),
                Err(e) => Err(Mismatch::new(
                    Dimension::JsonBody,
                    description_of(matcher),
                    format!("was not a valid JSON document ({})", e),
                )),
            };
            check!(outcome);
        }

        if let Some(matcher) = &self.order {
            check!(verify(Dimension::Order, matcher.as_ref(), &order));
        }

        for evaluator in &self.evaluators {
            if fail_fast {
                match evaluator.evaluate(request, order) {
                    Ok(()) => {}
                    Err(EvaluationError::Mismatch(mismatch)) => {
                        mismatches.push(mismatch);
                        return Ok(mismatches);
                    }
                    Err(fault) => return Err(fault),
                }
            } else {
                mismatches.extend(evaluator.explain(request, order)?);
            }
        }

        Ok(mismatches)
    }
}

fn set_once<V>(slot: &mut Option<V>, value: V, dimension: Dimension) {
    if slot.is_some() {
        panic!("{}", ConfigurationError::AlreadySet(dimension));
    }
    *slot = Some(value);
}

fn push<T: ?Sized + DescribeValue>(slot: &mut Option<AllOf<T>>, matcher: Box<dyn Matcher<T>>) {
    match slot {
        Some(matchers) => matchers.push(matcher),
        None => *slot = Some(all_of(vec![matcher])),
    }
}

fn verify<T, M>(dimension: Dimension, matcher: &M, actual: &T) -> Result<(), Mismatch>
where
    T: ?Sized + DescribeValue,
    M: Matcher<T> + ?Sized,
{
    if matcher.matches(actual) {
        Ok(())
    } else {
        Err(Mismatch::new(
            dimension,
            description_of(matcher),
            mismatch_of(matcher, actual),
        ))
    }
}

impl Evaluate for RequestMatchers {
    fn evaluate(&self, request: &Request, order: u64) -> Result<(), EvaluationError> {
        match self.run(request, order, true)?.into_iter().next() {
            Some(mismatch) => Err(EvaluationError::Mismatch(mismatch)),
            None => Ok(()),
        }
    }

    fn explain(&self, request: &Request, order: u64) -> Result<Vec<Mismatch>, EvaluationError> {
        self.run(request, order, false)
    }

    fn describe(&self, out: &mut dyn Write) -> fmt::Result {
        out.write_str("Request matchers group:\n")?;
        if let Some(matcher) = &self.method {
            write_line(out, &Dimension::Method, description_of(matcher.as_ref()))?;
        }
        if let Some(path) = &self.path {
            write_line(out, &Dimension::Path, description_of(path.as_ref()))?;
        }
        if let Some(matcher) = &self.queries {
            write_line(out, &Dimension::Query, description_of(matcher))?;
        }
        if let Some(matcher) = &self.headers {
            write_line(out, &Dimension::Headers, description_of(matcher))?;
        }
        match &self.body {
            Some(BodyExpectation::Empty) => write_line(
                out,
                &Dimension::Body,
                description_of::<str, _>(&is_empty_string()),
            )?,
            Some(BodyExpectation::Matching(matcher)) => {
                write_line(out, &Dimension::Body, description_of(matcher))?
            }
            None => {}
        }
        if let Some(matcher) = &self.json_body {
            write_line(out, &Dimension::JsonBody, description_of(matcher))?;
        }
        if let Some(matcher) = &self.order {
            write_line(out, &Dimension::Order, description_of(matcher.as_ref()))?;
        }
        for evaluator in &self.evaluators {
            let custom = Dimension::Custom("custom".to_owned());
            write_line(out, &custom, describe_evaluator(evaluator.as_ref()))?;
        }
        Ok(())
    }
}

fn write_line(out: &mut dyn Write, dimension: &Dimension, description: String) -> fmt::Result {
    writeln!(out, " - {}: {}", dimension, description)
}

impl fmt::Display for RequestMatchers {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Evaluate::describe(self, f)
    }
}

impl Debug for RequestMatchers {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // Matchers are trait objects: show their rendered description instead.
        f.debug_tuple("RequestMatchers")
            .field(&self.to_string())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchers::{contains_string, json_includes, matches_regex};
    use http::HeaderValue;
    use serde_json::json;

    fn get(target: &str) -> Request {
        Request::new(Method::GET, target).unwrap()
    }

    fn post(target: &str, body: &str) -> Request {
        let mut request = Request::new(Method::POST, target).unwrap();
        request.body = body.as_bytes().to_vec();
        request
    }

    #[test]
    fn an_empty_group_matches_everything() {
        let matchers = RequestMatchers::new();

        assert!(matchers.evaluate(&get("/anything"), 42).is_ok());
        assert_eq!(matchers.to_string(), "Request matchers group:\n");
    }

    #[test]
    fn rendering_lists_every_configured_dimension() {
        let matchers = RequestMatchers::new()
            .method_is("get")
            .path_is("get")
            .queries_contain("key", "value")
            .order_is(1);

        assert_eq!(
            matchers.to_string(),
            "Request matchers group:\n \
             - method: is <GET>\n \
             - path: is \"/get\"\n \
             - query parameters: map containing [\"key\"->\"value\"]\n \
             - request order: is <1>\n"
        );
    }

    #[test]
    fn evaluation_fails_fast_on_the_first_dimension() {
        let matchers = RequestMatchers::new().method_is("GET").path_is("/get");

        let outcome = matchers.evaluate(&post("/post", ""), 1);

        match outcome {
            Err(EvaluationError::Mismatch(mismatch)) => {
                assert_eq!(mismatch.dimension(), &Dimension::Method);
                assert_eq!(mismatch.expected(), "is <GET>");
                assert_eq!(mismatch.actual(), "was <POST>");
            }
            other => panic!("Expected a mismatch, got {:?}", other),
        }
    }

    #[test]
    fn explain_reports_every_dimension() {
        let matchers = RequestMatchers::new()
            .method_is("GET")
            .path_is("/get")
            .queries_contain("key", "value");

        let mismatches = matchers.explain(&post("/post?no_key=no_value", ""), 1).unwrap();

        let dimensions: Vec<_> = mismatches.iter().map(|m| m.dimension().clone()).collect();
        assert_eq!(
            dimensions,
            vec![Dimension::Method, Dimension::Path, Dimension::Query]
        );
        assert_eq!(
            mismatches[2].to_string(),
            "QUERY PARAMETERS did NOT match.\n\
             Expected: map containing [\"key\"->\"value\"]\n     \
             but: map was {\"no_key\"->\"no_value\"}"
        );
    }

    #[test]
    fn query_and_header_constraints_accumulate() {
        let matchers = RequestMatchers::new()
            .queries_contain("a", "1")
            .queries_contain("b", "2")
            .headers_contain("X-Token", "secret");

        let mut request = get("/?a=1&b=2");
        request
            .headers
            .insert("x-token", HeaderValue::from_static("secret"));

        assert!(matchers.evaluate(&request, 1).is_ok());
        assert!(matchers.evaluate(&get("/?a=1"), 1).is_err());
    }

    #[test]
    fn has_no_queries_rejects_query_strings() {
        let matchers = RequestMatchers::new().has_no_queries();

        assert!(matchers.evaluate(&get("/plain"), 1).is_ok());
        assert!(matchers.evaluate(&get("/plain?x=1"), 1).is_err());
    }

    #[test]
    fn body_constraints() {
        let empty = RequestMatchers::new().body_is_empty();
        assert!(empty.evaluate(&post("/", ""), 1).is_ok());
        assert!(empty.evaluate(&post("/", "data"), 1).is_err());

        let matching = RequestMatchers::new()
            .body_matches(contains_string("hello"))
            .body_matches(matches_regex("world$"));
        assert!(matching.evaluate(&post("/", "hello world"), 1).is_ok());
        assert!(matching.evaluate(&post("/", "hello there"), 1).is_err());
    }

    #[test]
    fn invalid_json_bodies_never_match() {
        let matchers = RequestMatchers::new().body_as_json_matches(json_includes(json!({"a": 1})));

        assert!(matchers
            .evaluate(&post("/", r#"{"a": 1, "b": 2}"#), 1)
            .is_ok());

        let mismatches = matchers.explain(&post("/", "not json"), 1).unwrap();
        assert_eq!(mismatches.len(), 1);
        assert_eq!(mismatches[0].dimension(), &Dimension::JsonBody);
        assert!(mismatches[0].actual().starts_with("was not a valid JSON document"));
    }

    #[test]
    fn order_is_compared_against_the_arrival_order() {
        let matchers = RequestMatchers::new().order_is(2);

        assert!(matchers.evaluate(&get("/"), 1).is_err());
        assert!(matchers.evaluate(&get("/"), 2).is_ok());
    }

    #[test]
    fn custom_evaluators_run_last() {
        let matchers = RequestMatchers::new().path_is("/signed").and(
            |request: &Request, _: u64| -> Result<(), EvaluationError> {
                if request.headers.contains_key("x-signature") {
                    Ok(())
                } else {
                    Err(Mismatch::custom("a signed request", "no signature").into())
                }
            },
        );

        let mismatches = matchers.explain(&get("/unsigned"), 1).unwrap();

        assert_eq!(mismatches.len(), 2);
        assert_eq!(mismatches[1].dimension().heading(), "CUSTOM ASSERTION");
        assert!(matchers
            .to_string()
            .ends_with(" - custom: a custom evaluator\n"));
    }

    #[test]
    fn evaluator_faults_are_propagated() {
        let matchers = RequestMatchers::new().and(
            |_: &Request, _: u64| -> Result<(), EvaluationError> {
                Err(EvaluationError::fault("signature service unavailable"))
            },
        );

        assert!(matches!(
            matchers.evaluate(&get("/"), 1),
            Err(EvaluationError::Fault(_))
        ));
        assert!(matchers.explain(&get("/"), 1).is_err());
    }

    #[test]
    #[should_panic(expected = "a body cannot be both empty and matching a predicate")]
    fn empty_body_conflicts_with_body_predicates() {
        RequestMatchers::new()
            .body_matches(contains_string("x"))
            .body_is_empty();
    }

    #[test]
    #[should_panic(expected = "Assertion on path is already set")]
    fn path_can_only_be_set_once() {
        RequestMatchers::new()
            .path_is("/a")
            .path_matches(matches_regex("^/b"));
    }

    #[test]
    #[should_panic(expected = "Assertion on method is already set")]
    fn method_can_only_be_set_once() {
        RequestMatchers::new().method_is("GET").method_is("POST");
    }

    #[test]
    #[should_panic(expected = "because it contains a `?`")]
    fn paths_cannot_contain_query_strings() {
        RequestMatchers::new().path_is("/a?b=c");
    }

    #[test]
    #[should_panic(expected = "Try replacing your path with `path_is(\"/api/v1\")`")]
    fn paths_cannot_contain_hosts() {
        RequestMatchers::new().path_is("https://example.com/api/v1");
    }

    #[test]
    #[should_panic(expected = "is not a valid HTTP method")]
    fn methods_are_validated() {
        RequestMatchers::new().method_is("GE T");
    }
}
