use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, Response, StatusCode};
use http_body_util::Full;
use hyper::body::Bytes;
use serde::Serialize;
use std::convert::TryInto;
use std::fmt;
use std::time::Duration;

/// How many bytes of the body are shown when a template is rendered in a failure report.
const BODY_PREVIEW_LIMIT: usize = 200;

/// The canned response returned by a [`MockServer`] when an expectation claims an incoming
/// request.
///
/// [`MockServer`]: crate::MockServer
#[derive(Clone, Debug)]
pub struct ResponseTemplate {
    mime: Option<HeaderValue>,
    status_code: StatusCode,
    headers: HeaderMap,
    body: Option<Vec<u8>>,
    delay: Option<Duration>,
}

// Templates are built inside tests: a wrong status code or header is a mistake in the test
// itself, so conversions panic instead of returning `Result`s.
impl ResponseTemplate {
    /// Start building a `ResponseTemplate` specifying the status code of the response.
    pub fn new<S>(s: S) -> Self
    where
        S: TryInto<StatusCode>,
        <S as TryInto<StatusCode>>::Error: std::fmt::Debug,
    {
        let status_code = s.try_into().expect("Failed to convert into status code.");
        Self {
            status_code,
            headers: HeaderMap::new(),
            mime: None,
            body: None,
            delay: None,
        }
    }

    /// Append a header `value` to list of headers with `key` as header name.
    ///
    /// Unlike `insert_header`, this function will not override the contents of a header.
    pub fn append_header<K, V>(mut self, key: K, value: V) -> Self
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
        self.headers.append(key, value);
        self
    }

    /// Insert a header `value` with `key` as header name, dropping any previous value.
    ///
    /// Headers set on the template always win over the default headers configured on the
    /// [`MockServer`](crate::MockServer).
    ///
    /// ### Example:
    /// ```rust
    /// use requestmatcher::{MockServer, RequestMatchers, ResponseTemplate};
    ///
    /// #[async_std::main]
    /// async fn main() {
    ///     // Arrange
    ///     let mock_server = MockServer::start().await;
    ///     let correlation_id = "1311db4f-fe65-4cb2-b514-1bb47f781aa7";
    ///     let template = ResponseTemplate::new(200).insert_header(
    ///         "X-Correlation-ID",
    ///         correlation_id
    ///     );
    ///     mock_server.add_response(template, RequestMatchers::new().method_is("GET"));
    ///
    ///     // Act
    ///     let res = reqwest::get(&mock_server.uri())
    ///         .await
    ///         .unwrap();
    ///
    ///     // Assert
    ///     assert_eq!(res.headers().get("X-Correlation-ID").unwrap().to_str().unwrap(), correlation_id);
    /// }
    /// ```
    pub fn insert_header<K, V>(mut self, key: K, value: V) -> Self
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
        self.headers.insert(key, value);
        self
    }

    /// Append multiple header key-value pairs.
    ///
    /// Existing header values will not be overridden.
    pub fn append_headers<K, V, I>(mut self, headers: I) -> Self
    where
        K: TryInto<HeaderName>,
        <K as TryInto<HeaderName>>::Error: std::fmt::Debug,
        V: TryInto<HeaderValue>,
        <V as TryInto<HeaderValue>>::Error: std::fmt::Debug,
        I: IntoIterator<Item = (K, V)>,
    {
        let headers = headers.into_iter().map(|(key, value)| {
            (
                key.try_into().expect("Failed to convert into header name."),
                value
                    .try_into()
                    .expect("Failed to convert into header value."),
            )
        });
        // `Extend<(HeaderName, T)>` appends.
        self.headers.extend(headers);
        self
    }

    /// Set the response body with bytes, without a "Content-Type".
    ///
    /// To set a body with bytes and a "Content-Type"
    /// [`set_body_raw`](#method.set_body_raw) can be used.
    pub fn set_body_bytes<B>(mut self, body: B) -> Self
    where
        B: TryInto<Vec<u8>>,
        <B as TryInto<Vec<u8>>>::Error: std::fmt::Debug,
    {
        let body = body.try_into().expect("Failed to convert into body.");
        self.body = Some(body);
        self
    }

    /// Set the response body from a JSON-serializable value.
    ///
    /// It sets "Content-Type" to "application/json".
    pub fn set_body_json<B: Serialize>(mut self, body: B) -> Self {
        let body = serde_json::to_vec(&body).expect("Failed to convert into body.");

        self.body = Some(body);
        self.mime = Some(HeaderValue::from_static("application/json"));
        self
    }

    /// Set the response body to a string.
    ///
    /// It sets "Content-Type" to "text/plain".
    pub fn set_body_string<T>(mut self, body: T) -> Self
    where
        T: TryInto<String>,
        <T as TryInto<String>>::Error: std::fmt::Debug,
    {
        let body = body.try_into().expect("Failed to convert into body.");

        self.body = Some(body.into_bytes());
        self.mime = Some(HeaderValue::from_static("text/plain"));
        self
    }

    /// Set a raw response body. The mime type needs to be set because the
    /// raw body could be of any type.
    ///
    /// ### Example:
    /// ```rust
    /// use requestmatcher::{MockServer, RequestMatchers, ResponseTemplate};
    ///
    /// mod external {
    ///     // This could be a method of a struct that is
    ///     // implemented in another crate and the struct
    ///     // does not implement Serialize.
    ///     pub fn body() -> Vec<u8>{
    ///         r#"{"hello": "world"}"#.as_bytes().to_owned()
    ///     }
    /// }
    ///
    /// #[async_std::main]
    /// async fn main() {
    ///     // Arrange
    ///     let mock_server = MockServer::start().await;
    ///     let template = ResponseTemplate::new(200).set_body_raw(
    ///         external::body(),
    ///         "application/json"
    ///     );
    ///     mock_server.add_response(template, RequestMatchers::new().method_is("GET"));
    ///
    ///     // Act
    ///     let res = reqwest::get(&mock_server.uri())
    ///         .await
    ///         .unwrap();
    ///     let content_type = res.headers().get(reqwest::header::CONTENT_TYPE).cloned();
    ///     let body = res.text()
    ///         .await
    ///         .unwrap();
    ///
    ///     // Assert
    ///     assert_eq!(body, r#"{"hello": "world"}"#);
    ///     assert_eq!(content_type, Some("application/json".parse().unwrap()));
    /// }
    /// ```
    pub fn set_body_raw<B>(mut self, body: B, mime: &str) -> Self
    where
        B: TryInto<Vec<u8>>,
        <B as TryInto<Vec<u8>>>::Error: std::fmt::Debug,
    {
        let body = body.try_into().expect("Failed to convert into body.");
        let mime: HeaderValue = mime
            .try_into()
            .expect("Failed to convert into header value.");
        self.body = Some(body);
        self.mime = Some(mime);
        self
    }

    /// By default the [`MockServer`] tries to fulfill incoming requests as fast as possible.
    ///
    /// You can use `set_delay` to introduce an artificial delay to simulate the behaviour of
    /// a real server with a non-negligible latency.
    ///
    /// In particular, you can use it to test the behaviour of your timeout policies.
    ///
    /// ### Example:
    /// ```rust
    /// use requestmatcher::{MockServer, RequestMatchers, ResponseTemplate};
    /// use std::time::Duration;
    ///
    /// #[async_std::main]
    /// async fn main() {
    ///     // Arrange
    ///     let mock_server = MockServer::start().await;
    ///     let delay = Duration::from_secs(1);
    ///     let template = ResponseTemplate::new(200).set_delay(delay);
    ///     mock_server.add_response(template, RequestMatchers::new().method_is("GET"));
    ///
    ///     // Act
    ///     let res = async_std::future::timeout(
    ///         // Shorter than the response delay!
    ///         delay / 3,
    ///         reqwest::get(&mock_server.uri())
    ///     )
    ///     .await;
    ///
    ///     // Assert - Timeout error!
    ///     assert!(res.is_err());
    ///     // The expectation was claimed nonetheless.
    ///     mock_server.verify();
    /// }
    /// ```
    ///
    /// [`MockServer`]: crate::MockServer
    pub fn set_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);

        self
    }

    pub fn status(&self) -> StatusCode {
        self.status_code
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Retrieve the response delay.
    pub fn delay(&self) -> Option<&Duration> {
        self.delay.as_ref()
    }

    /// Generate a response from the template.
    ///
    /// The content type (if any) is set first, then every default header the template does
    /// not set already.
    pub(crate) fn generate_response(&self, default_headers: &HeaderMap) -> Response<Full<Bytes>> {
        let mut headers = self.headers.clone();
        if let Some(mime) = &self.mime {
            headers.insert(CONTENT_TYPE, mime.clone());
        }
        for name in default_headers.keys() {
            if !headers.contains_key(name) {
                for value in default_headers.get_all(name) {
                    headers.append(name.clone(), value.clone());
                }
            }
        }

        let body = self.body.clone().unwrap_or_default();
        let mut response = Response::new(Full::new(Bytes::from(body)));
        *response.status_mut() = self.status_code;
        *response.headers_mut() = headers;
        response
    }
}

impl fmt::Display for ResponseTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.status_code)?;
        if let Some(mime) = &self.mime {
            write!(f, ", content-type: {}", String::from_utf8_lossy(mime.as_bytes()))?;
        }
        for (name, value) in &self.headers {
            write!(f, ", {}: {}", name, String::from_utf8_lossy(value.as_bytes()))?;
        }
        match &self.body {
            Some(body) if body.len() > BODY_PREVIEW_LIMIT => write!(
                f,
                ", body: {:?}... ({} bytes)",
                String::from_utf8_lossy(&body[..BODY_PREVIEW_LIMIT]),
                body.len()
            ),
            Some(body) => write!(f, ", body: {:?}", String::from_utf8_lossy(body)),
            None => Ok(()),
        }
    }
}
