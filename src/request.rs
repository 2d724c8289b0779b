use std::collections::BTreeMap;
use std::fmt;

use http::{HeaderMap, Method};
use serde::de::DeserializeOwned;
use url::Url;

pub const BODY_PRINT_LIMIT: usize = 10_000;

/// Query parameters of a request, keyed by name.
///
/// When a parameter appears more than once the last occurrence wins.
pub type QueryMap = BTreeMap<String, String>;

/// Headers of a request as seen by header matchers.
///
/// Names are lower-cased; the values of a repeated header are joined with `,`.
pub type HeaderValues = BTreeMap<String, String>;

/// Specifies limitations on printing request bodies in diagnostics. For some mock servers
/// the bodies may be too large to reasonably print and it may be desirable to limit them.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BodyPrintLimit {
    /// Maximum length of a body to print in bytes.
    Limited(usize),
    /// There is no limit to the size of a body that may be printed.
    Unlimited,
}

impl Default for BodyPrintLimit {
    fn default() -> Self {
        BodyPrintLimit::Limited(BODY_PRINT_LIMIT)
    }
}

/// An incoming request to an instance of [`MockServer`].
///
/// Every evaluator gets an immutable reference to a `Request` together with the arrival
/// order assigned by the dispatcher.
///
/// [`MockServer`]: crate::MockServer
///
/// ### Implementation notes:
/// The body of a `hyper` request is a stream that gets consumed when read.
/// We read it once when the request arrives and store the bytes, so that every pending
/// expectation can look at the same body.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Request {
    /// Build a request by hand, mostly useful to exercise evaluators without a server.
    ///
    /// `target` is either an absolute url or a path (with an optional query string).
    pub fn new(method: Method, target: &str) -> Result<Self, url::ParseError> {
        let url = match Url::parse(target) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Url::parse("http://localhost")?.join(target)?
            }
            Err(e) => return Err(e),
        };
        Ok(Self {
            url,
            method,
            headers: HeaderMap::new(),
            body: Vec::new(),
        })
    }

    pub fn body_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// The body decoded as UTF-8, replacing invalid sequences.
    pub fn body_string(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// The decoded query parameters of the request url.
    pub fn query_map(&self) -> QueryMap {
        self.url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// The request headers flattened into a sorted name/value map.
    pub fn header_values(&self) -> HeaderValues {
        self.headers
            .keys()
            .map(|name| {
                let values = self
                    .headers
                    .get_all(name)
                    .iter()
                    .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
                    .collect::<Vec<_>>();
                (name.as_str().to_owned(), values.join(","))
            })
            .collect()
    }

    /// Path plus query string, e.g. `/get?key=value`.
    pub fn target(&self) -> String {
        match self.url.query() {
            Some(query) => format!("{}?{}", self.url.path(), query),
            None => self.url.path().to_owned(),
        }
    }

    /// Dump the request the way it showed up on the wire, one `> ` prefixed line per
    /// request line and header, followed by the body (if any).
    pub(crate) fn print_with_limit(
        &self,
        mut buffer: impl fmt::Write,
        body_print_limit: BodyPrintLimit,
    ) -> fmt::Result {
        write!(buffer, "> {} {}", self.method, self.target())?;
        for name in self.headers.keys() {
            let values = self
                .headers
                .get_all(name)
                .iter()
                .map(|value| String::from_utf8_lossy(value.as_bytes()))
                .collect::<Vec<_>>();
            let values = values.join(",");
            write!(buffer, "\n> {}: {}", name, values)?;
        }

        if self.body.is_empty() {
            return Ok(());
        }
        buffer.write_str("\n\n")?;

        match body_print_limit {
            BodyPrintLimit::Limited(limit) if self.body.len() > limit => {
                let mut written = false;
                for end_byte in limit..(limit + 4).min(self.body.len()) {
                    if let Ok(truncated) = std::str::from_utf8(&self.body[..end_byte]) {
                        written = true;
                        writeln!(buffer, "{}", truncated)?;
                        write!(
                            buffer,
                            "We truncated the body because it was too large: {} bytes (limit: {} bytes)",
                            self.body.len(),
                            limit
                        )?;
                        break;
                    }
                }
                if !written {
                    write!(
                        buffer,
                        "Body is likely binary (invalid utf-8) size is {} bytes",
                        self.body.len()
                    )?;
                }
                Ok(())
            }
            _ => {
                if let Ok(body) = std::str::from_utf8(&self.body) {
                    write!(buffer, "{}", body)
                } else {
                    write!(
                        buffer,
                        "Body is likely binary (invalid utf-8) size is {} bytes",
                        self.body.len()
                    )
                }
            }
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.print_with_limit(f, BodyPrintLimit::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn relative_targets_are_resolved_against_localhost() {
        let request = Request::new(Method::GET, "/get?key=value&other=1").unwrap();

        assert_eq!(request.url.as_str(), "http://localhost/get?key=value&other=1");
        assert_eq!(request.target(), "/get?key=value&other=1");
    }

    #[test]
    fn last_query_parameter_wins() {
        let request = Request::new(Method::GET, "/get?key=first&key=second").unwrap();

        let queries = request.query_map();

        assert_eq!(queries.len(), 1);
        assert_eq!(queries["key"], "second");
    }

    #[test]
    fn repeated_headers_are_joined() {
        let mut request = Request::new(Method::GET, "/").unwrap();
        request
            .headers
            .append("Accept", HeaderValue::from_static("text/plain"));
        request
            .headers
            .append("accept", HeaderValue::from_static("text/html"));

        let headers = request.header_values();

        assert_eq!(headers["accept"], "text/plain,text/html");
    }

    #[test]
    fn dump_contains_request_line_headers_and_body() {
        let mut request = Request::new(Method::POST, "/post").unwrap();
        request
            .headers
            .insert("key", HeaderValue::from_static("value"));
        request.body = br#"{"property": "value"}"#.to_vec();

        let dump = request.to_string();

        assert_eq!(
            dump,
            "> POST /post\n> key: value\n\n{\"property\": \"value\"}"
        );
    }

    #[test]
    fn long_bodies_are_truncated() {
        let mut request = Request::new(Method::POST, "/post").unwrap();
        request.body = vec![b'a'; 32];

        let mut dump = String::new();
        request
            .print_with_limit(&mut dump, BodyPrintLimit::Limited(8))
            .unwrap();

        assert!(dump.contains("aaaaaaaa\n"));
        assert!(dump.contains("32 bytes (limit: 8 bytes)"));
    }
}
