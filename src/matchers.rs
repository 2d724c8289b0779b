//! A collection of predicates that can be plugged into a [`RequestMatchers`] group.
//!
//! Each dimension of a request (method, path, query parameters, headers, body, JSON body and
//! arrival order) is checked by a [`Matcher`] over the matching Rust type.
//! If the set of matchers provided out-of-the-box is not enough for your specific testing needs
//! you can implement your own thanks to the [`Matcher`] trait.
//!
//! Furthermore, `Fn` closures that take an immutable reference to the checked value and return a
//! boolean automatically implement [`Matcher`] and can be used where a matcher is expected.
//!
//! [`RequestMatchers`]: crate::RequestMatchers
use crate::error::ConfigurationError;
use crate::request::QueryMap;
use assert_json_diff::{assert_json_matches_no_panic, CompareMode, Config};
use http::Method;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::fmt::{self, Write};

/// How a checked value is rendered in diagnostics, e.g. `<GET>` or `"/path"`.
pub trait DescribeValue {
    fn describe_value(&self, out: &mut dyn Write) -> fmt::Result;
}

impl DescribeValue for str {
    fn describe_value(&self, out: &mut dyn Write) -> fmt::Result {
        write!(out, "{:?}", self)
    }
}

impl DescribeValue for String {
    fn describe_value(&self, out: &mut dyn Write) -> fmt::Result {
        self.as_str().describe_value(out)
    }
}

impl DescribeValue for Method {
    fn describe_value(&self, out: &mut dyn Write) -> fmt::Result {
        write!(out, "<{}>", self)
    }
}

impl DescribeValue for u64 {
    fn describe_value(&self, out: &mut dyn Write) -> fmt::Result {
        write!(out, "<{}>", self)
    }
}

impl DescribeValue for QueryMap {
    fn describe_value(&self, out: &mut dyn Write) -> fmt::Result {
        out.write_char('{')?;
        for (i, (key, value)) in self.iter().enumerate() {
            if i > 0 {
                out.write_str(", ")?;
            }
            write!(out, "{:?}->{:?}", key, value)?;
        }
        out.write_char('}')
    }
}

impl DescribeValue for Value {
    fn describe_value(&self, out: &mut dyn Write) -> fmt::Result {
        write!(out, "<{}>", self)
    }
}

/// Anything that implements `Matcher<T>` can be used to check one dimension of an incoming
/// request inside a [`RequestMatchers`] group.
///
/// Besides deciding whether a value is acceptable, a matcher knows how to describe itself
/// (used to render pending expectations) and how to explain why a value was rejected
/// (used to build the "no matcher found" diagnostic).
///
/// ```rust
/// use requestmatcher::matchers::Matcher;
/// use std::fmt::{self, Write};
///
/// // Accept paths with an even number of segments.
/// struct EvenSegments;
///
/// impl Matcher<str> for EvenSegments {
///     fn matches(&self, path: &str) -> bool {
///         path.split('/').filter(|s| !s.is_empty()).count() % 2 == 0
///     }
///
///     fn describe(&self, out: &mut dyn Write) -> fmt::Result {
///         out.write_str("a path with an even number of segments")
///     }
/// }
///
/// assert!(EvenSegments.matches("/users/42"));
/// assert!(!EvenSegments.matches("/users"));
/// ```
///
/// [`RequestMatchers`]: crate::RequestMatchers
pub trait Matcher<T: ?Sized + DescribeValue>: Send + Sync {
    /// Given a reference to the checked value, determine if it is acceptable.
    fn matches(&self, actual: &T) -> bool;

    /// Write a short, deterministic description of what this matcher accepts.
    fn describe(&self, out: &mut dyn Write) -> fmt::Result;

    /// Explain why `actual` was rejected.
    fn describe_mismatch(&self, actual: &T, out: &mut dyn Write) -> fmt::Result {
        out.write_str("was ")?;
        actual.describe_value(out)
    }
}

/// Implement the `Matcher` trait for all closures, out of the box,
/// if their signature is compatible.
impl<T, F> Matcher<T> for F
where
    T: ?Sized + DescribeValue,
    F: Fn(&T) -> bool,
    F: Send + Sync,
{
    fn matches(&self, actual: &T) -> bool {
        self(actual)
    }

    fn describe(&self, out: &mut dyn Write) -> fmt::Result {
        out.write_str("a custom matcher")
    }
}

/// Render the description of a matcher into a `String`.
pub fn description_of<T, M>(matcher: &M) -> String
where
    T: ?Sized + DescribeValue,
    M: Matcher<T> + ?Sized,
{
    let mut out = String::new();
    // Writing into a `String` never fails.
    let _ = matcher.describe(&mut out);
    out
}

/// Render why `actual` was rejected by `matcher` into a `String`.
pub fn mismatch_of<T, M>(matcher: &M, actual: &T) -> String
where
    T: ?Sized + DescribeValue,
    M: Matcher<T> + ?Sized,
{
    let mut out = String::new();
    let _ = matcher.describe_mismatch(actual, &mut out);
    out
}

#[derive(Debug)]
/// Match values equal to the expected one.
///
/// ### Example:
/// ```rust
/// use requestmatcher::matchers::{is, Matcher};
/// use requestmatcher::http::Method;
///
/// assert!(is(Method::GET).matches(&Method::GET));
/// assert!(!is(3u64).matches(&4));
/// ```
pub struct Is<T>(T);

/// Shorthand for [`Is`].
pub fn is<T>(value: T) -> Is<T> {
    Is(value)
}

/// Match a string exactly.
pub fn equal_to<T: Into<String>>(value: T) -> Is<String> {
    Is(value.into())
}

impl<T> Matcher<T> for Is<T>
where
    T: DescribeValue + PartialEq + Send + Sync,
{
    fn matches(&self, actual: &T) -> bool {
        actual == &self.0
    }

    fn describe(&self, out: &mut dyn Write) -> fmt::Result {
        out.write_str("is ")?;
        self.0.describe_value(out)
    }
}

impl Matcher<str> for Is<String> {
    fn matches(&self, actual: &str) -> bool {
        actual == self.0
    }

    fn describe(&self, out: &mut dyn Write) -> fmt::Result {
        out.write_str("is ")?;
        self.0.describe_value(out)
    }
}

#[derive(Debug)]
/// Match everything.
pub struct Anything;

/// Shorthand for [`Anything`].
pub fn any() -> Anything {
    Anything
}

impl<T: ?Sized + DescribeValue> Matcher<T> for Anything {
    fn matches(&self, _actual: &T) -> bool {
        true
    }

    fn describe(&self, out: &mut dyn Write) -> fmt::Result {
        out.write_str("anything")
    }
}

#[derive(Debug)]
/// Match strings that contain the expected substring.
///
/// ### Example:
/// ```rust
/// use requestmatcher::matchers::{contains_string, Matcher};
///
/// let matcher = contains_string("\"property\": \"value\"");
/// assert!(matcher.matches(r#"{"property": "value"}"#));
/// ```
pub struct ContainsString(String);

/// Shorthand for [`ContainsString`].
pub fn contains_string<T: Into<String>>(part: T) -> ContainsString {
    ContainsString(part.into())
}

impl Matcher<str> for ContainsString {
    fn matches(&self, actual: &str) -> bool {
        actual.contains(self.0.as_str())
    }

    fn describe(&self, out: &mut dyn Write) -> fmt::Result {
        write!(out, "a string containing {:?}", self.0)
    }
}

#[derive(Debug)]
/// Match strings starting with the expected prefix.
pub struct StartsWith(String);

/// Shorthand for [`StartsWith`].
pub fn starts_with<T: Into<String>>(prefix: T) -> StartsWith {
    StartsWith(prefix.into())
}

impl Matcher<str> for StartsWith {
    fn matches(&self, actual: &str) -> bool {
        actual.starts_with(self.0.as_str())
    }

    fn describe(&self, out: &mut dyn Write) -> fmt::Result {
        write!(out, "a string starting with {:?}", self.0)
    }
}

#[derive(Debug)]
/// Match strings ending with the expected suffix.
pub struct EndsWith(String);

/// Shorthand for [`EndsWith`].
pub fn ends_with<T: Into<String>>(suffix: T) -> EndsWith {
    EndsWith(suffix.into())
}

impl Matcher<str> for EndsWith {
    fn matches(&self, actual: &str) -> bool {
        actual.ends_with(self.0.as_str())
    }

    fn describe(&self, out: &mut dyn Write) -> fmt::Result {
        write!(out, "a string ending with {:?}", self.0)
    }
}

#[derive(Debug)]
/// Match strings against a regular expression.
///
/// ### Example:
/// ```rust
/// use requestmatcher::matchers::{matches_regex, Matcher};
///
/// let matcher = matches_regex(r"^/hello/\d{3}$");
/// assert!(matcher.matches("/hello/123"));
/// assert!(!matcher.matches("/hello/world"));
/// ```
pub struct RegexMatcher(Regex);

/// Shorthand for [`RegexMatcher::new`].
pub fn matches_regex<T: Into<String>>(pattern: T) -> RegexMatcher {
    RegexMatcher::new(pattern)
}

impl RegexMatcher {
    pub fn new<T: Into<String>>(pattern: T) -> Self {
        let pattern = pattern.into();
        match Regex::new(&pattern) {
            Ok(regex) => Self(regex),
            Err(source) => panic!("{}", ConfigurationError::InvalidRegex { pattern, source }),
        }
    }
}

impl Matcher<str> for RegexMatcher {
    fn matches(&self, actual: &str) -> bool {
        self.0.is_match(actual)
    }

    fn describe(&self, out: &mut dyn Write) -> fmt::Result {
        write!(out, "a string matching the pattern {:?}", self.0.as_str())
    }
}

#[derive(Debug)]
/// Match empty strings.
pub struct EmptyString;

/// Shorthand for [`EmptyString`].
pub fn is_empty_string() -> EmptyString {
    EmptyString
}

impl Matcher<str> for EmptyString {
    fn matches(&self, actual: &str) -> bool {
        actual.is_empty()
    }

    fn describe(&self, out: &mut dyn Write) -> fmt::Result {
        out.write_str("(null or an empty string)")
    }
}

#[derive(Debug)]
/// Match maps (query parameters or headers) holding the expected key/value pair.
///
/// ### Example:
/// ```rust
/// use requestmatcher::matchers::{has_entry, Matcher};
/// use std::collections::BTreeMap;
///
/// let mut queries = BTreeMap::new();
/// queries.insert("key".to_string(), "value".to_string());
///
/// assert!(has_entry("key", "value").matches(&queries));
/// assert!(!has_entry("key", "other").matches(&queries));
/// ```
pub struct HasEntry(String, String);

/// Shorthand for [`HasEntry`].
pub fn has_entry<K: Into<String>, V: Into<String>>(key: K, value: V) -> HasEntry {
    HasEntry(key.into(), value.into())
}

impl Matcher<QueryMap> for HasEntry {
    fn matches(&self, actual: &QueryMap) -> bool {
        actual.get(&self.0) == Some(&self.1)
    }

    fn describe(&self, out: &mut dyn Write) -> fmt::Result {
        write!(out, "map containing [{:?}->{:?}]", self.0, self.1)
    }

    fn describe_mismatch(&self, actual: &QueryMap, out: &mut dyn Write) -> fmt::Result {
        out.write_str("map was ")?;
        actual.describe_value(out)
    }
}

#[derive(Debug)]
/// Match maps holding the expected key, whatever its value.
pub struct HasKey(String);

/// Shorthand for [`HasKey`].
pub fn has_key<K: Into<String>>(key: K) -> HasKey {
    HasKey(key.into())
}

impl Matcher<QueryMap> for HasKey {
    fn matches(&self, actual: &QueryMap) -> bool {
        actual.contains_key(&self.0)
    }

    fn describe(&self, out: &mut dyn Write) -> fmt::Result {
        write!(out, "map containing key {:?}", self.0)
    }

    fn describe_mismatch(&self, actual: &QueryMap, out: &mut dyn Write) -> fmt::Result {
        out.write_str("map was ")?;
        actual.describe_value(out)
    }
}

#[derive(Debug)]
/// Match empty maps.
pub struct EmptyMap;

/// Shorthand for [`EmptyMap`].
pub fn empty_map() -> EmptyMap {
    EmptyMap
}

impl Matcher<QueryMap> for EmptyMap {
    fn matches(&self, actual: &QueryMap) -> bool {
        actual.is_empty()
    }

    fn describe(&self, out: &mut dyn Write) -> fmt::Result {
        out.write_str("an empty map")
    }
}

/// Match JSON documents, either exactly or by inclusion.
///
/// Exact comparison ignores the ordering of object keys.
/// Inclusive comparison only checks that the fields of the expected document are present
/// (with the same values) in the actual one.
///
/// ### Example:
/// ```rust
/// use requestmatcher::matchers::{json_eq, json_includes, Matcher};
/// use serde_json::json;
///
/// let actual = json!({ "a": 1, "b": 2, "c": { "d": 1, "e": 2 } });
///
/// assert!(json_includes(json!({ "a": 1, "c": { "e": 2 } })).matches(&actual));
/// assert!(!json_eq(json!({ "a": 1 })).matches(&actual));
/// ```
pub struct JsonMatcher {
    expected: Value,
    mode: JsonMode,
}

#[derive(Debug, Clone, Copy)]
enum JsonMode {
    Exact,
    Inclusive,
}

/// Match JSON documents structurally equal to `expected`.
pub fn json_eq<T: Serialize>(expected: T) -> JsonMatcher {
    JsonMatcher::new(expected, JsonMode::Exact)
}

/// Match JSON documents that include every field of `expected`.
pub fn json_includes<T: Serialize>(expected: T) -> JsonMatcher {
    JsonMatcher::new(expected, JsonMode::Inclusive)
}

impl JsonMatcher {
    fn new<T: Serialize>(expected: T, mode: JsonMode) -> Self {
        let expected = match serde_json::to_value(expected) {
            Ok(value) => value,
            Err(source) => panic!("{}", ConfigurationError::InvalidJson(source)),
        };
        Self { expected, mode }
    }

    fn compare(&self, actual: &Value) -> Result<(), String> {
        let mode = match self.mode {
            JsonMode::Exact => CompareMode::Strict,
            JsonMode::Inclusive => CompareMode::Inclusive,
        };
        assert_json_matches_no_panic(actual, &self.expected, Config::new(mode))
    }
}

impl Matcher<Value> for JsonMatcher {
    fn matches(&self, actual: &Value) -> bool {
        self.compare(actual).is_ok()
    }

    fn describe(&self, out: &mut dyn Write) -> fmt::Result {
        match self.mode {
            JsonMode::Exact => write!(out, "JSON equal to {}", self.expected),
            JsonMode::Inclusive => write!(out, "JSON including {}", self.expected),
        }
    }

    fn describe_mismatch(&self, actual: &Value, out: &mut dyn Write) -> fmt::Result {
        match self.compare(actual) {
            Ok(()) => Ok(()),
            Err(diff) => {
                out.write_str("was ")?;
                actual.describe_value(out)?;
                write!(out, "\n{}", diff)
            }
        }
    }
}

#[derive(Debug)]
/// Match JSON documents holding `expected` at the given [JSON pointer](https://tools.ietf.org/html/rfc6901).
///
/// ### Example:
/// ```rust
/// use requestmatcher::matchers::{json_pointer, Matcher};
/// use serde_json::json;
///
/// let actual = json!({ "user": { "name": "ferris" } });
///
/// assert!(json_pointer("/user/name", "ferris").matches(&actual));
/// ```
pub struct JsonPointer {
    pointer: String,
    expected: Value,
}

/// Shorthand for [`JsonPointer`].
pub fn json_pointer<P: Into<String>, T: Serialize>(pointer: P, expected: T) -> JsonPointer {
    let expected = match serde_json::to_value(expected) {
        Ok(value) => value,
        Err(source) => panic!("{}", ConfigurationError::InvalidJson(source)),
    };
    JsonPointer {
        pointer: pointer.into(),
        expected,
    }
}

impl Matcher<Value> for JsonPointer {
    fn matches(&self, actual: &Value) -> bool {
        actual.pointer(&self.pointer) == Some(&self.expected)
    }

    fn describe(&self, out: &mut dyn Write) -> fmt::Result {
        write!(out, "JSON with {} at {:?}", self.expected, self.pointer)
    }

    fn describe_mismatch(&self, actual: &Value, out: &mut dyn Write) -> fmt::Result {
        match actual.pointer(&self.pointer) {
            Some(found) => write!(out, "{:?} was {}", self.pointer, found),
            None => write!(out, "{:?} was missing in {}", self.pointer, actual),
        }
    }
}

/// Negate another matcher.
pub struct Not<T: ?Sized>(Box<dyn Matcher<T>>);

/// Shorthand for [`Not`].
pub fn not<T, M>(matcher: M) -> Not<T>
where
    T: ?Sized + DescribeValue,
    M: Matcher<T> + 'static,
{
    Not(Box::new(matcher))
}

impl<T: ?Sized + DescribeValue> Matcher<T> for Not<T> {
    fn matches(&self, actual: &T) -> bool {
        !self.0.matches(actual)
    }

    fn describe(&self, out: &mut dyn Write) -> fmt::Result {
        out.write_str("not ")?;
        self.0.describe(out)
    }
}

/// Match when every inner matcher matches.
///
/// [`RequestMatchers`](crate::RequestMatchers) uses it to combine additive constraints on the
/// same dimension.
pub struct AllOf<T: ?Sized>(Vec<Box<dyn Matcher<T>>>);

/// Shorthand for [`AllOf`].
pub fn all_of<T: ?Sized + DescribeValue>(matchers: Vec<Box<dyn Matcher<T>>>) -> AllOf<T> {
    AllOf(matchers)
}

impl<T: ?Sized + DescribeValue> AllOf<T> {
    pub(crate) fn push(&mut self, matcher: Box<dyn Matcher<T>>) {
        self.0.push(matcher);
    }
}

impl<T: ?Sized + DescribeValue> Matcher<T> for AllOf<T> {
    fn matches(&self, actual: &T) -> bool {
        self.0.iter().all(|m| m.matches(actual))
    }

    fn describe(&self, out: &mut dyn Write) -> fmt::Result {
        describe_joined(&self.0, " and ", out)
    }

    fn describe_mismatch(&self, actual: &T, out: &mut dyn Write) -> fmt::Result {
        match self.0.iter().find(|m| !m.matches(actual)) {
            Some(failed) if self.0.len() == 1 => failed.describe_mismatch(actual, out),
            Some(failed) => {
                failed.describe(out)?;
                out.write_char(' ')?;
                failed.describe_mismatch(actual, out)
            }
            None => Ok(()),
        }
    }
}

/// Match when at least one inner matcher matches.
pub struct AnyOf<T: ?Sized>(Vec<Box<dyn Matcher<T>>>);

/// Shorthand for [`AnyOf`].
pub fn any_of<T: ?Sized + DescribeValue>(matchers: Vec<Box<dyn Matcher<T>>>) -> AnyOf<T> {
    AnyOf(matchers)
}

impl<T: ?Sized + DescribeValue> Matcher<T> for AnyOf<T> {
    fn matches(&self, actual: &T) -> bool {
        self.0.iter().any(|m| m.matches(actual))
    }

    fn describe(&self, out: &mut dyn Write) -> fmt::Result {
        describe_joined(&self.0, " or ", out)
    }
}

fn describe_joined<T: ?Sized + DescribeValue>(
    matchers: &[Box<dyn Matcher<T>>],
    separator: &str,
    out: &mut dyn Write,
) -> fmt::Result {
    if let [single] = matchers {
        return single.describe(out);
    }
    out.write_char('(')?;
    for (i, matcher) in matchers.iter().enumerate() {
        if i > 0 {
            out.write_str(separator)?;
        }
        matcher.describe(out)?;
    }
    out.write_char(')')
}

/// A closure matcher with a human-readable description.
///
/// ### Example:
/// ```rust
/// use requestmatcher::matchers::{custom, description_of, Matcher};
///
/// let odd = custom("an odd number", |n: &u64| n % 2 == 1);
///
/// assert!(odd.matches(&3));
/// assert_eq!(description_of::<u64, _>(&odd), "an odd number");
/// ```
pub struct Custom<F> {
    description: String,
    predicate: F,
}

/// Shorthand for [`Custom`].
pub fn custom<D: Into<String>, F>(description: D, predicate: F) -> Custom<F> {
    Custom {
        description: description.into(),
        predicate,
    }
}

impl<T, F> Matcher<T> for Custom<F>
where
    T: ?Sized + DescribeValue,
    F: Fn(&T) -> bool + Send + Sync,
{
    fn matches(&self, actual: &T) -> bool {
        (self.predicate)(actual)
    }

    fn describe(&self, out: &mut dyn Write) -> fmt::Result {
        out.write_str(&self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn queries(pairs: &[(&str, &str)]) -> QueryMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn descriptions_are_stable() {
        assert_eq!(description_of(&is(Method::GET)), "is <GET>");
        assert_eq!(description_of::<str, _>(&equal_to("/post")), "is \"/post\"");
        assert_eq!(description_of(&is(2u64)), "is <2>");
        assert_eq!(
            description_of(&has_entry("key", "value")),
            "map containing [\"key\"->\"value\"]"
        );
        assert_eq!(
            description_of(&is_empty_string()),
            "(null or an empty string)"
        );
    }

    #[test]
    fn mismatches_show_the_actual_value() {
        assert_eq!(mismatch_of(&is(Method::GET), &Method::POST), "was <POST>");
        assert_eq!(
            mismatch_of::<str, _>(&equal_to("/post"), "/get"),
            "was \"/get\""
        );
        assert_eq!(
            mismatch_of(&has_entry("key", "value"), &queries(&[("no_key", "no_value")])),
            "map was {\"no_key\"->\"no_value\"}"
        );
    }

    #[test]
    fn all_of_requires_every_matcher() {
        let matcher = all_of::<QueryMap>(vec![
            Box::new(has_entry("a", "1")),
            Box::new(has_entry("b", "2")),
        ]);

        assert!(matcher.matches(&queries(&[("a", "1"), ("b", "2"), ("c", "3")])));
        assert!(!matcher.matches(&queries(&[("a", "1")])));
        assert_eq!(
            description_of(&matcher),
            "(map containing [\"a\"->\"1\"] and map containing [\"b\"->\"2\"])"
        );
    }

    #[test]
    fn any_of_and_not() {
        let matcher = any_of::<str>(vec![Box::new(equal_to("/a")), Box::new(equal_to("/b"))]);
        assert!(matcher.matches("/b"));
        assert!(!matcher.matches("/c"));

        let negated = not::<str, _>(contains_string("secret"));
        assert!(negated.matches("public"));
        assert_eq!(
            description_of(&negated),
            "not a string containing \"secret\""
        );
    }

    #[test]
    fn closures_are_matchers() {
        let even = |n: &u64| n % 2 == 0;

        assert!(Matcher::<u64>::matches(&even, &4));
        assert_eq!(description_of::<u64, _>(&even), "a custom matcher");
    }

    #[test]
    fn json_mismatch_contains_the_diff() {
        let matcher = json_eq(json!({ "a": 1 }));

        let mismatch = mismatch_of(&matcher, &json!({ "a": 2 }));

        assert!(mismatch.starts_with("was <{\"a\":2}>"));
        assert!(mismatch.contains(".a"));
    }

    #[test]
    fn json_pointer_reports_missing_fields() {
        let matcher = json_pointer("/user/name", "ferris");

        assert!(!matcher.matches(&json!({ "user": {} })));
        assert_eq!(
            mismatch_of(&matcher, &json!({ "user": {} })),
            "\"/user/name\" was missing in {\"user\":{}}"
        );
    }

    #[test]
    #[should_panic(expected = "is not a valid regular expression")]
    fn invalid_regexes_are_rejected_immediately() {
        matches_regex("(unclosed");
    }
}
