//! Canned response bodies stored on disk.
//!
//! Fixture paths are resolved against a root directory, `fixtures` by default (relative to the
//! working directory of the test binary, i.e. the crate root under `cargo test`).
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::FixtureError;

/// The default fixture root.
pub const FIXTURES_ROOT: &str = "fixtures";

/// Loads fixture files relative to a root directory.
#[derive(Debug, Clone)]
pub struct Fixtures {
    root: PathBuf,
}

impl Default for Fixtures {
    fn default() -> Self {
        Self::new(FIXTURES_ROOT)
    }
}

impl Fixtures {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Read a fixture as text.
    ///
    /// ### Example:
    /// ```rust
    /// use requestmatcher::fixtures::Fixtures;
    ///
    /// let fixtures = Fixtures::new("tests/fixtures");
    ///
    /// assert!(fixtures.read("body.json").unwrap().contains("\"name\""));
    /// assert!(fixtures.read("missing.json").is_err());
    /// ```
    pub fn read<P: AsRef<Path>>(&self, path: P) -> Result<String, FixtureError> {
        let path = self.root.join(path);
        fs::read_to_string(&path).map_err(|source| FixtureError { path, source })
    }

    /// Read a fixture as raw bytes, for binary payloads such as images.
    pub fn read_bytes<P: AsRef<Path>>(&self, path: P) -> Result<Vec<u8>, FixtureError> {
        let path = self.root.join(path);
        fs::read(&path).map_err(|source| FixtureError { path, source })
    }
}

/// Guess the MIME type of a fixture from its file extension (case-insensitive).
///
/// ```rust
/// use requestmatcher::fixtures::mime_type_from_extension;
///
/// assert_eq!(mime_type_from_extension("users/list.JSON"), Some("application/json"));
/// assert_eq!(mime_type_from_extension("notes.md"), None);
/// ```
pub fn mime_type_from_extension<P: AsRef<Path>>(path: P) -> Option<&'static str> {
    let extension = path.as_ref().extension()?.to_str()?.to_ascii_lowercase();
    let mime = match extension.as_str() {
        "json" => "application/json",
        "xml" => "text/xml",
        "html" | "htm" => "text/html",
        "js" => "text/javascript",
        "txt" => "text/plain",
        "css" => "text/css",
        "png" => "image/png",
        "jpg" => "image/jpeg",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        _ => return None,
    };
    Some(mime)
}
