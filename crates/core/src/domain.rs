//! Per-site rule sets and the registry that matches URLs against them.
//!
//! A [`Domain`] recognises a site by two regexes, one tested against the
//! scheme and host of a URL and one against everything after it. The
//! [`DomainRegistry`] tests its domains in registration order and returns
//! the first one where both match, so overlapping rule sets resolve to
//! whichever was registered first.
//!
//! # Example
//!
//! ```rust
//! use picgrab_core::accessor::ContentAccessor;
//! use picgrab_core::domain::{Domain, DomainRegistry};
//!
//! let xkcd = Domain::builder("xkcd.com", r"^https?://(?:www\.)?xkcd\.com$", r"^/(\d+)/?$")
//!     .image(ContentAccessor::attribute("#comic img", "src"))
//!     .build()
//!     .unwrap();
//!
//! let registry = DomainRegistry::with_domains(vec![xkcd]);
//! assert_eq!(registry.match_url("https://xkcd.com/1597/").map(|d| d.name), Some("xkcd.com".to_string()));
//! assert!(registry.match_url("https://xkcd.com/about").is_none());
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::accessor::ContentAccessor;
use crate::{PicgrabError, Result};

/// Directory below the pictures root that holds relative download directories.
pub const APP_DIRECTORY: &str = "picgrab";

/// Delimiter used when a domain configures none.
pub const DEFAULT_DELIMITER: &str = " - ";

static PROTOCOL_AND_DOMAIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(https?://.*?)/.*$").expect("valid protocol regex"));

static PATH_AFTER_DOMAIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://.*?(/.*)$").expect("valid path regex"));

static HOST_ONLY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^https?://[^/\s]+$").expect("valid host regex"));

/// Splits a URL into its scheme and host part and everything after it.
///
/// Input that has no path keeps the whole input as host part and gets an
/// empty path part.
///
/// ```rust
/// use picgrab_core::domain::split_url;
///
/// assert_eq!(
///     split_url("http://dilbert.com/strip/2011-03-24"),
///     ("http://dilbert.com".to_string(), "/strip/2011-03-24".to_string())
/// );
/// assert_eq!(split_url("https://xkcd.com"), ("https://xkcd.com".to_string(), String::new()));
/// ```
pub fn split_url(url: &str) -> (String, String) {
    let host = PROTOCOL_AND_DOMAIN_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map_or(url, |m| m.as_str());
    let path = PATH_AFTER_DOMAIN_RE
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map_or("", |m| m.as_str());

    (host.to_string(), path.to_string())
}

/// Whether `input` is an http(s) URL rather than markup.
pub fn is_url(input: &str) -> bool {
    PROTOCOL_AND_DOMAIN_RE.is_match(input) || HOST_ONLY_RE.is_match(input)
}

/// One site's scraping rules.
#[derive(Debug, Clone)]
pub struct Domain {
    /// Display name, also the key used when merging configuration files.
    pub name: String,
    /// Tested against the scheme and host part of a URL.
    pub host_pattern: Regex,
    /// Tested against the path part of a URL.
    pub path_pattern: Regex,
    /// Tried in order; the first accessor with results provides the images.
    pub image_accessors: Vec<ContentAccessor>,
    /// All of these contribute fragments to the file name.
    pub file_name_accessors: Vec<ContentAccessor>,
    pub file_name_fragment_delimiter: String,
    /// Download directory, relative to the pictures root unless `is_path_relative` is false.
    pub directory: PathBuf,
    pub is_path_relative: bool,
    /// Extension used when an image URL has none, including the leading dot.
    pub default_file_ending: String,
}

/// A domain as written in configuration files.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRecord {
    pub name: String,
    /// Host pattern.
    pub url: String,
    /// Path pattern.
    pub path: String,
    #[serde(default)]
    pub images: Vec<ContentAccessor>,
    #[serde(default)]
    pub file_name_fragments: Vec<ContentAccessor>,
    #[serde(default = "default_delimiter")]
    pub file_name_fragment_delimiter: String,
    #[serde(default)]
    pub download_directory: Option<String>,
    #[serde(default = "default_relative")]
    pub is_path_relative: bool,
    #[serde(default)]
    pub default_file_ending: String,
}

fn default_delimiter() -> String {
    DEFAULT_DELIMITER.to_string()
}

fn default_relative() -> bool {
    true
}

fn compile(domain: &str, pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|source| PicgrabError::InvalidPattern {
        domain: domain.to_string(),
        pattern: pattern.to_string(),
        source,
    })
}

impl TryFrom<DomainRecord> for Domain {
    type Error = PicgrabError;

    fn try_from(record: DomainRecord) -> Result<Self> {
        let host_pattern = compile(&record.name, &record.url)?;
        let path_pattern = compile(&record.name, &record.path)?;
        let directory = record
            .download_directory
            .filter(|dir| !dir.trim().is_empty())
            .unwrap_or_else(|| record.name.clone());

        Ok(Self {
            host_pattern,
            path_pattern,
            image_accessors: record.images,
            file_name_accessors: record.file_name_fragments,
            file_name_fragment_delimiter: record.file_name_fragment_delimiter,
            directory: PathBuf::from(directory),
            is_path_relative: record.is_path_relative,
            default_file_ending: record.default_file_ending,
            name: record.name,
        })
    }
}

impl Domain {
    /// Starts building a domain from its name and its two patterns.
    pub fn builder(name: impl Into<String>, host_pattern: impl Into<String>, path_pattern: impl Into<String>) -> DomainBuilder {
        DomainBuilder::new(name, host_pattern, path_pattern)
    }

    /// Whether both patterns match the respective parts of `url`.
    pub fn matches(&self, url: &str) -> bool {
        let (host, path) = split_url(url);
        self.matches_parts(&host, &path)
    }

    fn matches_parts(&self, host: &str, path: &str) -> bool {
        self.host_pattern.is_match(host) && self.path_pattern.is_match(path)
    }

    /// Directory images of this domain are saved to.
    ///
    /// Relative directories live below `<pictures_root>/picgrab`.
    pub fn download_directory(&self, pictures_root: &Path) -> PathBuf {
        if self.is_path_relative {
            pictures_root.join(APP_DIRECTORY).join(&self.directory)
        } else {
            self.directory.clone()
        }
    }
}

/// Builder for [`Domain`], mostly useful for tests and embedders that do not
/// load rules from JSON.
#[derive(Debug, Clone)]
pub struct DomainBuilder {
    record: DomainRecord,
}

impl DomainBuilder {
    pub fn new(name: impl Into<String>, host_pattern: impl Into<String>, path_pattern: impl Into<String>) -> Self {
        Self {
            record: DomainRecord {
                name: name.into(),
                url: host_pattern.into(),
                path: path_pattern.into(),
                images: Vec::new(),
                file_name_fragments: Vec::new(),
                file_name_fragment_delimiter: default_delimiter(),
                download_directory: None,
                is_path_relative: true,
                default_file_ending: String::new(),
            },
        }
    }

    pub fn image(mut self, accessor: ContentAccessor) -> Self {
        self.record.images.push(accessor);
        self
    }

    pub fn file_name_fragment(mut self, accessor: ContentAccessor) -> Self {
        self.record.file_name_fragments.push(accessor);
        self
    }

    pub fn delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.record.file_name_fragment_delimiter = delimiter.into();
        self
    }

    pub fn download_directory(mut self, directory: impl Into<String>, is_path_relative: bool) -> Self {
        self.record.download_directory = Some(directory.into());
        self.record.is_path_relative = is_path_relative;
        self
    }

    pub fn default_file_ending(mut self, ending: impl Into<String>) -> Self {
        self.record.default_file_ending = ending.into();
        self
    }

    /// # Errors
    ///
    /// Returns [`PicgrabError::InvalidPattern`] if a pattern does not compile.
    pub fn build(self) -> Result<Domain> {
        Domain::try_from(self.record)
    }
}

/// Ordered set of domains shared by concurrent resolutions.
///
/// [`load`](Self::load) swaps in a complete new set, so readers see either
/// the old or the new set and never a partially built one.
#[derive(Debug, Default)]
pub struct DomainRegistry {
    domains: RwLock<Arc<Vec<Domain>>>,
}

impl DomainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_domains(domains: Vec<Domain>) -> Self {
        Self { domains: RwLock::new(Arc::new(domains)) }
    }

    /// Replaces all registered domains.
    pub fn load(&self, domains: Vec<Domain>) {
        let next = Arc::new(domains);
        debug!(count = next.len(), "loading domains");
        *self.domains.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Snapshot of the registered domains in registration order.
    pub fn domains(&self) -> Arc<Vec<Domain>> {
        Arc::clone(&self.domains.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// The first registered domain matching `url`.
    pub fn match_url(&self, url: &str) -> Option<Domain> {
        if url.trim().is_empty() {
            return None;
        }

        let (host, path) = split_url(url);
        let found = self.domains().iter().find(|d| d.matches_parts(&host, &path)).cloned();
        debug!(%url, domain = ?found.as_ref().map(|d| d.name.as_str()), "matched url");
        found
    }

    pub fn find_by_name(&self, name: &str) -> Option<Domain> {
        self.domains().iter().find(|d| d.name == name).cloned()
    }

    pub fn len(&self) -> usize {
        self.domains().len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dilbert() -> Domain {
        Domain::builder("dilbert.com", r"^https?://dilbert\.com$", r"^/strip/((?:[0-9]+-?)+)$")
            .build()
            .unwrap()
    }

    fn catch_all(name: &str) -> Domain {
        Domain::builder(name, r"^https?://", ".*").build().unwrap()
    }

    #[test]
    fn test_split_url() {
        assert_eq!(
            split_url("https://www.schisslaweng.net/probe/"),
            ("https://www.schisslaweng.net".to_string(), "/probe/".to_string())
        );
        assert_eq!(
            split_url("https://example.com/a/b?c=d#e"),
            ("https://example.com".to_string(), "/a/b?c=d#e".to_string())
        );
    }

    #[test]
    fn test_split_url_without_path() {
        assert_eq!(split_url("https://xkcd.com"), ("https://xkcd.com".to_string(), String::new()));
        assert_eq!(split_url("<html></html>"), ("<html></html>".to_string(), String::new()));
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("http://dilbert.com/strip/2011-03-24"));
        assert!(is_url("https://xkcd.com"));
        assert!(!is_url("<html><body></body></html>"));
        assert!(!is_url("ftp://example.com/file"));
    }

    #[test]
    fn test_match() {
        let registry = DomainRegistry::with_domains(vec![dilbert()]);

        assert!(registry.match_url("http://dilbert.com/strip/2011-03-24").is_some());
        assert!(registry.match_url("https://dilbert.com/strip/2011-03-24").is_some());
        assert!(registry.match_url("http://dilbert.com/blog/2011-03-24").is_none());
        assert!(registry.match_url("http://notdilbert.com/strip/2011-03-24").is_none());
        assert!(registry.match_url("").is_none());
    }

    #[test]
    fn test_first_registered_wins() {
        let registry = DomainRegistry::with_domains(vec![catch_all("first"), dilbert(), catch_all("second")]);
        let matched = registry.match_url("http://dilbert.com/strip/2011-03-24").unwrap();

        assert_eq!(matched.name, "first");
    }

    #[test]
    fn test_load_replaces_everything() {
        let registry = DomainRegistry::new();
        assert!(registry.is_empty());

        registry.load(vec![dilbert(), catch_all("any")]);
        assert_eq!(registry.len(), 2);

        let snapshot = registry.domains();
        registry.load(vec![catch_all("other")]);

        assert_eq!(snapshot.len(), 2);
        assert_eq!(registry.len(), 1);
        assert!(registry.find_by_name("dilbert.com").is_none());
        assert!(registry.find_by_name("other").is_some());
    }

    #[test]
    fn test_concurrent_readers_see_whole_sets() {
        let registry = Arc::new(DomainRegistry::with_domains(vec![catch_all("a"), catch_all("b")]));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let len = registry.domains().len();
                        assert!(len == 2 || len == 3);
                    }
                })
            })
            .collect();

        for _ in 0..50 {
            registry.load(vec![catch_all("a"), catch_all("b"), catch_all("c")]);
            registry.load(vec![catch_all("a"), catch_all("b")]);
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn test_invalid_pattern() {
        let result = Domain::builder("broken", "(unclosed", ".*").build();
        assert!(matches!(result, Err(PicgrabError::InvalidPattern { ref domain, .. }) if domain == "broken"));
    }

    #[test]
    fn test_record_defaults() {
        let record: DomainRecord =
            serde_json::from_str(r#"{ "name": "Example", "url": "^https://example\\.com$", "path": ".*" }"#).unwrap();
        let domain = Domain::try_from(record).unwrap();

        assert_eq!(domain.file_name_fragment_delimiter, " - ");
        assert_eq!(domain.directory, PathBuf::from("Example"));
        assert!(domain.is_path_relative);
        assert_eq!(domain.default_file_ending, "");
        assert!(domain.image_accessors.is_empty());
    }

    #[test]
    fn test_download_directory() {
        let root = Path::new("/home/user/Pictures");
        let relative = Domain::builder("xkcd.com", ".*", ".*").build().unwrap();
        let absolute = Domain::builder("xkcd.com", ".*", ".*")
            .download_directory("/srv/comics", false)
            .build()
            .unwrap();

        assert_eq!(relative.download_directory(root), PathBuf::from("/home/user/Pictures/picgrab/xkcd.com"));
        assert_eq!(absolute.download_directory(root), PathBuf::from("/srv/comics"));
    }
}
