//! Resolving pages into downloadable images.
//!
//! The [`Resolver`] is the main entry point of this crate. Given a page URL
//! it finds the matching [`Domain`], fetches and parses the page, runs the
//! domain's accessors and returns one [`ResolvedImage`] per image: where to
//! download it from, what to call it and where to put it.
//!
//! Resolution fails soft. An unsupported site, an unreachable page, broken
//! markup and a page without images all produce an empty list; the reason
//! is logged. Callers that need to tell "not supported" apart from "nothing
//! found" check [`Resolver::match_url`] first.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use picgrab_core::{ConfigLoader, Resolver, ResolverConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(ConfigLoader::with_default_dirs().load_registry()?);
//! let resolver = Resolver::new(registry, ResolverConfig::default())?;
//!
//! for image in resolver.resolve("https://xkcd.com/1513/").await {
//!     println!("{} -> {}", image.image_url, image.target_path.display());
//! }
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use crate::Result;
use crate::domain::{Domain, DomainRegistry, is_url};
use crate::fetch::{FetchConfig, Fetcher, HttpFetcher};
use crate::parse::{Document, strip_comments};
use crate::sanitize::sanitize;

static SCHEME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)^(https?:)").expect("valid scheme regex"));

/// One image found on a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedImage {
    /// Absolute or protocol-completed URL of the image.
    pub image_url: String,
    /// Sanitized file name including sequence number and extension.
    pub file_name: String,
    /// Download directory of the domain joined with `file_name`.
    pub target_path: PathBuf,
}

/// Configuration for the [`Resolver`].
///
/// # Example
///
/// ```rust
/// use picgrab_core::ResolverConfig;
///
/// let config = ResolverConfig::builder()
///     .timeout(10)
///     .pictures_root("/tmp/pictures")
///     .build();
/// assert_eq!(config.fetch.timeout, 10);
/// ```
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// HTTP settings used by the default fetcher.
    pub fetch: FetchConfig,
    /// Root that relative download directories are placed under.
    pub pictures_root: PathBuf,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { fetch: FetchConfig::default(), pictures_root: default_pictures_root() }
    }
}

impl ResolverConfig {
    pub fn builder() -> ResolverConfigBuilder {
        ResolverConfigBuilder::new()
    }
}

/// Builder for [`ResolverConfig`].
pub struct ResolverConfigBuilder {
    config: ResolverConfig,
}

impl ResolverConfigBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self { config: ResolverConfig::default() }
    }

    /// Sets the request timeout in seconds.
    pub fn timeout(mut self, seconds: u64) -> Self {
        self.config.fetch.timeout = seconds;
        self
    }

    /// Sets the User-Agent header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.fetch.user_agent = user_agent.into();
        self
    }

    /// Sets the pictures root directory.
    pub fn pictures_root<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.pictures_root = path.as_ref().to_path_buf();
        self
    }

    pub fn build(self) -> ResolverConfig {
        self.config
    }
}

impl Default for ResolverConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The user's pictures directory, falling back to the home directory.
pub fn default_pictures_root() -> PathBuf {
    dirs::picture_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Turns page URLs into [`ResolvedImage`]s.
///
/// Resolvers hold no per-call state and can serve concurrent calls; the
/// registry may be reloaded while they run.
pub struct Resolver<F: Fetcher = HttpFetcher> {
    registry: Arc<DomainRegistry>,
    fetcher: F,
    config: ResolverConfig,
}

impl Resolver<HttpFetcher> {
    /// Creates a resolver fetching over HTTP with `config.fetch`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::PicgrabError::HttpError`] if the HTTP client cannot be built.
    pub fn new(registry: Arc<DomainRegistry>, config: ResolverConfig) -> Result<Self> {
        let fetcher = HttpFetcher::new(config.fetch.clone())?;
        Ok(Self { registry, fetcher, config })
    }
}

impl<F: Fetcher> Resolver<F> {
    /// Creates a resolver with a custom fetcher.
    pub fn with_fetcher(registry: Arc<DomainRegistry>, fetcher: F, config: ResolverConfig) -> Self {
        Self { registry, fetcher, config }
    }

    pub fn registry(&self) -> &Arc<DomainRegistry> {
        &self.registry
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// The domain responsible for `url`, if any.
    pub fn match_url(&self, url: &str) -> Option<Domain> {
        self.registry.match_url(url)
    }

    /// Fetches and parses `input` if it is a URL, otherwise parses it as markup.
    ///
    /// Comments are stripped from fetched pages before parsing.
    pub async fn load_document(&self, input: &str) -> Option<Document> {
        if input.trim().is_empty() {
            return None;
        }

        if is_url(input) {
            let markup = self.fetcher.fetch_text(input).await?;
            parse_logged(&strip_comments(&markup))
        } else {
            parse_logged(input)
        }
    }

    /// Resolves all images on the page at `input`.
    pub async fn resolve(&self, input: &str) -> Vec<ResolvedImage> {
        let Some(domain) = self.match_url(input) else {
            debug!("no domain configured for input");
            return Vec::new();
        };
        let Some(document) = self.load_document(input).await else {
            return Vec::new();
        };

        self.resolve_document(input, &document, &domain)
    }

    /// Resolves markup that was obtained elsewhere, matching the domain by `page_url`.
    pub fn resolve_markup(&self, page_url: &str, markup: &str) -> Vec<ResolvedImage> {
        let Some(domain) = self.match_url(page_url) else {
            debug!(%page_url, "no domain configured");
            return Vec::new();
        };
        let Some(document) = parse_logged(&strip_comments(markup)) else {
            return Vec::new();
        };

        self.resolve_document(page_url, &document, &domain)
    }

    /// Runs `domain`'s accessors over an already parsed page.
    pub fn resolve_document(&self, url: &str, document: &Document, domain: &Domain) -> Vec<ResolvedImage> {
        let image_urls = image_urls(url, document, domain);
        if image_urls.is_empty() {
            debug!(%url, domain = %domain.name, "no images found");
            return Vec::new();
        }

        let base_name = file_name(url, document, domain);
        let endings: Vec<String> = image_urls
            .iter()
            .map(|image_url| file_ending_from_url(image_url).unwrap_or_else(|| domain.default_file_ending.clone()))
            .collect();
        let directory = domain.download_directory(&self.config.pictures_root);

        let resolved: Vec<ResolvedImage> = image_urls
            .into_iter()
            .zip(number_file_names(&base_name, &endings))
            .map(|(image_url, file_name)| ResolvedImage { target_path: directory.join(&file_name), image_url, file_name })
            .collect();

        debug!(%url, domain = %domain.name, count = resolved.len(), "resolved images");
        resolved
    }
}

fn parse_logged(markup: &str) -> Option<Document> {
    Document::parse_markup(markup)
        .map_err(|e| warn!(error = %e, "page could not be parsed"))
        .ok()
}

/// Image URLs of the first image accessor that finds any.
///
/// Blank results are dropped and protocol-relative URLs get the scheme of `url`.
pub fn image_urls(url: &str, document: &Document, domain: &Domain) -> Vec<String> {
    domain
        .image_accessors
        .iter()
        .map(|accessor| {
            accessor
                .extract(document, url)
                .into_iter()
                .map(|image_url| image_url.trim().to_string())
                .filter(|image_url| !image_url.is_empty())
                .collect::<Vec<_>>()
        })
        .find(|found| !found.is_empty())
        .map(|found| found.iter().map(|image_url| complete_protocol(image_url, url)).collect())
        .unwrap_or_default()
}

/// Sanitized base file name built from all file name accessors.
pub fn file_name(url: &str, document: &Document, domain: &Domain) -> String {
    let fragments: Vec<String> = domain
        .file_name_accessors
        .iter()
        .flat_map(|accessor| accessor.extract(document, url))
        .map(|fragment| fragment.trim().to_string())
        .filter(|fragment| !fragment.is_empty())
        .collect();

    sanitize(&fragments.join(&domain.file_name_fragment_delimiter))
}

/// Prefixes a protocol-relative `//host/...` URL with the scheme of `page_url`.
///
/// Other URLs, and protocol-relative URLs resolved against a page without
/// an http(s) scheme, are returned unchanged.
///
/// ```rust
/// use picgrab_core::resolver::complete_protocol;
///
/// assert_eq!(
///     complete_protocol("//cdn.example.com/x.png", "https://site.example"),
///     "https://cdn.example.com/x.png"
/// );
/// ```
pub fn complete_protocol(image_url: &str, page_url: &str) -> String {
    if !image_url.starts_with("//") {
        return image_url.to_string();
    }

    match SCHEME_RE.captures(page_url) {
        Some(caps) => format!("{}{}", &caps[1], image_url),
        None => image_url.to_string(),
    }
}

/// Extension of the last path segment of `url`, including the dot.
pub fn file_ending_from_url(url: &str) -> Option<String> {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_string(),
    };

    let segment = path.rsplit('/').next()?;
    let dot = segment.rfind('.')?;
    let extension = &segment[dot + 1..];

    if dot == 0 || extension.is_empty() || !extension.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }

    Some(format!(".{extension}"))
}

/// Width of the zero-padded sequence numbers for `count` images.
///
/// This is the digit count of `count + 1`, so nine images are numbered
/// `01` to `09`.
pub fn pad_width(count: usize) -> usize {
    (count + 1).to_string().len()
}

/// File names for images sharing `base`, one per entry of `endings`.
///
/// A single image gets no sequence number; several are numbered from 1 in
/// order, zero-padded to [`pad_width`].
pub fn number_file_names(base: &str, endings: &[String]) -> Vec<String> {
    match endings {
        [] => Vec::new(),
        [ending] => vec![format!("{base}{ending}")],
        _ => {
            let width = pad_width(endings.len());
            endings
                .iter()
                .enumerate()
                .map(|(index, ending)| format!("{base}{:0width$}{ending}", index + 1))
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accessor::ContentAccessor;
    use std::collections::HashMap;

    const GALLERY: &str = r#"<html>
<head>
    <title>Gallery</title>
    <meta name="published" content="2017-03-29T10:00:00+00:00">
</head>
<body>
    <!-- <div class="gallery-item"><img src="/commented-out.jpg"> -->
    <h1>  Probe  </h1>
    <div class="gallery-item"><img src="//cdn.example.com/one.jpg"></div>
    <div class="gallery-item"><img src="https://cdn.example.com/two.png?size=large"></div>
    <div class="gallery-item"><img src="/three"></div>
</body>
</html>"#;

    #[derive(Default)]
    struct StaticFetcher {
        pages: HashMap<String, String>,
    }

    impl StaticFetcher {
        fn with_page(url: &str, markup: &str) -> Self {
            Self { pages: HashMap::from([(url.to_string(), markup.to_string())]) }
        }
    }

    impl Fetcher for StaticFetcher {
        async fn fetch_text(&self, url: &str) -> Option<String> {
            self.pages.get(url).cloned()
        }

        async fn fetch_bytes(&self, _url: &str) -> Option<Vec<u8>> {
            None
        }
    }

    fn gallery_domain() -> Domain {
        Domain::builder("Gallery", r"^https://gallery\.example$", r"^/(.*?)/.*$")
            .image(ContentAccessor::attribute(".missing img", "src"))
            .image(ContentAccessor::attribute(".gallery-item img", "src"))
            .file_name_fragment(
                ContentAccessor::attribute("meta[name=published]", "content")
                    .with_pattern(r"^(\d{4}-\d{2}-\d{2}).*$", "$1")
                    .unwrap(),
            )
            .file_name_fragment(ContentAccessor::text("h1"))
            .file_name_fragment(ContentAccessor::text(".subtitle"))
            .delimiter("_-_")
            .default_file_ending(".jpg")
            .build()
            .unwrap()
    }

    fn resolver(fetcher: StaticFetcher) -> Resolver<StaticFetcher> {
        let registry = Arc::new(DomainRegistry::with_domains(vec![gallery_domain()]));
        let config = ResolverConfig::builder().pictures_root("/pictures").build();
        Resolver::with_fetcher(registry, fetcher, config)
    }

    #[test]
    fn test_complete_protocol() {
        assert_eq!(complete_protocol("//cdn.example.com/x.png", "https://site.example"), "https://cdn.example.com/x.png");
        assert_eq!(complete_protocol("//cdn.example.com/x.png", "http://site.example/a/"), "http://cdn.example.com/x.png");
        assert_eq!(complete_protocol("//cdn.example.com/x.png", "HTTPS://site.example"), "HTTPS://cdn.example.com/x.png");
        assert_eq!(complete_protocol("https://a.example/x.png", "http://site.example"), "https://a.example/x.png");
        assert_eq!(complete_protocol("//cdn.example.com/x.png", "<html>"), "//cdn.example.com/x.png");
    }

    #[test]
    fn test_file_ending_from_url() {
        assert_eq!(file_ending_from_url("https://imgs.xkcd.com/comics/code_quality.png"), Some(".png".to_string()));
        assert_eq!(file_ending_from_url("https://cdn.example.com/two.png?size=large"), Some(".png".to_string()));
        assert_eq!(file_ending_from_url("https://media.giphy.com/media/abc/giphy.gif#x"), Some(".gif".to_string()));
        assert_eq!(file_ending_from_url("//cdn.example.com/a/b.JPEG"), Some(".JPEG".to_string()));
        assert_eq!(file_ending_from_url("http://assets.amuniversal.com/64a5e1b036e9012ea5cb00163e41dd5b"), None);
        assert_eq!(file_ending_from_url("https://example.com/dir.d/"), None);
        assert_eq!(file_ending_from_url("https://example.com/.hidden"), None);
    }

    #[test]
    fn test_pad_width() {
        assert_eq!(pad_width(1), 1);
        assert_eq!(pad_width(8), 1);
        assert_eq!(pad_width(9), 2);
        assert_eq!(pad_width(10), 2);
        assert_eq!(pad_width(99), 3);
    }

    #[test]
    fn test_number_file_names() {
        let ending = |n: usize| vec![".png".to_string(); n];

        assert!(number_file_names("base", &[]).is_empty());
        assert_eq!(number_file_names("base", &ending(1)), ["base.png"]);
        assert_eq!(number_file_names("base", &ending(3)), ["base1.png", "base2.png", "base3.png"]);

        let nine = number_file_names("base", &ending(9));
        assert_eq!(nine.first().map(String::as_str), Some("base01.png"));
        assert_eq!(nine.last().map(String::as_str), Some("base09.png"));

        let mixed = number_file_names("base", &[".jpg".to_string(), String::new()]);
        assert_eq!(mixed, ["base1.jpg", "base2"]);
    }

    #[test]
    fn test_numbered_names_sort_in_order() {
        for count in [2, 9, 10, 11, 99, 100] {
            let names = number_file_names("x", &vec![".png".to_string(); count]);
            let mut sorted = names.clone();
            sorted.sort();
            assert_eq!(names, sorted, "{count} images");
        }
    }

    #[test]
    fn test_image_urls_first_accessor_with_results_wins() {
        let document = Document::parse_markup(GALLERY).unwrap();
        let urls = image_urls("https://gallery.example/probe/", &document, &gallery_domain());

        assert_eq!(
            urls,
            [
                "https://cdn.example.com/one.jpg",
                "https://cdn.example.com/two.png?size=large",
                "/three"
            ]
        );
    }

    #[test]
    fn test_image_accessors_are_not_unioned() {
        let domain = Domain::builder("Both", ".*", ".*")
            .image(ContentAccessor::attribute("h1", "missing"))
            .image(ContentAccessor::attribute("meta[name=published]", "content"))
            .image(ContentAccessor::attribute(".gallery-item img", "src"))
            .build()
            .unwrap();
        let document = Document::parse_markup(GALLERY).unwrap();

        assert_eq!(image_urls("https://x/", &document, &domain), ["2017-03-29T10:00:00+00:00"]);
    }

    #[test]
    fn test_file_name_joins_all_fragments() {
        let document = Document::parse_markup(GALLERY).unwrap();
        assert_eq!(file_name("https://gallery.example/probe/", &document, &gallery_domain()), "2017-03-29_-_Probe");
    }

    #[test]
    fn test_file_name_without_fragments_falls_back_to_timestamp() {
        let domain = Domain::builder("Empty", ".*", ".*").build().unwrap();
        let document = Document::parse_markup(GALLERY).unwrap();
        let name = file_name("https://x/", &document, &domain);

        assert!(name.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_resolve_markup() {
        let images = resolver(StaticFetcher::default()).resolve_markup("https://gallery.example/probe/", GALLERY);

        assert_eq!(images.len(), 3);
        assert_eq!(images[0].image_url, "https://cdn.example.com/one.jpg");
        assert_eq!(images[0].file_name, "2017-03-29_-_Probe1.jpg");
        assert_eq!(images[1].file_name, "2017-03-29_-_Probe2.png");
        assert_eq!(images[2].file_name, "2017-03-29_-_Probe3.jpg");
        assert_eq!(images[2].target_path, PathBuf::from("/pictures/picgrab/Gallery/2017-03-29_-_Probe3.jpg"));
    }

    #[test]
    fn test_resolve_fetches_and_strips_comments() {
        let url = "https://gallery.example/probe/";
        let markup = GALLERY.replace("<h1>", "<!-- <h1<broken> --><h1>");
        let resolver = resolver(StaticFetcher::with_page(url, &markup));

        let images = tokio::runtime::Runtime::new().unwrap().block_on(async { resolver.resolve(url).await });

        assert_eq!(images.len(), 3);
        assert!(images.iter().all(|image| !image.image_url.contains("commented-out")));
    }

    #[test]
    fn test_resolve_unsupported_url_is_empty() {
        let resolver = resolver(StaticFetcher::with_page("https://other.example/probe/", GALLERY));
        let images = tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(async { resolver.resolve("https://other.example/probe/").await });

        assert!(images.is_empty());
    }

    #[test]
    fn test_resolve_fetch_failure_is_empty() {
        let resolver = resolver(StaticFetcher::default());
        let images = tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(async { resolver.resolve("https://gallery.example/probe/").await });

        assert!(images.is_empty());
    }

    #[test]
    fn test_resolve_broken_markup_is_empty() {
        let url = "https://gallery.example/probe/";
        let resolver = resolver(StaticFetcher::with_page(url, "<html<head><title>großartig</title>"));
        let images = tokio::runtime::Runtime::new().unwrap().block_on(async { resolver.resolve(url).await });

        assert!(images.is_empty());
    }

    #[test]
    fn test_resolve_page_without_images_is_empty() {
        let resolver = resolver(StaticFetcher::default());
        let images = resolver.resolve_markup("https://gallery.example/probe/", "<html><body><h1>Nothing</h1></body></html>");

        assert!(images.is_empty());
    }

    #[test]
    fn test_resolved_image_json() {
        let image = ResolvedImage {
            image_url: "https://a.example/x.png".to_string(),
            file_name: "x.png".to_string(),
            target_path: PathBuf::from("/pictures/picgrab/A/x.png"),
        };
        let json = serde_json::to_value(&image).unwrap();

        assert_eq!(json["imageUrl"], "https://a.example/x.png");
        assert_eq!(json["fileName"], "x.png");
        assert_eq!(json["targetPath"], "/pictures/picgrab/A/x.png");
    }

    #[test]
    fn test_resolver_config_builder() {
        let config = ResolverConfig::builder()
            .timeout(5)
            .user_agent("agent")
            .pictures_root("/tmp/p")
            .build();

        assert_eq!(config.fetch.timeout, 5);
        assert_eq!(config.fetch.user_agent, "agent");
        assert_eq!(config.pictures_root, PathBuf::from("/tmp/p"));
    }
}
