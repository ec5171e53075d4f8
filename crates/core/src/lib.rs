pub mod accessor;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod fetch;
pub mod parse;
pub mod resolver;
pub mod sanitize;

pub use accessor::{ContentAccessor, ExtractionKind};
pub use config::{ConfigLoader, ConfigLoaderBuilder, DownloadDirectory};
pub use domain::{Domain, DomainBuilder, DomainRecord, DomainRegistry, split_url};
pub use download::{save_all, save_image};
pub use error::{PicgrabError, Result};
pub use fetch::{FetchConfig, Fetcher, HttpFetcher};
pub use fetch::{fetch_bytes, fetch_file, fetch_stdin, fetch_url};
pub use parse::{Document, Element, ParseIssue};
pub use resolver::{ResolvedImage, Resolver, ResolverConfig, ResolverConfigBuilder, default_pictures_root};
pub use sanitize::sanitize;
