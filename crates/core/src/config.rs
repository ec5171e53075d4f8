//! Domain configuration loading.
//!
//! Rules come from two layers of JSON files:
//!
//! - the standard layer, either the rule set bundled with this crate or a
//!   `domains.json` in an explicitly configured standard directory
//! - the custom layer, a `domains.json` in the user's config directory
//!   (`<pictures>/picgrab/config` by default)
//!
//! Both layers are merged by domain name. Custom records come first and
//! replace standard records of the same name. `download_directories.json`
//! files are merged the same way and then applied onto the domains.
//!
//! A broken standard layer is an error. A custom file that cannot be read
//! or parsed is skipped with a warning.
//!
//! # Example
//!
//! ```rust
//! use picgrab_core::config::ConfigLoader;
//!
//! let registry = ConfigLoader::new().load_registry().unwrap();
//! assert!(registry.match_url("http://dilbert.com/strip/2011-03-24").is_some());
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::domain::{APP_DIRECTORY, Domain, DomainRecord, DomainRegistry};
use crate::{PicgrabError, Result};

/// Rule set bundled with the library.
pub const BUNDLED_DOMAINS: &str = include_str!("../data/domains.json");

pub const DOMAINS_FILE: &str = "domains.json";
pub const DOWNLOAD_DIRECTORIES_FILE: &str = "download_directories.json";

/// Per-domain override of where images are saved.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadDirectory {
    pub name: String,
    #[serde(default)]
    pub directory: Option<String>,
    #[serde(default)]
    pub is_path_relative: Option<bool>,
}

impl DownloadDirectory {
    /// Writes the configured directory settings onto `record`.
    ///
    /// Blank directories and missing flags leave the record untouched.
    pub fn apply(&self, record: &mut DomainRecord) {
        if let Some(directory) = self.directory.as_ref().filter(|dir| !dir.trim().is_empty()) {
            record.download_directory = Some(directory.clone());
        }
        if let Some(relative) = self.is_path_relative {
            record.is_path_relative = relative;
        }
    }
}

/// Merges two lists by key, keeping all of `custom` followed by the entries
/// of `standard` whose key does not appear in `custom`.
pub fn merge_by_name<T>(custom: Vec<T>, standard: Vec<T>, key: impl Fn(&T) -> &str) -> Vec<T> {
    let names: HashSet<String> = custom.iter().map(|item| key(item).to_string()).collect();
    let mut merged = custom;
    merged.extend(standard.into_iter().filter(|item| !names.contains(key(item))));
    merged
}

/// Parses a `domains.json` document.
pub fn parse_domains(json: &str) -> Result<Vec<DomainRecord>> {
    Ok(serde_json::from_str(json)?)
}

/// Loads domain rules from the standard and custom layers.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    custom_dir: Option<PathBuf>,
    standard_dir: Option<PathBuf>,
}

impl ConfigLoader {
    /// A loader that only uses the bundled rule set.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ConfigLoaderBuilder {
        ConfigLoaderBuilder::new()
    }

    /// A loader reading custom rules from [`default_custom_dir`](Self::default_custom_dir).
    pub fn with_default_dirs() -> Self {
        let mut builder = ConfigLoaderBuilder::new();
        if let Some(custom_dir) = Self::default_custom_dir() {
            builder = builder.custom_dir(custom_dir);
        }
        builder.build()
    }

    /// `<pictures>/picgrab/config`
    pub fn default_custom_dir() -> Option<PathBuf> {
        dirs::picture_dir().map(|pictures| pictures.join(APP_DIRECTORY).join("config"))
    }

    pub fn custom_dir(&self) -> Option<&Path> {
        self.custom_dir.as_deref()
    }

    pub fn standard_dir(&self) -> Option<&Path> {
        self.standard_dir.as_deref()
    }

    /// Merged domain records with download directory overrides applied.
    ///
    /// # Errors
    ///
    /// Fails if the standard layer cannot be read or parsed.
    pub fn load_records(&self) -> Result<Vec<DomainRecord>> {
        let standard = match &self.standard_dir {
            Some(dir) => read_required::<DomainRecord>(&dir.join(DOMAINS_FILE))?,
            None => parse_domains(BUNDLED_DOMAINS)?,
        };
        let custom = self.read_custom::<DomainRecord>(DOMAINS_FILE);
        let mut records = merge_by_name(custom, standard, |record| record.name.as_str());

        let directories = self.load_download_directories()?;
        for record in &mut records {
            if let Some(directory) = directories.iter().find(|dir| dir.name == record.name) {
                directory.apply(record);
            }
        }

        debug!(count = records.len(), "loaded domain records");
        Ok(records)
    }

    /// Merged download directory overrides.
    pub fn load_download_directories(&self) -> Result<Vec<DownloadDirectory>> {
        let standard = match &self.standard_dir {
            Some(dir) => read_optional::<DownloadDirectory>(&dir.join(DOWNLOAD_DIRECTORIES_FILE))?,
            None => Vec::new(),
        };
        let custom = self.read_custom::<DownloadDirectory>(DOWNLOAD_DIRECTORIES_FILE);

        Ok(merge_by_name(custom, standard, |dir| dir.name.as_str()))
    }

    /// Compiled domains in merged order.
    ///
    /// # Errors
    ///
    /// Fails on an unreadable standard layer or on a pattern that does not compile.
    pub fn load_domains(&self) -> Result<Vec<Domain>> {
        self.load_records()?.into_iter().map(Domain::try_from).collect()
    }

    pub fn load_registry(&self) -> Result<DomainRegistry> {
        Ok(DomainRegistry::with_domains(self.load_domains()?))
    }

    /// Reloads `registry` in place; on error the registry keeps its current domains.
    pub fn reload(&self, registry: &DomainRegistry) -> Result<()> {
        registry.load(self.load_domains()?);
        Ok(())
    }

    fn read_custom<T: DeserializeOwned>(&self, file_name: &str) -> Vec<T> {
        let Some(dir) = &self.custom_dir else {
            return Vec::new();
        };

        let path = dir.join(file_name);
        match read_optional(&path) {
            Ok(items) => items,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring custom config file");
                Vec::new()
            }
        }
    }
}

fn read_required<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Err(PicgrabError::FileNotFound(path.to_path_buf()));
    }

    let json = fs::read_to_string(path)?;
    serde_json::from_str(&json)
        .map_err(|e| PicgrabError::ConfigError(format!("{}: {}", path.display(), e)))
}

fn read_optional<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if path.exists() { read_required(path) } else { Ok(Vec::new()) }
}

/// Builder for [`ConfigLoader`]
#[derive(Debug, Default)]
pub struct ConfigLoaderBuilder {
    custom_dir: Option<PathBuf>,
    standard_dir: Option<PathBuf>,
}

impl ConfigLoaderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom config directory
    pub fn custom_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.custom_dir = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set standard config directory, replacing the bundled rule set
    pub fn standard_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.standard_dir = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn build(self) -> ConfigLoader {
        ConfigLoader { custom_dir: self.custom_dir, standard_dir: self.standard_dir }
    }
}
