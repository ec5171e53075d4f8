//! Content accessors.
//!
//! A [`ContentAccessor`] is a declarative rule that pulls zero or more strings
//! out of a parsed page (or out of the page URL itself) and rewrites each of
//! them with a regex capture pattern and a replacement template.
//!
//! # Example
//!
//! ```rust
//! use picgrab_core::accessor::ContentAccessor;
//! use picgrab_core::parse::Document;
//!
//! let doc = Document::parse(r#"<div class="strip"><img src="//cdn.example.com/1.png"></div>"#);
//! let accessor = ContentAccessor::attribute(".strip img", "src");
//!
//! assert_eq!(accessor.extract(&doc, "https://example.com/"), vec!["//cdn.example.com/1.png"]);
//! ```

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::split_url;
use crate::parse::Document;

/// Capture pattern used when a configuration record names none.
pub const DEFAULT_PATTERN: &str = "^(.*)$";

/// Replacement template used when a configuration record names none.
pub const DEFAULT_REPLACEMENT: &str = "$1";

static TEMPLATE_GROUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\$|\$&|\$(\d+)").expect("valid template group regex"));

/// What an accessor reads from each matched element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionKind {
    /// The value of an attribute.
    Attribute,
    /// The inner HTML.
    Html,
    /// The concatenated text content.
    Text,
    /// The path of the page URL; the document is not consulted.
    Url,
}

impl FromStr for ExtractionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "attribute" => Ok(Self::Attribute),
            "html" => Ok(Self::Html),
            "text" => Ok(Self::Text),
            "url" => Ok(Self::Url),
            other => Err(format!("unknown extraction kind: {other}")),
        }
    }
}

impl fmt::Display for ExtractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Attribute => "Attribute",
            Self::Html => "Html",
            Self::Text => "Text",
            Self::Url => "Url",
        };
        f.write_str(name)
    }
}

/// One extraction and transform rule.
///
/// Accessors deserialize from the JSON records used in domain configuration
/// files. Construction never fails: a record with an unknown `type`, a
/// pattern that does not compile, or an explicit `null` pattern or
/// replacement produces an accessor that [is not valid](Self::is_valid) and
/// extracts nothing.
#[derive(Debug, Clone, Deserialize)]
#[serde(from = "AccessorRecord")]
pub struct ContentAccessor {
    /// CSS selector, unused for [`ExtractionKind::Url`].
    pub selector: String,
    /// `None` when the configured kind is not one of the known kinds.
    pub kind: Option<ExtractionKind>,
    /// Attribute to read for [`ExtractionKind::Attribute`].
    pub attribute_name: String,
    pub capture_pattern: Option<Regex>,
    /// Replacement template in `regex` syntax (`${1}`).
    pub replacement: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessorRecord {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    selector: Option<String>,
    #[serde(default)]
    attribute_name: Option<String>,
    #[serde(default = "default_pattern")]
    pattern: Option<String>,
    #[serde(default = "default_replacement")]
    replace: Option<String>,
}

fn default_pattern() -> Option<String> {
    Some(DEFAULT_PATTERN.to_string())
}

fn default_replacement() -> Option<String> {
    Some(DEFAULT_REPLACEMENT.to_string())
}

impl From<AccessorRecord> for ContentAccessor {
    fn from(record: AccessorRecord) -> Self {
        let kind = match record.kind.parse() {
            Ok(kind) => Some(kind),
            Err(e) => {
                warn!(error = %e, "accessor will extract nothing");
                None
            }
        };

        let capture_pattern = record.pattern.and_then(|pattern| match Regex::new(&pattern) {
            Ok(regex) => Some(regex),
            Err(e) => {
                warn!(%pattern, error = %e, "accessor pattern does not compile");
                None
            }
        });

        Self {
            selector: record.selector.unwrap_or_default(),
            kind,
            attribute_name: record.attribute_name.unwrap_or_default(),
            capture_pattern,
            replacement: record.replace.as_deref().map(translate_template),
        }
    }
}

impl ContentAccessor {
    fn with_kind(kind: ExtractionKind, selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            kind: Some(kind),
            attribute_name: String::new(),
            capture_pattern: Regex::new(DEFAULT_PATTERN).ok(),
            replacement: Some(translate_template(DEFAULT_REPLACEMENT)),
        }
    }

    /// Reads `attribute_name` from every element matching `selector`.
    pub fn attribute(selector: &str, attribute_name: &str) -> Self {
        Self { attribute_name: attribute_name.to_string(), ..Self::with_kind(ExtractionKind::Attribute, selector) }
    }

    /// Reads the inner HTML of every element matching `selector`.
    pub fn html(selector: &str) -> Self {
        Self::with_kind(ExtractionKind::Html, selector)
    }

    /// Reads the text of every element matching `selector`.
    pub fn text(selector: &str) -> Self {
        Self::with_kind(ExtractionKind::Text, selector)
    }

    /// Reads the path of the page URL.
    pub fn url() -> Self {
        Self::with_kind(ExtractionKind::Url, "")
    }

    /// Replaces the capture pattern and replacement template.
    ///
    /// The template uses `$1` group references, as configuration files do.
    pub fn with_pattern(self, pattern: &str, replacement: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            capture_pattern: Some(Regex::new(pattern)?),
            replacement: Some(translate_template(replacement)),
            ..self
        })
    }

    /// Whether this accessor can extract anything at all.
    pub fn is_valid(&self) -> bool {
        let Some(kind) = self.kind else {
            return false;
        };

        self.capture_pattern
            .as_ref()
            .is_some_and(|pattern| !pattern.as_str().is_empty())
            && self.replacement.is_some()
            && (kind == ExtractionKind::Url || !self.selector.is_empty())
            && (kind != ExtractionKind::Attribute || !self.attribute_name.is_empty())
    }

    /// Runs the capture pattern and replacement over one raw value.
    ///
    /// Returns `None` when no pattern or replacement is configured.
    pub fn apply_pattern(&self, value: &str) -> Option<String> {
        let pattern = self.capture_pattern.as_ref()?;
        let replacement = self.replacement.as_deref()?;

        Some(pattern.replace_all(value, replacement).into_owned())
    }

    /// Extracts all values from `document`, or from `originating_url` for
    /// [`ExtractionKind::Url`].
    ///
    /// Invalid accessors and selectors that fail to parse yield an empty list.
    pub fn extract(&self, document: &Document, originating_url: &str) -> Vec<String> {
        if !self.is_valid() {
            debug!(selector = %self.selector, "skipping invalid accessor");
            return Vec::new();
        }
        let Some(kind) = self.kind else {
            return Vec::new();
        };

        let raw = match kind {
            ExtractionKind::Url => vec![split_url(originating_url).1],
            ExtractionKind::Attribute | ExtractionKind::Html | ExtractionKind::Text => {
                let elements = match document.select(&self.selector) {
                    Ok(elements) => elements,
                    Err(e) => {
                        warn!(error = %e, "accessor selector rejected");
                        return Vec::new();
                    }
                };

                elements
                    .iter()
                    .filter_map(|element| match kind {
                        ExtractionKind::Attribute => element.attr(&self.attribute_name).map(str::to_string),
                        ExtractionKind::Html => Some(element.inner_html()),
                        _ => Some(element.text()),
                    })
                    .collect()
            }
        };

        raw.iter().filter_map(|value| self.apply_pattern(value)).collect()
    }
}

/// Converts a `$1` style replacement template to `regex` syntax.
///
/// Numbered groups become `${1}` so that trailing letters stay literal,
/// `$&` becomes the whole match and `$$` stays an escaped dollar sign.
pub fn translate_template(template: &str) -> String {
    TEMPLATE_GROUP_RE
        .replace_all(template, |caps: &Captures| match caps.get(1) {
            Some(group) => format!("${{{}}}", group.as_str()),
            None if &caps[0] == "$&" => "${0}".to_string(),
            None => "$$".to_string(),
        })
        .into_owned()
}
