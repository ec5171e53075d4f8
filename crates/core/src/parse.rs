//! HTML parsing and DOM access.
//!
//! This module provides the [`Document`] and [`Element`] types used by
//! content accessors to query pages with CSS selectors.
//!
//! `scraper` itself never rejects markup, so [`Document::parse_markup`] runs
//! a small structural scan first. Unopened, unclosed and needless end tags
//! are common on real pages and are tolerated; a tag that is cut short by
//! another `<` or by the end of input is not.
//!
//! # Example
//!
//! ```rust
//! use picgrab_core::parse::Document;
//!
//! let html = r#"
//!     <html>
//!         <body>
//!             <h1>Title</h1>
//!             <img class="comic" src="/strip.png">
//!         </body>
//!     </html>
//! "#;
//!
//! let doc = Document::parse_markup(html).unwrap();
//! let images = doc.select("img.comic").unwrap();
//! assert_eq!(images[0].attr("src"), Some("/strip.png"));
//! ```

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;

use crate::{PicgrabError, Result};

static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?--!?>").expect("valid comment regex"));

const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source", "track", "wbr",
];

const RAW_TEXT_ELEMENTS: [&str; 4] = ["script", "style", "textarea", "title"];

/// A structural problem found while scanning markup.
///
/// Offsets are byte positions into the scanned markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseIssue {
    /// An end tag without a matching start tag.
    TagNotOpened { tag: String, offset: usize },
    /// A start tag that is never closed.
    TagNotClosed { tag: String },
    /// An end tag for an element that cannot have one, such as `</br>`.
    EndTagNotRequired { tag: String, offset: usize },
    /// A tag that contains another `<` before its closing `>`.
    MalformedTag { offset: usize },
    /// A tag, comment or declaration that runs into the end of input.
    UnterminatedTag { offset: usize },
}

impl ParseIssue {
    /// Whether parsing may continue despite this issue.
    pub fn is_tolerated(&self) -> bool {
        matches!(
            self,
            ParseIssue::TagNotOpened { .. } | ParseIssue::TagNotClosed { .. } | ParseIssue::EndTagNotRequired { .. }
        )
    }
}

impl fmt::Display for ParseIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseIssue::TagNotOpened { tag, offset } => write!(f, "end tag </{tag}> at {offset} was never opened"),
            ParseIssue::TagNotClosed { tag } => write!(f, "tag <{tag}> is never closed"),
            ParseIssue::EndTagNotRequired { tag, offset } => write!(f, "end tag </{tag}> at {offset} is not required"),
            ParseIssue::MalformedTag { offset } => write!(f, "malformed tag at {offset}"),
            ParseIssue::UnterminatedTag { offset } => write!(f, "unterminated tag at {offset}"),
        }
    }
}

/// Removes HTML comments, including ones closed with `--!>`.
pub fn strip_comments(markup: &str) -> String {
    COMMENT_RE.replace_all(markup, "").into_owned()
}

/// Scans markup for structural issues in document order.
///
/// Comments, doctype declarations and processing instructions are skipped,
/// as is the content of raw text elements like `<script>`. A lone `<` that
/// is not followed by a tag name counts as text.
pub fn scan_markup(markup: &str) -> Vec<ParseIssue> {
    let bytes = markup.as_bytes();
    let lower = markup.to_ascii_lowercase();
    let mut issues = Vec::new();
    let mut open: Vec<String> = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }

        let rest = &markup[i..];
        if rest.starts_with("<!--") {
            match markup[i + 4..].find("-->") {
                Some(end) => i += 4 + end + 3,
                None => {
                    issues.push(ParseIssue::UnterminatedTag { offset: i });
                    break;
                }
            }
            continue;
        }
        if rest.starts_with("<!") || rest.starts_with("<?") {
            match markup[i..].find('>') {
                Some(end) => i += end + 1,
                None => {
                    issues.push(ParseIssue::UnterminatedTag { offset: i });
                    break;
                }
            }
            continue;
        }

        let is_end = bytes.get(i + 1) == Some(&b'/');
        let name_start = if is_end { i + 2 } else { i + 1 };
        if !bytes.get(name_start).is_some_and(u8::is_ascii_alphabetic) {
            i += 1;
            continue;
        }

        let name_end = bytes[name_start..]
            .iter()
            .position(|b| !(b.is_ascii_alphanumeric() || *b == b'-' || *b == b':'))
            .map_or(bytes.len(), |p| name_start + p);
        let tag = lower[name_start..name_end].to_string();

        let Some(close) = find_tag_end(bytes, name_end) else {
            issues.push(ParseIssue::UnterminatedTag { offset: i });
            break;
        };
        let close = match close {
            TagEnd::Closed(close) => close,
            TagEnd::Interrupted(next) => {
                issues.push(ParseIssue::MalformedTag { offset: i });
                i = next;
                continue;
            }
        };

        if is_end {
            if VOID_ELEMENTS.contains(&tag.as_str()) {
                issues.push(ParseIssue::EndTagNotRequired { tag, offset: i });
            } else if let Some(position) = open.iter().rposition(|t| *t == tag) {
                for unclosed in open.drain(position..).skip(1) {
                    issues.push(ParseIssue::TagNotClosed { tag: unclosed });
                }
            } else {
                issues.push(ParseIssue::TagNotOpened { tag, offset: i });
            }
            i = close + 1;
            continue;
        }

        let self_closing = close > 0 && bytes[close - 1] == b'/';
        i = close + 1;
        if VOID_ELEMENTS.contains(&tag.as_str()) || self_closing {
            continue;
        }

        if RAW_TEXT_ELEMENTS.contains(&tag.as_str()) {
            match lower[i..].find(&format!("</{tag}")) {
                Some(end) => i += end,
                None => {
                    issues.push(ParseIssue::TagNotClosed { tag });
                    break;
                }
            }
        }
        open.push(tag);
    }

    issues.extend(open.into_iter().map(|tag| ParseIssue::TagNotClosed { tag }));
    issues
}

enum TagEnd {
    Closed(usize),
    Interrupted(usize),
}

/// Quotes only open a quoted value right after `=`; elsewhere, as in
/// `alt=O'Brien`, they are literal.
fn find_tag_end(bytes: &[u8], from: usize) -> Option<TagEnd> {
    let mut quote: Option<u8> = None;
    let mut previous: Option<u8> = None;
    for (offset, b) in bytes[from..].iter().enumerate() {
        let position = from + offset;
        match quote {
            Some(q) if *b == q => quote = None,
            Some(_) => {}
            None => match b {
                b'"' | b'\'' if previous == Some(b'=') => quote = Some(*b),
                b'>' => return Some(TagEnd::Closed(position)),
                b'<' => return Some(TagEnd::Interrupted(position)),
                _ => {}
            },
        }
        if !b.is_ascii_whitespace() {
            previous = Some(*b);
        }
    }
    None
}

/// Represents a parsed HTML document.
///
/// # Example
///
/// ```rust
/// use picgrab_core::parse::Document;
///
/// let html = "<html><head><title>Test</title></head><body><p>Hello</p></body></html>";
/// let doc = Document::parse_markup(html).unwrap();
/// assert_eq!(doc.title(), Some("Test".to_string()));
/// ```
pub struct Document {
    html: Html,
}

impl Document {
    /// Parses HTML without any structural validation.
    pub fn parse(html: &str) -> Self {
        Self { html: Html::parse_document(html) }
    }

    /// Parses HTML, rejecting empty input and markup with fatal structural issues.
    ///
    /// # Errors
    ///
    /// Returns [`PicgrabError::HtmlParseError`] for empty markup or for the
    /// first issue that is not [tolerated](ParseIssue::is_tolerated).
    pub fn parse_markup(markup: &str) -> Result<Self> {
        if markup.trim().is_empty() {
            return Err(PicgrabError::HtmlParseError("empty markup".to_string()));
        }

        let issues = scan_markup(markup);
        if let Some(fatal) = issues.iter().find(|issue| !issue.is_tolerated()) {
            return Err(PicgrabError::HtmlParseError(fatal.to_string()));
        }
        if !issues.is_empty() {
            debug!(count = issues.len(), "tolerated markup issues");
        }

        Ok(Self::parse(markup))
    }

    /// Gets the raw HTML representation.
    pub fn html(&self) -> &Html {
        &self.html
    }

    /// Selects elements using a CSS selector.
    ///
    /// # Errors
    ///
    /// Returns [`PicgrabError::InvalidSelector`] if the selector is invalid.
    ///
    /// # Example
    ///
    /// ```rust
    /// use picgrab_core::parse::Document;
    ///
    /// let html = r#"<p class="content">First</p><p class="content">Second</p>"#;
    /// let doc = Document::parse(html);
    /// let elements = doc.select("p.content").unwrap();
    /// assert_eq!(elements.len(), 2);
    /// ```
    pub fn select(&'_ self, selector: &str) -> Result<Vec<Element<'_>>> {
        let sel = Selector::parse(selector).map_err(|e| PicgrabError::InvalidSelector(format!("{selector}: {e}")))?;

        Ok(self.html.select(&sel).map(|el| Element { element: el }).collect())
    }

    /// Gets the title of the document.
    pub fn title(&self) -> Option<String> {
        let selector = Selector::parse("title").ok()?;
        self.html
            .select(&selector)
            .next()
            .map(|el| el.text().collect::<String>())
    }
}

/// A single element of a [`Document`].
///
/// # Example
///
/// ```rust
/// use picgrab_core::parse::Document;
///
/// let html = r#"<a href="https://example.com">Link text</a>"#;
/// let doc = Document::parse(html);
/// let link = &doc.select("a").unwrap()[0];
///
/// assert_eq!(link.text(), "Link text");
/// assert_eq!(link.attr("href"), Some("https://example.com"));
/// ```
#[derive(Clone, Debug)]
pub struct Element<'a> {
    element: scraper::ElementRef<'a>,
}

impl<'a> Element<'a> {
    /// Gets the inner HTML of this element, excluding its own tags.
    pub fn inner_html(&self) -> String {
        self.element.inner_html()
    }

    /// Gets the concatenation of all text nodes within this element.
    pub fn text(&self) -> String {
        self.element.text().collect()
    }

    /// Gets the value of an attribute, or `None` if it is not present.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.element.value().attr(name)
    }

    /// Gets the lowercase tag name of this element.
    pub fn tag_name(&self) -> String {
        self.element.value().name().to_lowercase()
    }
}
