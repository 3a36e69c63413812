//! Page parsing: optional regex narrowing, HTML tree construction and path
//! query evaluation.
//!
//! A path query is a CSS selector optionally followed by a target:
//!
//! * `a[href] @href` yields the `href` attribute of every match,
//! * `section.detail @html` yields the outer HTML of every match,
//! * `script#productld` (no target) yields the text content.

use std::borrow::Cow;
use std::str::FromStr;

use encoding_rs::Encoding;
use regex::{Regex, RegexBuilder};
use scraper::{ElementRef, Html, Selector};

/// Errors raised while compiling a path query or a narrowing pattern.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The selector part of a path query is not valid CSS.
    #[error("Invalid selector '{query}': {message}")]
    Selector {
        /// The full query as supplied.
        query: String,
        /// Parser message.
        message: String,
    },

    /// A narrowing pattern is not a valid regular expression.
    #[error("Invalid narrowing pattern '{pattern}': {source}")]
    Pattern {
        /// The pattern as supplied.
        pattern: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },
}

/// What a path query returns for each matched element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryTarget {
    /// Concatenated text content.
    Text,
    /// Value of the named attribute; elements without it are skipped.
    Attribute(String),
    /// Serialized outer HTML.
    Html,
}

/// A compiled path query.
#[derive(Debug, Clone)]
pub struct PathQuery {
    raw: String,
    selector: Selector,
    target: QueryTarget,
}

fn is_target_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ':'))
}

impl PathQuery {
    /// Compiles `query`.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Selector`] if the selector part does not parse.
    pub fn parse(query: &str) -> Result<Self, QueryError> {
        let trimmed = query.trim();
        let (css, target) = match trimmed.rsplit_once(" @") {
            Some((css, name)) if is_target_name(name) => {
                let target = if name == "html" {
                    QueryTarget::Html
                } else {
                    QueryTarget::Attribute(name.to_owned())
                };
                (css.trim(), target)
            }
            _ => (trimmed, QueryTarget::Text),
        };

        let selector = Selector::parse(css).map_err(|e| QueryError::Selector {
            query: query.to_owned(),
            message: e.to_string(),
        })?;

        Ok(Self {
            raw: query.to_owned(),
            selector,
            target,
        })
    }

    /// The query as originally written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// What each matched element yields.
    #[must_use]
    pub const fn target(&self) -> &QueryTarget {
        &self.target
    }

    /// Evaluates the query in document order.
    #[must_use]
    pub fn evaluate(&self, document: &Html) -> Vec<String> {
        document
            .select(&self.selector)
            .filter_map(|el| self.value_of(el))
            .collect()
    }

    fn value_of(&self, el: ElementRef<'_>) -> Option<String> {
        match &self.target {
            QueryTarget::Text => Some(el.text().collect()),
            QueryTarget::Attribute(name) => el.value().attr(name).map(str::to_owned),
            QueryTarget::Html => Some(el.html()),
        }
    }
}

impl FromStr for PathQuery {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Compiles narrowing patterns so that `.` also matches newlines.
///
/// # Errors
///
/// Returns [`QueryError::Pattern`] for the first pattern that does not
/// compile.
pub fn compile_narrowing<S: AsRef<str>>(patterns: &[S]) -> Result<Vec<Regex>, QueryError> {
    patterns
        .iter()
        .map(|p| {
            RegexBuilder::new(p.as_ref())
                .dot_matches_new_line(true)
                .build()
                .map_err(|source| QueryError::Pattern {
                    pattern: p.as_ref().to_owned(),
                    source,
                })
        })
        .collect()
}

/// Result of parsing one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// Values produced by a path query.
    Matches(Vec<String>),
    /// The serialized document, when no query was given.
    Document(String),
}

impl Extracted {
    /// Query matches, or an empty list for a whole document.
    #[must_use]
    pub fn into_matches(self) -> Vec<String> {
        match self {
            Self::Matches(values) => values,
            Self::Document(_) => Vec::new(),
        }
    }
}

/// Decodes `raw` with the charset named by `encoding`, defaulting to
/// UTF-8. Unknown labels fall back to lossy UTF-8.
fn decode<'a>(raw: &'a [u8], encoding: Option<&str>) -> Cow<'a, str> {
    let encoding = match encoding {
        None => encoding_rs::UTF_8,
        Some(label) => Encoding::for_label(label.trim().as_bytes()).unwrap_or_else(|| {
            log::warn!("Unknown page encoding '{label}', decoding as UTF-8");
            encoding_rs::UTF_8
        }),
    };

    let (content, _, had_errors) = encoding.decode(raw);
    if had_errors {
        log::debug!("Replaced malformed {} sequences", encoding.name());
    }
    content
}

/// Keeps only the regions of `content` matched by `narrow`, joined with
/// newlines. Returns `content` untouched when there are no patterns or no
/// pattern matches.
#[must_use]
pub fn narrow_content<'a>(content: &'a str, narrow: &[Regex]) -> Cow<'a, str> {
    let pieces: Vec<&str> = narrow
        .iter()
        .flat_map(|re| re.find_iter(content).map(|m| m.as_str()))
        .collect();

    if pieces.is_empty() {
        Cow::Borrowed(content)
    } else {
        Cow::Owned(pieces.join("\n"))
    }
}

/// Decodes `raw`, narrows it, parses it as HTML and evaluates `query`.
///
/// Malformed bytes are replaced rather than rejected, so every page yields
/// a result.
#[must_use]
pub fn extract(
    raw: &[u8],
    query: Option<&PathQuery>,
    encoding: Option<&str>,
    narrow: &[Regex],
) -> Extracted {
    let content = decode(raw, encoding);
    let content = narrow_content(&content, narrow);
    let document = Html::parse_document(&content);

    match query {
        Some(query) => Extracted::Matches(query.evaluate(&document)),
        None => Extracted::Document(document.html()),
    }
}
