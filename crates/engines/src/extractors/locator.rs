// ABOUTME: Locator and LocatorChain data models for per-field extraction rules.
// ABOUTME: Chains are ordered; the resolver walks them earliest-first and the first non-empty match wins.

//! Locator definitions for configurable field extraction.
//!
//! Engine configuration spells locators compactly:
//!
//! - `"h1.headline"` reads the normalized text of the first matching element
//!   (or its `content` attribute when the element is a `<meta>` tag)
//! - `["time[datetime]", "datetime"]` reads an attribute
//! - `{"meta": "og:title"}` reads a metadata tag by `property`, `name` or `itemprop`
//! - `{"paragraphs": "div.entry-content"}` joins the body paragraphs of a region

use serde::{Deserialize, Serialize};

use crate::extractors::compiled;

/// A single extraction rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Locator {
    /// Text of the first matching element, e.g., "h1.headline"
    Css(String),
    /// Attribute of the first matching element, e.g., ["time", "datetime"]
    CssAttr(Vec<String>),
    /// Content of a metadata tag, e.g., {"meta": "og:title"}
    Meta { meta: String },
    /// Qualifying `<p>` descendants of a region, joined by spaces
    Paragraphs { paragraphs: String },
}

impl Locator {
    /// Shorthand for a text locator.
    pub fn css(css: impl Into<String>) -> Self {
        Locator::Css(css.into())
    }

    /// Shorthand for an attribute locator.
    pub fn attr(css: impl Into<String>, attr: impl Into<String>) -> Self {
        Locator::CssAttr(vec![css.into(), attr.into()])
    }

    /// Shorthand for a metadata-tag locator.
    pub fn meta(name: impl Into<String>) -> Self {
        Locator::Meta { meta: name.into() }
    }

    /// Shorthand for a paragraph-region locator.
    pub fn paragraphs(scope: impl Into<String>) -> Self {
        Locator::Paragraphs {
            paragraphs: scope.into(),
        }
    }

    /// CSS selector strings this locator will compile at match time.
    pub fn selector_strings(&self) -> Vec<String> {
        match self {
            Locator::Css(css) => vec![css.clone()],
            Locator::CssAttr(parts) => parts.first().cloned().into_iter().collect(),
            Locator::Meta { meta } => meta_selectors(meta),
            Locator::Paragraphs { paragraphs } => vec![paragraphs.clone(), "p".to_string()],
        }
    }
}

/// Builds the selectors a metadata-tag lookup tries, in order.
pub(crate) fn meta_selectors(name: &str) -> Vec<String> {
    let escaped = name.replace('"', "\\\"");
    ["property", "name", "itemprop"]
        .iter()
        .map(|attr| format!("meta[{attr}=\"{escaped}\"]"))
        .collect()
}

fn default_min_paragraph_chars() -> usize {
    20
}

/// Ordered extraction rules for one logical field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorChain {
    /// Rules tried in order; earliest non-empty match wins
    #[serde(default)]
    pub selectors: Vec<Locator>,
    /// Regexes removed from the matched text (site-name suffixes, bylines)
    #[serde(default)]
    pub strip: Vec<String>,
    /// Paragraphs containing any of these (case-insensitive) are dropped
    #[serde(default)]
    pub skip_phrases: Vec<String>,
    /// Paragraphs with fewer characters than this are dropped
    #[serde(default = "default_min_paragraph_chars")]
    pub min_paragraph_chars: usize,
}

impl Default for LocatorChain {
    fn default() -> Self {
        Self {
            selectors: Vec::new(),
            strip: Vec::new(),
            skip_phrases: Vec::new(),
            min_paragraph_chars: default_min_paragraph_chars(),
        }
    }
}

impl LocatorChain {
    /// Creates a chain from the given locators with default clean-up settings.
    pub fn new(selectors: Vec<Locator>) -> Self {
        Self {
            selectors,
            ..Default::default()
        }
    }

    /// Adds a strip regex.
    pub fn strip(mut self, pattern: impl Into<String>) -> Self {
        self.strip.push(pattern.into());
        self
    }

    /// Returns true when the chain has no locators at all.
    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    /// Compiles every selector and regex this chain uses, returning the ones
    /// that are invalid.
    pub fn precompile(&self) -> Vec<String> {
        let mut bad = compiled::precompile_selectors(
            self.selectors.iter().flat_map(Locator::selector_strings),
        );
        bad.extend(compiled::precompile_regexes(&self.strip));
        bad
    }
}
