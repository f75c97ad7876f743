// ABOUTME: Field resolver that walks a LocatorChain against a parsed page.
// ABOUTME: Pure and I/O-free; returns the first locator yielding non-empty cleaned text.

//! Locator chain resolution.
//!
//! Key behaviors:
//! - Locators are tried in order; the first one yielding non-empty text wins.
//! - A locator whose match becomes empty after `strip` clean-up falls through
//!   to the next locator.
//! - An exhausted chain yields `None`. Absence is data, never an error.
//! - Invalid selectors behave as non-matching locators.

use scraper::{ElementRef, Html};

use crate::extractors::compiled;
use crate::extractors::locator::{meta_selectors, Locator, LocatorChain};

/// Collapses runs of whitespace into single spaces and trims.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolves one logical field. Returns the cleaned value of the first
/// matching locator.
pub fn resolve_field(doc: &Html, chain: &LocatorChain) -> Option<String> {
    resolve_with_index(doc, chain).map(|(_, value)| value)
}

/// Like [`resolve_field`], also reporting which locator in the chain won.
pub fn resolve_with_index(doc: &Html, chain: &LocatorChain) -> Option<(usize, String)> {
    chain.selectors.iter().enumerate().find_map(|(idx, loc)| {
        let raw = match_locator(doc, loc, chain)?;
        let cleaned = apply_strip(&raw, &chain.strip);
        if cleaned.is_empty() {
            None
        } else {
            Some((idx, cleaned))
        }
    })
}

fn match_locator(doc: &Html, loc: &Locator, chain: &LocatorChain) -> Option<String> {
    match loc {
        Locator::Css(css) => first_text(doc, css),
        Locator::CssAttr(parts) => match parts.as_slice() {
            [css, attr, ..] => first_attr(doc, css, attr),
            [css] => first_text(doc, css),
            [] => None,
        },
        Locator::Meta { meta } => meta_selectors(meta)
            .iter()
            .find_map(|css| first_attr(doc, css, "content")),
        Locator::Paragraphs { paragraphs } => join_paragraphs(doc, paragraphs, chain),
    }
}

fn element_text(el: &ElementRef<'_>) -> String {
    if el.value().name() == "meta" {
        return el
            .value()
            .attr("content")
            .map(normalize_whitespace)
            .unwrap_or_default();
    }
    normalize_whitespace(&el.text().collect::<Vec<_>>().join(" "))
}

fn first_text(doc: &Html, css: &str) -> Option<String> {
    let sel = compiled::selector(css)?;
    doc.select(&sel)
        .map(|el| element_text(&el))
        .find(|t| !t.is_empty())
}

fn first_attr(doc: &Html, css: &str, attr: &str) -> Option<String> {
    let sel = compiled::selector(css)?;
    doc.select(&sel)
        .filter_map(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .find(|v| !v.is_empty())
}

/// Joins qualifying paragraphs from the first region that has any.
fn join_paragraphs(doc: &Html, scope: &str, chain: &LocatorChain) -> Option<String> {
    let scope_sel = compiled::selector(scope)?;
    let p_sel = compiled::selector("p")?;
    let skips: Vec<String> = chain.skip_phrases.iter().map(|s| s.to_lowercase()).collect();

    doc.select(&scope_sel).find_map(|region| {
        let kept: Vec<String> = region
            .select(&p_sel)
            .map(|p| element_text(&p))
            .filter(|text| text.chars().count() >= chain.min_paragraph_chars)
            .filter(|text| {
                let lower = text.to_lowercase();
                !skips.iter().any(|s| lower.contains(s.as_str()))
            })
            .collect();
        if kept.is_empty() {
            None
        } else {
            Some(kept.join(" "))
        }
    })
}

fn apply_strip(value: &str, patterns: &[String]) -> String {
    let mut out = value.to_string();
    for pattern in patterns {
        if let Some(re) = compiled::regex(pattern) {
            out = re.replace_all(&out, "").into_owned();
        }
    }
    normalize_whitespace(&out)
}
