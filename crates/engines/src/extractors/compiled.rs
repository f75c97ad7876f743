// ABOUTME: Process-wide caches of compiled CSS selectors and regular expressions.
// ABOUTME: Engines warm these at registration so extraction never re-parses locator strings.

//! Selector and regex caching for repeated DOM queries.
//!
//! Locator chains are plain strings in configuration. Parsing them is
//! expensive relative to matching, so every distinct string is compiled once
//! and shared by all extractions. Invalid inputs are cached as `None`.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Selector;

static SELECTOR_CACHE: Lazy<RwLock<HashMap<String, Option<Selector>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

static REGEX_CACHE: Lazy<RwLock<HashMap<String, Option<Regex>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn cached<T, F>(cache: &RwLock<HashMap<String, Option<T>>>, key: &str, compile: F) -> Option<T>
where
    T: Clone,
    F: FnOnce(&str) -> Option<T>,
{
    // Fast path: shared lock for hits
    {
        let map = cache.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(hit) = map.get(key) {
            return hit.clone();
        }
    }

    let compiled = compile(key);
    let mut map = cache.write().unwrap_or_else(PoisonError::into_inner);
    // Another thread may have inserted while we compiled
    if let Some(hit) = map.get(key) {
        return hit.clone();
    }
    map.insert(key.to_string(), compiled.clone());
    compiled
}

/// Gets or compiles a CSS selector. Returns `None` for invalid selectors.
pub fn selector(css: &str) -> Option<Selector> {
    cached(&SELECTOR_CACHE, css, |s| Selector::parse(s).ok())
}

/// Gets or compiles a regular expression. Returns `None` for invalid patterns.
pub fn regex(pattern: &str) -> Option<Regex> {
    cached(&REGEX_CACHE, pattern, |p| Regex::new(p).ok())
}

/// Precompiles a batch of selectors, returning the ones that failed to parse.
pub fn precompile_selectors<I, S>(selectors: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    selectors
        .into_iter()
        .filter(|css| selector(css.as_ref()).is_none())
        .map(|css| css.as_ref().to_string())
        .collect()
}

/// Precompiles a batch of regexes, returning the ones that failed to compile.
pub fn precompile_regexes<I, S>(patterns: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    patterns
        .into_iter()
        .filter(|p| regex(p.as_ref()).is_none())
        .map(|p| p.as_ref().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_selector_is_cached() {
        assert!(selector("div.container").is_some());
        assert!(selector("div.container").is_some());
    }

    #[test]
    fn invalid_selector_returns_none() {
        assert!(selector("[[[invalid").is_none());
        assert!(selector("[[[invalid").is_none());
    }

    #[test]
    fn precompile_reports_failures() {
        let bad = precompile_selectors(["h1", "p.intro", "div[[", "meta[property='og:title']"]);
        assert_eq!(bad, vec!["div[[".to_string()]);
    }

    #[test]
    fn regex_cache_rejects_bad_patterns() {
        assert!(regex(r"\s*\|\s*New York Post$").is_some());
        assert_eq!(precompile_regexes(["(unclosed"]), vec!["(unclosed".to_string()]);
    }
}
