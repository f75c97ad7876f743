// ABOUTME: Shared media classification algorithm parameterized by per-engine MediaRules.
// ABOUTME: Rejects ads, session-bound URLs, unsupported video hosts, chrome and tiny images, then ranks survivors.

//! Media classification.
//!
//! Policy is allow/deny by domain plus structural scoping. Candidates are
//! judged in tier-priority order so that when duplicates occur, the copy from
//! the preferred tier is the one kept. Survivors are ranked by tier, then by
//! declared size descending; ties keep harvest order.

use std::cmp::Reverse;
use std::collections::HashSet;

use aho_corasick::AhoCorasick;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::media::{MediaCandidate, MediaKind, MediaReport, MediaTier, MediaVerdict, VerdictReason};

/// Which harvesting tier wins ties between metadata and body media.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaPriority {
    /// `og:image` and friends rank above in-body elements
    #[default]
    MetaFirst,
    /// In-body `<img>`/`<iframe>` rank above metadata tags
    BodyFirst,
}

fn default_body_scopes() -> Vec<String> {
    ["article", "main", "div.entry-content"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_body_image_limit() -> usize {
    5
}

fn default_min_dimension() -> u32 {
    100
}

fn default_lazy_attributes() -> Vec<String> {
    ["data-src", "data-lazy-src", "data-lazy", "data-original", "srcset", "data-srcset"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_ad_domains() -> Vec<String> {
    [
        "flashtalking.com",
        "doubleclick.net",
        "googlesyndication.com",
        "googleadservices.com",
        "amazon-adsystem.com",
        "ads.yahoo.com",
        "advertising.com",
        "adnxs.com",
        "outbrain.com",
        "taboola.com",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_video_platforms() -> Vec<String> {
    [
        "youtube.com",
        "youtu.be",
        "youtube-nocookie.com",
        "vimeo.com",
        "jwplayer.com",
        "jwplatform.com",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_chrome_patterns() -> Vec<String> {
    ["logo", "icon", "avatar", "favicon", "sprite", "badge", "headshot"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_tracking_patterns() -> Vec<String> {
    [
        "pixel",
        "tracking",
        "analytics",
        "beacon",
        "spacer",
        "clear.gif",
        "blank.gif",
        "1x1",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Per-engine media policy. Every list is data so that denylists can be
/// updated without code changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRules {
    #[serde(default)]
    pub priority: MediaPriority,
    /// Body regions tried in order; only the first match is scanned
    #[serde(default = "default_body_scopes")]
    pub body_scopes: Vec<String>,
    #[serde(default = "default_body_image_limit")]
    pub body_image_limit: usize,
    /// Images declaring a width or height below this are dropped
    #[serde(default = "default_min_dimension")]
    pub min_dimension: u32,
    #[serde(default = "default_lazy_attributes")]
    pub lazy_attributes: Vec<String>,
    /// Hosts (and their subdomains) that serve ads
    #[serde(default = "default_ad_domains")]
    pub ad_domains: Vec<String>,
    /// Hosts (and their subdomains) whose embeds count as editorial video
    #[serde(default = "default_video_platforms")]
    pub video_platforms: Vec<String>,
    #[serde(default = "default_chrome_patterns")]
    pub chrome_patterns: Vec<String>,
    #[serde(default = "default_tracking_patterns")]
    pub tracking_patterns: Vec<String>,
    /// When non-empty, images must contain one of these in their URL
    #[serde(default)]
    pub image_hosts: Vec<String>,
}

impl Default for MediaRules {
    fn default() -> Self {
        Self {
            priority: MediaPriority::default(),
            body_scopes: default_body_scopes(),
            body_image_limit: default_body_image_limit(),
            min_dimension: default_min_dimension(),
            lazy_attributes: default_lazy_attributes(),
            ad_domains: default_ad_domains(),
            video_platforms: default_video_platforms(),
            chrome_patterns: default_chrome_patterns(),
            tracking_patterns: default_tracking_patterns(),
            image_hosts: Vec::new(),
        }
    }
}

impl MediaRules {
    fn tier_rank(&self, tier: MediaTier) -> u8 {
        match (self.priority, tier) {
            (MediaPriority::MetaFirst, MediaTier::Meta) => 0,
            (MediaPriority::MetaFirst, MediaTier::Body) => 1,
            (MediaPriority::MetaFirst, MediaTier::Lazy) => 2,
            (MediaPriority::BodyFirst, MediaTier::Body) => 0,
            (MediaPriority::BodyFirst, MediaTier::Lazy) => 1,
            (MediaPriority::BodyFirst, MediaTier::Meta) => 2,
            (_, MediaTier::Fallback) => 3,
        }
    }
}

/// Compiled form of [`MediaRules`].
#[derive(Debug, Clone)]
pub struct MediaClassifier {
    rules: MediaRules,
    chrome: AhoCorasick,
    tracking: AhoCorasick,
    ad_domains: Vec<String>,
    video_platforms: Vec<String>,
    image_hosts: Vec<String>,
}

fn lowercase_all(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|s| s.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// True when `host` is `domain` or a subdomain of it.
fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

/// Checks for 1x1 style dimensions declared in the query string.
fn has_tiny_dimensions(url: &Url) -> bool {
    url.query_pairs().any(|(k, v)| {
        matches!(k.as_ref(), "w" | "h" | "width" | "height") && v.as_ref() == "1"
    })
}

/// Normalized dedup key: host without `www.`, path without trailing slash, query. No scheme, no fragment.
fn dedup_key(url: &Url) -> String {
    let host = url
        .host_str()
        .map(|h| h.trim_start_matches("www.").to_ascii_lowercase())
        .unwrap_or_default();
    let path = url.path().trim_end_matches('/');
    match url.query() {
        Some(q) => format!("{host}{path}?{q}"),
        None => format!("{host}{path}"),
    }
}

impl MediaClassifier {
    /// Compiles the pattern matchers for a rule set.
    pub fn new(rules: MediaRules) -> Result<Self, aho_corasick::BuildError> {
        let chrome = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(&rules.chrome_patterns)?;
        let tracking = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(&rules.tracking_patterns)?;
        Ok(Self {
            ad_domains: lowercase_all(&rules.ad_domains),
            video_platforms: lowercase_all(&rules.video_platforms),
            image_hosts: lowercase_all(&rules.image_hosts),
            chrome,
            tracking,
            rules,
        })
    }

    pub fn rules(&self) -> &MediaRules {
        &self.rules
    }

    /// Judges every candidate and ranks the survivors.
    pub fn classify(&self, candidates: Vec<MediaCandidate>) -> MediaReport {
        let mut ordered = candidates;
        ordered.sort_by_key(|c| self.rules.tier_rank(c.tier));

        let mut seen = HashSet::new();
        let mut accepted = Vec::new();
        let mut verdicts = Vec::with_capacity(ordered.len());

        for cand in ordered {
            let verdict = match self.judge(&cand, &mut seen) {
                VerdictReason::Accepted => {
                    accepted.push(cand.clone());
                    MediaVerdict::accept(cand)
                }
                reason => MediaVerdict::reject(cand, reason),
            };
            verdicts.push(verdict);
        }

        accepted.sort_by_key(|c| (self.rules.tier_rank(c.tier), Reverse(c.declared_size())));
        MediaReport { accepted, verdicts }
    }

    fn judge(&self, cand: &MediaCandidate, seen: &mut HashSet<String>) -> VerdictReason {
        let lower = cand.url.to_ascii_lowercase();
        if lower.starts_with("blob:")
            || lower.starts_with("data:")
            || lower.starts_with("javascript:")
            || lower.starts_with("about:")
        {
            return VerdictReason::EphemeralUrl;
        }

        let Some(url) = Url::parse(&cand.url)
            .ok()
            .filter(|u| matches!(u.scheme(), "http" | "https"))
        else {
            return VerdictReason::Unresolvable;
        };
        let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
            return VerdictReason::Unresolvable;
        };

        if self.ad_domains.iter().any(|d| host_matches(&host, d)) {
            return VerdictReason::AdDomain;
        }

        match cand.kind {
            MediaKind::Video => {
                if !self.video_platforms.iter().any(|d| host_matches(&host, d)) {
                    return VerdictReason::UnsupportedPlatform;
                }
            }
            MediaKind::Image => {
                if self.tracking.is_match(&lower) || has_tiny_dimensions(&url) {
                    return VerdictReason::TrackingPixel;
                }
                if self.chrome.is_match(url.path()) || self.chrome.is_match(&cand.surrounding_context)
                {
                    return VerdictReason::ChromePattern;
                }
                let min = self.rules.min_dimension;
                if cand.width.is_some_and(|w| w < min) || cand.height.is_some_and(|h| h < min) {
                    return VerdictReason::TooSmall;
                }
                if !self.image_hosts.is_empty()
                    && !self.image_hosts.iter().any(|h| lower.contains(h.as_str()))
                {
                    return VerdictReason::ForeignHost;
                }
            }
        }

        if !seen.insert(dedup_key(&url)) {
            return VerdictReason::Duplicate;
        }
        VerdictReason::Accepted
    }
}
