// ABOUTME: Media candidate, verdict and report types shared by harvesting, classification and fallback.
// ABOUTME: Every candidate considered ends up with exactly one MediaVerdict so decisions stay auditable.

//! Media extraction.
//!
//! The pipeline is harvest ([`harvest`]) then judge ([`classify`]) then, only
//! when nothing survives, substitute a topic image ([`fallback`]). The shared
//! algorithm is parameterized per engine by [`MediaRules`] and
//! [`TopicImageTable`].

use serde::{Deserialize, Serialize};

pub mod classify;
pub mod fallback;
pub mod harvest;

pub use classify::{MediaClassifier, MediaPriority, MediaRules};
pub use fallback::{TopicEntry, TopicImageTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Video,
}

/// Where a candidate was harvested from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaTier {
    /// `og:*` / `twitter:*` metadata tags
    Meta,
    /// `src` of an element inside the article body region
    Body,
    /// Lazy-load attribute of a body element whose `src` was a placeholder
    Lazy,
    /// Topic image substituted after classification
    Fallback,
}

/// A harvested, not-yet-judged image or video reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaCandidate {
    /// Absolute URL when resolvable, otherwise the raw attribute value
    pub url: String,
    pub kind: MediaKind,
    pub tier: MediaTier,
    /// e.g. `meta[og:image]`, `img@src`, `img@data-src`, `iframe@src`
    pub source_attribute: String,
    /// alt, title, class and id text of the element and its parent
    pub surrounding_context: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl MediaCandidate {
    pub fn new(
        url: impl Into<String>,
        kind: MediaKind,
        tier: MediaTier,
        source_attribute: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            kind,
            tier,
            source_attribute: source_attribute.into(),
            surrounding_context: String::new(),
            width: None,
            height: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.surrounding_context = context.into();
        self
    }

    pub fn with_dimensions(mut self, width: Option<u32>, height: Option<u32>) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Declared pixel area, or the single declared dimension, used for ranking.
    pub fn declared_size(&self) -> u64 {
        match (self.width, self.height) {
            (Some(w), Some(h)) => u64::from(w) * u64::from(h),
            (Some(d), None) | (None, Some(d)) => u64::from(d),
            (None, None) => 0,
        }
    }
}

/// Why a candidate was accepted or rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerdictReason {
    Accepted,
    /// Host is on the ad-serving denylist
    AdDomain,
    /// `blob:`/`data:` style references bound to the rendering session
    EphemeralUrl,
    /// Video host is not an allow-listed embeddable platform
    UnsupportedPlatform,
    /// Declared width or height below the minimum
    TooSmall,
    /// Logo, icon, avatar or similar page chrome
    ChromePattern,
    TrackingPixel,
    /// Image host outside the engine's allowed hosts
    ForeignHost,
    Duplicate,
    Unresolvable,
    /// Topic fallback substituted because nothing else survived
    FallbackSelected,
}

/// The classifier's decision about one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaVerdict {
    pub candidate: MediaCandidate,
    pub accepted: bool,
    pub reason: VerdictReason,
}

impl MediaVerdict {
    pub fn accept(candidate: MediaCandidate) -> Self {
        Self {
            candidate,
            accepted: true,
            reason: VerdictReason::Accepted,
        }
    }

    pub fn reject(candidate: MediaCandidate, reason: VerdictReason) -> Self {
        Self {
            candidate,
            accepted: false,
            reason,
        }
    }
}

/// Ranked survivors plus the full decision trail.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MediaReport {
    /// Accepted candidates, best first
    pub accepted: Vec<MediaCandidate>,
    /// One verdict per candidate considered, including rejects
    pub verdicts: Vec<MediaVerdict>,
}

impl MediaReport {
    fn urls(&self, kind: MediaKind) -> Vec<String> {
        self.accepted
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.url.clone())
            .collect()
    }

    /// Accepted image URLs in rank order.
    pub fn images(&self) -> Vec<String> {
        self.urls(MediaKind::Image)
    }

    /// Accepted video URLs in rank order.
    pub fn videos(&self) -> Vec<String> {
        self.urls(MediaKind::Video)
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }

    /// True when the only accepted media is the topic fallback.
    pub fn used_fallback(&self) -> bool {
        self.accepted.iter().any(|c| c.tier == MediaTier::Fallback)
    }

    /// Rejected verdicts, for diagnostics.
    pub fn rejected(&self) -> impl Iterator<Item = &MediaVerdict> {
        self.verdicts.iter().filter(|v| !v.accepted)
    }
}
