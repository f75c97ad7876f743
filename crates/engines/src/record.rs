// ABOUTME: Request, field set, content record and outcome types flowing through an extraction.
// ABOUTME: ContentRecord is the normalized output; ExtractionOutcome reports acceptance, rejection or a routing miss.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::engine::registry::normalize_host;
use crate::error::ExtractError;
use crate::media::MediaVerdict;
use crate::validate::RejectReason;

/// An immutable extraction request: the URL plus its normalized domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub url: Url,
    pub domain: String,
}

impl ExtractionRequest {
    /// Parses and validates a request URL. Only http(s) URLs with a host are accepted.
    pub fn parse(raw: &str) -> Result<Self, ExtractError> {
        let url = Url::parse(raw.trim())
            .map_err(|e| ExtractError::invalid_url(raw, "Request", Some(e.into())))?;
        Self::from_url(url)
    }

    /// Builds a request from an already-parsed URL.
    pub fn from_url(url: Url) -> Result<Self, ExtractError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ExtractError::invalid_url(
                url.as_str(),
                "Request",
                Some(anyhow::anyhow!("unsupported scheme: {}", url.scheme())),
            ));
        }
        let domain = url
            .host_str()
            .map(normalize_host)
            .filter(|d| !d.is_empty())
            .ok_or_else(|| {
                ExtractError::invalid_url(url.as_str(), "Request", Some(anyhow::anyhow!("missing host")))
            })?;
        Ok(Self { url, domain })
    }
}

/// Text fields resolved from a page. Any field may be empty; absence is
/// judged later by validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ExtractedFields {
    pub title: String,
    pub description: String,
    pub body: String,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    /// The date text as found on the page, kept when parsing fails
    pub published_raw: Option<String>,
}

impl ExtractedFields {
    /// Names of fields whose locator chains came up empty.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        if self.title.is_empty() {
            out.push("title");
        }
        if self.description.is_empty() {
            out.push("description");
        }
        if self.body.is_empty() {
            out.push("body");
        }
        if self.author.is_none() {
            out.push("author");
        }
        if self.published_raw.is_none() {
            out.push("published_at");
        }
        out
    }
}

/// The normalized article record handed to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ContentRecord {
    pub url: String,
    pub source_domain: String,
    pub source_name: String,
    pub title: String,
    pub description: String,
    pub body: String,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub images: Vec<String>,
    pub videos: Vec<String>,
    /// True when `images` holds only the topic fallback
    pub used_fallback_image: bool,
}

impl ContentRecord {
    /// Total number of visual assets.
    pub fn media_count(&self) -> usize {
        self.images.len() + self.videos.len()
    }

    /// Word count of the body.
    pub fn word_count(&self) -> usize {
        self.body.split_whitespace().count()
    }
}

/// The result of one extraction run that reached a decision.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    /// The record passed validation.
    Accepted {
        record: ContentRecord,
        verdicts: Vec<MediaVerdict>,
    },
    /// The record failed validation and was discarded.
    Rejected {
        url: String,
        engine: String,
        reason: RejectReason,
        verdicts: Vec<MediaVerdict>,
    },
    /// No engine is registered for the URL's domain.
    Unroutable { url: String, domain: String },
}

impl ExtractionOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ExtractionOutcome::Accepted { .. })
    }

    /// The accepted record, if any.
    pub fn record(&self) -> Option<&ContentRecord> {
        match self {
            ExtractionOutcome::Accepted { record, .. } => Some(record),
            _ => None,
        }
    }

    /// Consumes the outcome, returning the accepted record.
    pub fn into_record(self) -> Option<ContentRecord> {
        match self {
            ExtractionOutcome::Accepted { record, .. } => Some(record),
            _ => None,
        }
    }

    /// The rejection reason, if the record was rejected.
    pub fn reject_reason(&self) -> Option<RejectReason> {
        match self {
            ExtractionOutcome::Rejected { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// The classifier's decision trail, empty for routing misses.
    pub fn verdicts(&self) -> &[MediaVerdict] {
        match self {
            ExtractionOutcome::Accepted { verdicts, .. }
            | ExtractionOutcome::Rejected { verdicts, .. } => verdicts,
            ExtractionOutcome::Unroutable { .. } => &[],
        }
    }
}
