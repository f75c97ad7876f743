// ABOUTME: Content validation gate deciding whether an extracted record is usable.
// ABOUTME: Returns a specific RejectReason; engine rules can only tighten the shared minimums.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::ContentRecord;

/// Why a record was rejected. Checks run in this order and the first failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    TitleTooShort,
    EmptyBody,
    NoMedia,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::TitleTooShort => "TITLE_TOO_SHORT",
            RejectReason::EmptyBody => "EMPTY_BODY",
            RejectReason::NoMedia => "NO_MEDIA",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_min_title_chars() -> usize {
    10
}

fn default_min_body_chars() -> usize {
    50
}

/// Minimum-viability thresholds, counted in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRules {
    #[serde(default = "default_min_title_chars")]
    pub min_title_chars: usize,
    #[serde(default = "default_min_body_chars")]
    pub min_body_chars: usize,
    /// Caption-only sources may have an empty body
    #[serde(default)]
    pub caption_only: bool,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            min_title_chars: default_min_title_chars(),
            min_body_chars: default_min_body_chars(),
            caption_only: false,
        }
    }
}

impl ValidationRules {
    /// Combines shared minimums with an engine's rules. Thresholds take the
    /// larger of the two; the caption-only exemption is the engine's to grant.
    pub fn tightened_by(&self, engine: &ValidationRules) -> ValidationRules {
        ValidationRules {
            min_title_chars: self.min_title_chars.max(engine.min_title_chars),
            min_body_chars: self.min_body_chars.max(engine.min_body_chars),
            caption_only: engine.caption_only,
        }
    }
}

/// Applies [`ValidationRules`] to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContentValidator {
    rules: ValidationRules,
}

impl ContentValidator {
    pub fn new(rules: ValidationRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ValidationRules {
        &self.rules
    }

    /// Accepts the record or returns the first failed rule.
    pub fn validate(&self, record: &ContentRecord) -> Result<(), RejectReason> {
        let title = record.title.trim();
        if title.is_empty() || title.chars().count() < self.rules.min_title_chars {
            return Err(RejectReason::TitleTooShort);
        }

        let body_chars = record.body.trim().chars().count();
        if !self.rules.caption_only && (body_chars == 0 || body_chars < self.rules.min_body_chars) {
            return Err(RejectReason::EmptyBody);
        }

        if record.images.is_empty() && record.videos.is_empty() {
            return Err(RejectReason::NoMedia);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(title: &str, body: &str, images: &[&str]) -> ContentRecord {
        ContentRecord {
            title: title.to_string(),
            body: body.to_string(),
            images: images.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    const BODY_50: &str = "The Senate approved the measure late on Thursday..";

    #[test]
    fn accepts_minimal_viable_record() {
        assert_eq!(BODY_50.chars().count(), 50);
        let v = ContentValidator::default();
        assert_eq!(v.validate(&record("Senate passes bill", BODY_50, &["https://i/x.jpg"])), Ok(()));
    }

    #[test]
    fn short_title_rejected_first() {
        let v = ContentValidator::default();
        assert_eq!(v.validate(&record("Hi", "", &[])), Err(RejectReason::TitleTooShort));
        assert_eq!(v.validate(&record("   ", BODY_50, &["x"])), Err(RejectReason::TitleTooShort));
    }

    #[test]
    fn short_body_rejected_unless_caption_only() {
        let rec = record("Senate passes bill", "Too short.", &["https://i/x.jpg"]);
        assert_eq!(ContentValidator::default().validate(&rec), Err(RejectReason::EmptyBody));

        let caption = ContentValidator::new(ValidationRules {
            caption_only: true,
            ..Default::default()
        });
        assert_eq!(caption.validate(&rec), Ok(()));
    }

    #[test]
    fn no_media_rejected() {
        let v = ContentValidator::default();
        assert_eq!(v.validate(&record("Senate passes bill", BODY_50, &[])), Err(RejectReason::NoMedia));
    }

    #[test]
    fn engines_cannot_loosen_shared_minimums() {
        let base = ValidationRules::default();
        let loose = ValidationRules {
            min_title_chars: 1,
            min_body_chars: 0,
            caption_only: false,
        };
        assert_eq!(base.tightened_by(&loose), base);

        let strict = ValidationRules {
            min_title_chars: 20,
            min_body_chars: 200,
            caption_only: false,
        };
        assert_eq!(base.tightened_by(&strict), strict);
    }

    #[test]
    fn reason_codes_serialize_screaming() {
        assert_eq!(serde_json::to_string(&RejectReason::TitleTooShort).unwrap(), "\"TITLE_TOO_SHORT\"");
        assert_eq!(RejectReason::NoMedia.to_string(), "NO_MEDIA");
    }
}
