// ABOUTME: Topic-keyword to stock-image table used when no editorial media survives classification.
// ABOUTME: Topics are tested in order against the lowercased title; the first match wins, else the default.

use serde::{Deserialize, Serialize};

use crate::media::{MediaCandidate, MediaKind, MediaTier};

/// One themed image and the keywords that select it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicEntry {
    pub topic: String,
    pub keywords: Vec<String>,
    pub image_url: String,
}

impl TopicEntry {
    fn matches(&self, title_lower: &str) -> bool {
        self.keywords
            .iter()
            .any(|k| !k.is_empty() && title_lower.contains(&k.to_lowercase()))
    }
}

/// Ordered topic table plus a default image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicImageTable {
    #[serde(default)]
    pub topics: Vec<TopicEntry>,
    pub default_image: String,
}

const STOCK_SUFFIX: &str = "?w=1280&h=720&fit=crop";

fn stock(photo: &str) -> String {
    format!("https://images.unsplash.com/{photo}{STOCK_SUFFIX}")
}

fn entry(topic: &str, keywords: &[&str], photo: &str) -> TopicEntry {
    TopicEntry {
        topic: topic.to_string(),
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        image_url: stock(photo),
    }
}

impl Default for TopicImageTable {
    /// General news table: politics, business, crime, New York, then a newsroom default.
    fn default() -> Self {
        Self {
            topics: vec![
                entry(
                    "politics",
                    &["congress", "senate", "house", "capitol", "politics", "election"],
                    "photo-1529107386315-e1a2ed48a620",
                ),
                entry(
                    "business",
                    &["business", "wall street", "economy", "market", "finance"],
                    "photo-1486406146926-c627a92ad1ab",
                ),
                entry(
                    "crime",
                    &["crime", "police", "arrest", "shooting", "murder"],
                    "photo-1532292994-3c4e6e3ab3b9",
                ),
                entry(
                    "new_york",
                    &["new york", "nyc", "manhattan", "brooklyn"],
                    "photo-1496442226666-8d4d0e62e6e9",
                ),
            ],
            default_image: stock("photo-1504711434969-e33886168f5c"),
        }
    }
}

impl TopicImageTable {
    /// Returns the matched topic name (`None` for the default) and its image.
    pub fn select(&self, title: &str) -> (Option<&str>, &str) {
        let lower = title.to_lowercase();
        match self.topics.iter().find(|t| t.matches(&lower)) {
            Some(t) => (Some(t.topic.as_str()), t.image_url.as_str()),
            None => (None, self.default_image.as_str()),
        }
    }

    /// The image URL for a title.
    pub fn image_for(&self, title: &str) -> &str {
        self.select(title).1
    }

    /// Builds the fallback candidate for a title.
    pub fn candidate(&self, title: &str) -> MediaCandidate {
        let (topic, url) = self.select(title);
        MediaCandidate::new(
            url,
            MediaKind::Image,
            MediaTier::Fallback,
            format!("topic:{}", topic.unwrap_or("default")),
        )
        .with_context(title)
    }

    /// Every image URL the table can return.
    pub fn all_images(&self) -> impl Iterator<Item = &str> {
        self.topics
            .iter()
            .map(|t| t.image_url.as_str())
            .chain(std::iter::once(self.default_image.as_str()))
    }
}
