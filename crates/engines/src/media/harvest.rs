// ABOUTME: Harvests image and video candidates from a parsed page in three tiers.
// ABOUTME: Metadata tags first, then elements inside the article body region, then lazy-load attributes.

use scraper::{ElementRef, Html};
use url::Url;

use crate::extractors::compiled;
use crate::extractors::locator::meta_selectors;
use crate::media::classify::MediaRules;
use crate::media::{MediaCandidate, MediaKind, MediaTier};

const META_IMAGE_TAGS: &[&str] = &[
    "og:image",
    "og:image:url",
    "og:image:secure_url",
    "twitter:image",
    "twitter:image:src",
];

const META_VIDEO_TAGS: &[&str] = &[
    "og:video",
    "og:video:url",
    "og:video:secure_url",
    "twitter:player",
];

/// Substrings marking a `src` as a lazy-load placeholder rather than the real asset.
const PLACEHOLDER_MARKERS: &[&str] = &[
    "placeholder",
    "blank.gif",
    "spacer.gif",
    "transparent.gif",
    "transparent.png",
    "lazy-load",
    "lazyload",
];

/// Harvests every candidate on the page, in tier order: metadata, body, lazy.
///
/// Body and lazy candidates come only from the first region matching one of
/// `rules.body_scopes`. A page with no matching region yields metadata
/// candidates only.
pub fn harvest(doc: &Html, page_url: &Url, rules: &MediaRules) -> Vec<MediaCandidate> {
    let mut out = harvest_meta(doc, page_url);
    let (body, lazy) = harvest_body(doc, page_url, rules);
    out.extend(body);
    out.extend(lazy);
    out
}

fn meta_contents<'a>(doc: &'a Html, name: &str) -> Vec<&'a str> {
    meta_selectors(name)
        .iter()
        .filter_map(|css| compiled::selector(css))
        .flat_map(|sel| {
            doc.select(&sel)
                .filter_map(|el| el.value().attr("content"))
                .collect::<Vec<_>>()
        })
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .collect()
}

fn meta_dimension(doc: &Html, name: &str) -> Option<u32> {
    meta_contents(doc, name).first().and_then(|v| parse_dimension(v))
}

fn harvest_meta(doc: &Html, page_url: &Url) -> Vec<MediaCandidate> {
    let mut out = Vec::new();
    let og_width = meta_dimension(doc, "og:image:width");
    let og_height = meta_dimension(doc, "og:image:height");

    for tag in META_IMAGE_TAGS {
        for (i, raw) in meta_contents(doc, tag).into_iter().enumerate() {
            let mut cand = MediaCandidate::new(
                resolve_url(raw, page_url),
                MediaKind::Image,
                MediaTier::Meta,
                format!("meta[{tag}]"),
            );
            // Declared dimensions describe the first og:image only
            if *tag == "og:image" && i == 0 {
                cand = cand.with_dimensions(og_width, og_height);
            }
            out.push(cand);
        }
    }

    for tag in META_VIDEO_TAGS {
        for raw in meta_contents(doc, tag) {
            out.push(MediaCandidate::new(
                resolve_url(raw, page_url),
                MediaKind::Video,
                MediaTier::Meta,
                format!("meta[{tag}]"),
            ));
        }
    }
    out
}

fn first_scope<'a>(doc: &'a Html, rules: &MediaRules) -> Option<ElementRef<'a>> {
    rules.body_scopes.iter().find_map(|css| {
        let sel = compiled::selector(css)?;
        doc.select(&sel).next()
    })
}

fn harvest_body(
    doc: &Html,
    page_url: &Url,
    rules: &MediaRules,
) -> (Vec<MediaCandidate>, Vec<MediaCandidate>) {
    let mut body = Vec::new();
    let mut lazy = Vec::new();

    let Some(scope) = first_scope(doc, rules) else {
        return (body, lazy);
    };

    if let Some(img_sel) = compiled::selector("img") {
        for img in scope.select(&img_sel).take(rules.body_image_limit) {
            match image_candidate(&img, page_url, rules) {
                Some(c) if c.tier == MediaTier::Lazy => lazy.push(c),
                Some(c) => body.push(c),
                None => {}
            }
        }
    }

    if let Some(frame_sel) = compiled::selector("iframe") {
        for frame in scope.select(&frame_sel) {
            let context = element_context(&frame);
            if let Some(src) = attr_non_empty(&frame, "src").filter(|s| !is_placeholder(s)) {
                body.push(
                    MediaCandidate::new(
                        resolve_url(src, page_url),
                        MediaKind::Video,
                        MediaTier::Body,
                        "iframe@src",
                    )
                    .with_context(context),
                );
            } else if let Some(src) = attr_non_empty(&frame, "data-src") {
                lazy.push(
                    MediaCandidate::new(
                        resolve_url(src, page_url),
                        MediaKind::Video,
                        MediaTier::Lazy,
                        "iframe@data-src",
                    )
                    .with_context(context),
                );
            }
        }
    }

    if let Some(video_sel) = compiled::selector("video, video source") {
        for el in scope.select(&video_sel) {
            let tag = el.value().name();
            if let Some(src) = attr_non_empty(&el, "src").filter(|s| !is_placeholder(s)) {
                body.push(
                    MediaCandidate::new(
                        resolve_url(src, page_url),
                        MediaKind::Video,
                        MediaTier::Body,
                        format!("{tag}@src"),
                    )
                    .with_context(element_context(&el)),
                );
            } else if let Some(src) = attr_non_empty(&el, "data-src") {
                lazy.push(
                    MediaCandidate::new(
                        resolve_url(src, page_url),
                        MediaKind::Video,
                        MediaTier::Lazy,
                        format!("{tag}@data-src"),
                    )
                    .with_context(element_context(&el)),
                );
            }
        }
    }

    (body, lazy)
}

fn image_candidate(img: &ElementRef<'_>, page_url: &Url, rules: &MediaRules) -> Option<MediaCandidate> {
    let width = img.value().attr("width").and_then(parse_dimension);
    let height = img.value().attr("height").and_then(parse_dimension);
    let context = element_context(img);
    let src = attr_non_empty(img, "src");

    if let Some(src) = src.filter(|s| !is_placeholder(s)) {
        return Some(
            MediaCandidate::new(resolve_url(src, page_url), MediaKind::Image, MediaTier::Body, "img@src")
                .with_context(context)
                .with_dimensions(width, height),
        );
    }

    for attr in &rules.lazy_attributes {
        let Some(value) = attr_non_empty(img, attr) else {
            continue;
        };
        let (raw, srcset_width) = if attr.ends_with("srcset") {
            match best_srcset_entry(value) {
                Some(entry) => entry,
                None => continue,
            }
        } else {
            (value.to_string(), None)
        };
        return Some(
            MediaCandidate::new(
                resolve_url(&raw, page_url),
                MediaKind::Image,
                MediaTier::Lazy,
                format!("img@{attr}"),
            )
            .with_context(context)
            .with_dimensions(width.or(srcset_width), height),
        );
    }

    // A placeholder with no lazy alternative is still judged, so it shows up in the verdicts
    src.map(|s| {
        MediaCandidate::new(resolve_url(s, page_url), MediaKind::Image, MediaTier::Body, "img@src")
            .with_context(context)
            .with_dimensions(width, height)
    })
}

fn attr_non_empty<'a>(el: &ElementRef<'a>, attr: &str) -> Option<&'a str> {
    el.value().attr(attr).map(str::trim).filter(|v| !v.is_empty())
}

fn is_placeholder(src: &str) -> bool {
    let lower = src.to_ascii_lowercase();
    lower.starts_with("data:") || PLACEHOLDER_MARKERS.iter().any(|m| lower.contains(m))
}

/// alt, title, class and id of the element, plus its parent's class and id.
fn element_context(el: &ElementRef<'_>) -> String {
    let mut parts: Vec<&str> = ["alt", "title", "class", "id"]
        .iter()
        .filter_map(|a| el.value().attr(a))
        .collect();
    if let Some(parent) = el.parent().and_then(ElementRef::wrap) {
        parts.extend(["class", "id"].iter().filter_map(|a| parent.value().attr(a)));
    }
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses a declared dimension such as `"1200"` or `"640px"`.
pub fn parse_dimension(value: &str) -> Option<u32> {
    let v = value.trim().trim_end_matches("px").trim();
    v.parse::<u32>().ok().or_else(|| {
        v.parse::<f32>()
            .ok()
            .filter(|f| f.is_finite() && *f >= 0.0)
            .map(|f| f.round() as u32)
    })
}

/// Picks the largest entry of a `srcset`: the highest `w` descriptor, or the
/// last entry when no widths are declared.
pub fn best_srcset_entry(srcset: &str) -> Option<(String, Option<u32>)> {
    let entries: Vec<(&str, Option<u32>)> = srcset
        .split(',')
        .filter_map(|entry| {
            let mut parts = entry.split_whitespace();
            let url = parts.next()?;
            let width = parts
                .next()
                .and_then(|d| d.strip_suffix('w'))
                .and_then(|w| w.parse::<u32>().ok());
            Some((url, width))
        })
        .collect();

    let widest = entries
        .iter()
        .filter(|(_, w)| w.is_some())
        .max_by_key(|(_, w)| *w);
    widest
        .or_else(|| entries.last())
        .map(|(url, w)| (url.to_string(), *w))
}

/// Resolves a possibly relative URL against the page URL. Session-bound
/// references (`blob:`, `data:`) and unresolvable values are returned as-is.
pub fn resolve_url(raw: &str, base: &Url) -> String {
    let raw = raw.trim();
    let lower = raw.to_ascii_lowercase();
    if lower.starts_with("blob:") || lower.starts_with("data:") {
        return raw.to_string();
    }
    base.join(raw)
        .map(|u| u.to_string())
        .unwrap_or_else(|_| raw.to_string())
}
