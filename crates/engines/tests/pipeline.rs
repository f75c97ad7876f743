// ABOUTME: End-to-end tests for routing, extraction, media classification and validation through the Pipeline.
// ABOUTME: Uses a scripted in-memory renderer to observe render session release on success, timeout and cancellation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use httpmock::prelude::*;
use newsdesk_engines::{
    load_builtin_registry, EngineConfig, EngineRegistry, ExtractError, ExtractionOutcome,
    Locator, LocatorChain, MediaTier, PageHandle, Pipeline, RawPage, RegistryError, RejectReason,
    Renderer, SourceEngine, VerdictReason, WaitPolicy,
};
use pretty_assertions::assert_eq;
use url::Url;

const BODY_50: &str = "The Senate approved the measure late on Thursday..";
const POLITICS_IMAGE: &str =
    "https://images.unsplash.com/photo-1529107386315-e1a2ed48a620?w=1280&h=720&fit=crop";
const DEFAULT_IMAGE: &str =
    "https://images.unsplash.com/photo-1504711434969-e33886168f5c?w=1280&h=720&fit=crop";

/// Serves canned HTML by URL and counts opened and closed pages.
#[derive(Debug, Default)]
struct ScriptedRenderer {
    pages: HashMap<String, String>,
    content_delay: Duration,
    next_id: AtomicU64,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl ScriptedRenderer {
    fn with_page(url: &str, html: &str) -> Self {
        let mut pages = HashMap::new();
        pages.insert(url.to_string(), html.to_string());
        Self {
            pages,
            ..Default::default()
        }
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.content_delay = delay;
        self
    }

    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn render(&self, url: &Url, _wait: &WaitPolicy) -> Result<PageHandle, ExtractError> {
        if !self.pages.contains_key(url.as_str()) {
            return Err(ExtractError::fetch(url.as_str(), "Render", None));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(PageHandle {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            requested_url: url.clone(),
            final_url: url.clone(),
        })
    }

    async fn content(&self, page: &PageHandle) -> Result<String, ExtractError> {
        if !self.content_delay.is_zero() {
            tokio::time::sleep(self.content_delay).await;
        }
        self.pages
            .get(page.requested_url.as_str())
            .cloned()
            .ok_or_else(|| ExtractError::fetch(page.requested_url.as_str(), "Render", None))
    }

    fn close(&self, _page: &PageHandle) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

fn nypost_page(title: &str, body: &str, extra: &str) -> String {
    format!(
        r#"<html><head><title>{title} | New York Post</title>{extra}</head>
<body><h1 class="headline">{title}</h1>
<div class="entry-content"><p>{body}</p></div></body></html>"#
    )
}

fn pipeline_with(renderer: Arc<ScriptedRenderer>) -> Pipeline {
    Pipeline::builder()
        .registry(load_builtin_registry().unwrap())
        .renderer(renderer)
        .build()
        .unwrap()
}

fn html_pipeline() -> Pipeline {
    pipeline_with(Arc::new(ScriptedRenderer::default()))
}

#[tokio::test]
async fn senate_story_without_media_gets_politics_image() {
    let url = "https://nypost.com/2024/05/01/us-news/senate-passes-bill/";
    let renderer = Arc::new(ScriptedRenderer::with_page(url, &nypost_page("Senate passes bill", BODY_50, "")));
    let pipeline = pipeline_with(Arc::clone(&renderer));

    let outcome = pipeline.extract(url).await.unwrap();
    let record = outcome.record().expect("accepted");
    assert_eq!(record.title, "Senate passes bill");
    assert_eq!(record.body, BODY_50);
    assert_eq!(record.source_name, "New York Post");
    assert_eq!(record.source_domain, "nypost.com");
    assert_eq!(record.images, vec![POLITICS_IMAGE.to_string()]);
    assert!(record.videos.is_empty());
    assert!(record.used_fallback_image);
    assert_eq!(outcome.verdicts()[0].reason, VerdictReason::FallbackSelected);

    assert_eq!(renderer.opened(), 1);
    assert_eq!(renderer.closed(), 1);
}

#[test]
fn og_title_alone_resolves_the_headline() {
    let html = format!(
        r#"<html><head><meta property="og:title" content="Senate passes bill"></head>
<body><div class="entry-content"><p>{BODY_50}</p></div></body></html>"#
    );
    let outcome = html_pipeline()
        .extract_html(&html, "https://nypost.com/2024/05/01/us-news/senate-passes-bill/")
        .unwrap();
    let record = outcome.record().expect("accepted");
    assert_eq!(record.title, "Senate passes bill");
    assert_eq!(record.body, BODY_50);
    assert_eq!(record.images, vec![POLITICS_IMAGE.to_string()]);
    assert!(record.used_fallback_image);
}

#[tokio::test]
async fn headlines_resembling_error_pages_are_extracted() {
    for title in [
        "Just a moment of silence as Senate honors fallen officers",
        "Access denied: Senate blocks nominee vote",
    ] {
        let url = "https://nypost.com/2024/05/02/us-news/senate-story/";
        let renderer = Arc::new(ScriptedRenderer::with_page(url, &nypost_page(title, BODY_50, "")));
        let pipeline = pipeline_with(Arc::clone(&renderer));

        let outcome = pipeline.extract(url).await.unwrap();
        let record = outcome.record().expect("accepted");
        assert_eq!(record.title, title);
        assert_eq!(renderer.opened(), 1);
        assert_eq!(renderer.closed(), 1);
    }
}

#[tokio::test]
async fn interstitial_page_is_a_fetch_error() {
    let url = "https://nypost.com/2024/05/03/us-news/blocked/";
    let html = "<html><head><title>Just a moment...</title></head><body></body></html>";
    let renderer = Arc::new(ScriptedRenderer::with_page(url, html));
    let pipeline = pipeline_with(Arc::clone(&renderer));

    let err = pipeline.extract(url).await.unwrap_err();
    assert!(err.is_fetch());
    assert_eq!(renderer.closed(), 1);
}

#[test]
fn two_character_title_is_rejected() {
    let outcome = html_pipeline()
        .extract_html(
            &nypost_page("Hi", BODY_50, ""),
            "https://nypost.com/2024/05/01/us-news/hi/",
        )
        .unwrap();
    match outcome {
        ExtractionOutcome::Rejected { reason, engine, .. } => {
            assert_eq!(reason, RejectReason::TitleTooShort);
            assert_eq!(engine, "New York Post");
        }
        other => panic!("expected rejection, got {other:?}"),
    }
}

#[test]
fn blob_video_leaves_no_videos() {
    let html = r#"<html><head><title>Storm closes schools across the city</title></head>
<body><h1>Storm closes schools across the city</h1>
<div class="entry-content">
  <p>Officials closed every public school on Friday as the storm moved in from the coast.</p>
  <video src="blob:https://nypost.com/5f2c9a"></video>
</div></body></html>"#;
    let outcome = html_pipeline()
        .extract_html(html, "https://nypost.com/2024/05/01/metro/storm/")
        .unwrap();

    let record = outcome.record().expect("accepted");
    assert!(record.videos.is_empty());
    assert_eq!(record.images, vec![DEFAULT_IMAGE.to_string()]);

    let blob = outcome
        .verdicts()
        .iter()
        .find(|v| v.candidate.url.starts_with("blob:"))
        .expect("blob candidate recorded");
    assert!(!blob.accepted);
    assert_eq!(blob.reason, VerdictReason::EphemeralUrl);
}

#[test]
fn doubleclick_og_image_is_rejected() {
    let meta = r#"<meta property="og:image" content="https://ad.doubleclick.net/ddm/ad/lead.jpg">"#;
    let outcome = html_pipeline()
        .extract_html(
            &nypost_page("Senate passes bill", BODY_50, meta),
            "https://nypost.com/2024/05/01/us-news/senate-passes-bill/",
        )
        .unwrap();

    let record = outcome.record().expect("accepted");
    assert!(!record.images.iter().any(|u| u.contains("doubleclick")));
    assert_eq!(record.images, vec![POLITICS_IMAGE.to_string()]);

    let ad = &outcome.verdicts()[0];
    assert_eq!(ad.candidate.tier, MediaTier::Meta);
    assert_eq!(ad.reason, VerdictReason::AdDomain);
}

#[test]
fn editorial_og_image_beats_fallback() {
    let meta = r#"<meta property="og:image" content="https://nypost.com/wp-content/uploads/2024/05/senate.jpg">"#;
    let outcome = html_pipeline()
        .extract_html(
            &nypost_page("Senate passes bill", BODY_50, meta),
            "https://nypost.com/2024/05/01/us-news/senate-passes-bill/",
        )
        .unwrap();
    let record = outcome.record().expect("accepted");
    assert_eq!(
        record.images,
        vec!["https://nypost.com/wp-content/uploads/2024/05/senate.jpg".to_string()]
    );
    assert!(!record.used_fallback_image);
}

#[test]
fn media_priority_differs_per_engine() {
    let html = r#"<html><head>
<meta property="og:image" content="https://thehill.com/wp-content/uploads/2024/05/og.jpg">
</head><body><h1>House votes on spending package</h1>
<div class="article__text">
  <p>Lawmakers approved the package after a long night of negotiations on the floor.</p>
  <img src="https://thehill.com/wp-content/uploads/2024/05/floor.jpg" alt="House floor">
</div></body></html>"#;
    let outcome = html_pipeline()
        .extract_html(html, "https://thehill.com/homenews/house/4650000-spending/")
        .unwrap();
    let record = outcome.record().expect("accepted");
    assert_eq!(
        record.images,
        vec![
            "https://thehill.com/wp-content/uploads/2024/05/floor.jpg".to_string(),
            "https://thehill.com/wp-content/uploads/2024/05/og.jpg".to_string(),
        ]
    );
}

#[test]
fn extract_media_is_idempotent() {
    let registry = load_builtin_registry().unwrap();
    let engine = registry.resolve_domain("nypost.com").unwrap();
    let html = r#"<html><head>
<meta property="og:image" content="https://nypost.com/wp-content/uploads/lead.jpg">
<meta name="twitter:image" content="https://ad.doubleclick.net/x.jpg">
</head><body><h1>Mayor unveils budget plan</h1>
<div class="entry-content">
  <p>The mayor presented a spending plan that trims overtime across city agencies.</p>
  <img src="https://nypost.com/wp-content/uploads/chart.jpg">
  <img src="https://nypost.com/wp-content/uploads/lead.jpg">
  <img src="/static/site-logo.png">
</div></body></html>"#;
    let page = RawPage::from_html(Url::parse("https://nypost.com/2024/05/02/metro/budget/").unwrap(), html);

    let fields = engine.extract_fields(&page);
    let first = engine.extract_media(&page, &fields);
    let second = engine.extract_media(&page, &fields);
    assert_eq!(first, second);
    assert_eq!(
        first.images(),
        vec![
            "https://nypost.com/wp-content/uploads/lead.jpg".to_string(),
            "https://nypost.com/wp-content/uploads/chart.jpg".to_string(),
        ]
    );
    assert!(first
        .verdicts
        .iter()
        .any(|v| v.reason == VerdictReason::Duplicate));
}

#[test]
fn www_and_bare_domains_use_the_same_engine() {
    let pipeline = html_pipeline();
    let html = nypost_page("Senate passes bill", BODY_50, "");
    let bare = pipeline
        .extract_html(&html, "https://nypost.com/2024/05/01/us-news/senate/")
        .unwrap();
    let www = pipeline
        .extract_html(&html, "https://www.nypost.com/2024/05/01/us-news/senate/")
        .unwrap();
    assert_eq!(bare.record().unwrap().source_name, "New York Post");
    assert_eq!(www.record().unwrap().source_name, "New York Post");
    assert_eq!(www.record().unwrap().source_domain, "nypost.com");
}

#[tokio::test]
async fn unknown_domain_is_unroutable() {
    let renderer = Arc::new(ScriptedRenderer::default());
    let pipeline = pipeline_with(Arc::clone(&renderer));
    let outcome = pipeline.extract("https://example.org/story").await.unwrap();
    match outcome {
        ExtractionOutcome::Unroutable { domain, .. } => assert_eq!(domain, "example.org"),
        other => panic!("expected routing miss, got {other:?}"),
    }
    assert_eq!(renderer.opened(), 0);
}

#[test]
fn conflicting_engine_is_refused() {
    let mut registry = load_builtin_registry().unwrap();
    let copycat = SourceEngine::new(EngineConfig::new("Copycat", ["www.thehill.com"])).unwrap();
    let err = registry.register_engine(copycat).unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateDomain { ref existing, .. } if existing == "The Hill"));
    assert_eq!(registry.resolve("https://thehill.com/a").unwrap().name(), "The Hill");
}

#[tokio::test]
async fn page_load_timeout_releases_session() {
    let url = "https://nypost.com/2024/05/01/us-news/slow/";
    let renderer = Arc::new(
        ScriptedRenderer::with_page(url, &nypost_page("Senate passes bill", BODY_50, ""))
            .slow(Duration::from_millis(500)),
    );
    let pipeline = Pipeline::builder()
        .registry(load_builtin_registry().unwrap())
        .renderer(Arc::clone(&renderer) as Arc<dyn Renderer>)
        .page_load_timeout(Duration::from_millis(50))
        .build()
        .unwrap();

    let err = pipeline.extract(url).await.unwrap_err();
    assert!(err.is_timeout(), "{err}");
    assert_eq!(renderer.opened(), 1);
    assert_eq!(renderer.closed(), 1);
}

#[tokio::test]
async fn deadline_cancels_without_a_record() {
    let url = "https://nypost.com/2024/05/01/us-news/cancelled/";
    let renderer = Arc::new(
        ScriptedRenderer::with_page(url, &nypost_page("Senate passes bill", BODY_50, ""))
            .slow(Duration::from_millis(500)),
    );
    let pipeline = Pipeline::builder()
        .registry(load_builtin_registry().unwrap())
        .renderer(Arc::clone(&renderer) as Arc<dyn Renderer>)
        .deadline(Duration::from_millis(50))
        .build()
        .unwrap();

    let err = pipeline.extract_with_retry(url).await.unwrap_err();
    assert!(err.is_cancelled(), "{err}");
    // Cancellation is not retried
    assert_eq!(renderer.opened(), 1);
    assert_eq!(renderer.closed(), 1);
}

#[tokio::test]
async fn dropped_extraction_releases_session() {
    let url = "https://nypost.com/2024/05/01/us-news/dropped/";
    let renderer = Arc::new(
        ScriptedRenderer::with_page(url, &nypost_page("Senate passes bill", BODY_50, ""))
            .slow(Duration::from_secs(5)),
    );
    let pipeline = pipeline_with(Arc::clone(&renderer));

    let result = tokio::time::timeout(Duration::from_millis(50), pipeline.extract(url)).await;
    assert!(result.is_err());
    assert_eq!(renderer.opened(), 1);
    assert_eq!(renderer.closed(), 1);
}

#[tokio::test]
async fn concurrent_extractions_hold_separate_sessions() {
    let urls: Vec<String> = (0..4)
        .map(|i| format!("https://nypost.com/2024/05/01/us-news/story-{i}/"))
        .collect();
    let pages = urls
        .iter()
        .map(|u| (u.clone(), nypost_page("Senate passes bill", BODY_50, "")))
        .collect();
    let renderer = Arc::new(ScriptedRenderer {
        pages,
        content_delay: Duration::from_millis(20),
        ..Default::default()
    });
    let pipeline = pipeline_with(Arc::clone(&renderer));

    let mut handles = Vec::new();
    for url in urls {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move { pipeline.extract(&url).await }));
    }
    for handle in handles {
        assert!(handle.await.unwrap().unwrap().is_accepted());
    }
    assert_eq!(renderer.opened(), 4);
    assert_eq!(renderer.closed(), 4);
}

#[tokio::test]
async fn http_renderer_end_to_end() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET).path("/politics/senate-vote");
        then.status(200)
            .header("content-type", "text/html; charset=utf-8")
            .body(format!(
                r#"<html><head><title>Senate vote delayed again</title>
<meta property="og:image" content="{}">
<meta property="og:description" content="Leaders pushed the vote to next week.">
</head><body><article>
<h1>Senate vote delayed again</h1>
<p>Leaders pushed the vote to next week after two senators tested positive.</p>
<p class="byline">By Jane Roe</p>
</article></body></html>"#,
                server.url("/img/senate.jpg")
            ));
    });

    let mut config = EngineConfig::new("Local Desk", ["127.0.0.1"]);
    config.title = LocatorChain::new(vec![Locator::css("h1"), Locator::meta("og:title")]);
    config.description = LocatorChain::new(vec![Locator::meta("og:description")]);
    config.body = LocatorChain::new(vec![Locator::paragraphs("article")]);
    config.author = LocatorChain::new(vec![Locator::css("p.byline")]).strip("^By\\s+");
    let mut registry = EngineRegistry::new();
    registry.register_engine(SourceEngine::new(config).unwrap()).unwrap();

    let pipeline = Pipeline::builder()
        .registry(registry)
        .allow_private_networks(true)
        .build()
        .unwrap();

    let outcome = pipeline.extract(&server.url("/politics/senate-vote")).await.unwrap();
    mock.assert();

    let record = outcome.record().expect("accepted");
    assert_eq!(record.title, "Senate vote delayed again");
    assert_eq!(record.description, "Leaders pushed the vote to next week.");
    assert_eq!(record.author.as_deref(), Some("Jane Roe"));
    assert_eq!(record.images, vec![server.url("/img/senate.jpg")]);
    assert!(!record.used_fallback_image);
}

#[tokio::test]
async fn private_hosts_are_blocked_by_default() {
    let server = MockServer::start();
    let mut registry = EngineRegistry::new();
    registry
        .register_engine(SourceEngine::new(EngineConfig::new("Local Desk", ["127.0.0.1"])).unwrap())
        .unwrap();
    let pipeline = Pipeline::builder().registry(registry).build().unwrap();

    let err = pipeline.extract(&server.url("/story")).await.unwrap_err();
    assert!(err.is_ssrf(), "{err}");
}
