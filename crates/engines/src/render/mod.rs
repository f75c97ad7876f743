// ABOUTME: Renderer contract consumed by engines plus the scoped RenderSession guard and RawPage snapshot.
// ABOUTME: A session is closed on every path, including timeout and cancellation, by the guard's Drop.

//! Rendering.
//!
//! The core treats rendering as an opaque capability: [`Renderer::render`]
//! opens a page and returns a [`PageHandle`], [`Renderer::content`] reads the
//! DOM once dynamic content has settled, and [`Renderer::close`] releases the
//! page. [`RenderSession`] owns a handle for the duration of one extraction.

use std::fmt;
use std::time::Duration;

use aho_corasick::{AhoCorasick, MatchKind};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use scraper::Html;
use tracing::debug;
use url::Url;

use crate::error::ExtractError;
use crate::extractors::compiled;
use crate::extractors::resolve::normalize_whitespace;

pub mod http;

pub use http::HttpRenderer;

/// How long rendering may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    /// Upper bound on loading the page
    pub page_load_timeout: Duration,
    /// Pause after load for scripts to populate the DOM
    pub settle: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            page_load_timeout: Duration::from_secs(60),
            settle: Duration::ZERO,
        }
    }
}

impl WaitPolicy {
    /// Total time an extraction may spend inside the renderer.
    pub fn budget(&self) -> Duration {
        self.page_load_timeout.saturating_add(self.settle)
    }
}

/// An open page inside a renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageHandle {
    pub id: u64,
    pub requested_url: Url,
    /// Where the renderer ended up after redirects
    pub final_url: Url,
}

/// A rendering backend: headless browser, plain HTTP, or a test double.
#[async_trait]
pub trait Renderer: Send + Sync + fmt::Debug {
    /// Loads `url`, honoring `wait.page_load_timeout`.
    async fn render(&self, url: &Url, wait: &WaitPolicy) -> Result<PageHandle, ExtractError>;

    /// Returns the current serialized DOM of an open page.
    async fn content(&self, page: &PageHandle) -> Result<String, ExtractError>;

    /// Releases an open page. Must be idempotent and must not block.
    fn close(&self, page: &PageHandle);
}

/// Exclusive ownership of one open page for one extraction.
pub struct RenderSession<'r> {
    renderer: &'r dyn Renderer,
    page: Option<PageHandle>,
}

impl<'r> RenderSession<'r> {
    /// Opens a page. A failed render leaves nothing to release.
    pub async fn acquire(
        renderer: &'r dyn Renderer,
        url: &Url,
        wait: &WaitPolicy,
    ) -> Result<RenderSession<'r>, ExtractError> {
        let page = renderer.render(url, wait).await?;
        debug!(page_id = page.id, url = %url, "render session acquired");
        Ok(Self {
            renderer,
            page: Some(page),
        })
    }

    pub fn page(&self) -> Option<&PageHandle> {
        self.page.as_ref()
    }

    /// Reads the page and releases the session.
    pub async fn into_raw_page(mut self) -> Result<RawPage, ExtractError> {
        let Some(page) = self.page.as_ref() else {
            return Err(ExtractError::fetch("", "Render", Some(anyhow::anyhow!("session already released"))));
        };
        let html = self.renderer.content(page).await?;
        let raw = RawPage {
            url: page.requested_url.clone(),
            final_url: page.final_url.clone(),
            html,
        };
        self.release();
        Ok(raw)
    }

    /// Closes the page now rather than at drop.
    pub fn release(&mut self) {
        if let Some(page) = self.page.take() {
            debug!(page_id = page.id, "render session released");
            self.renderer.close(&page);
        }
    }
}

impl Drop for RenderSession<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for RenderSession<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderSession")
            .field("page", &self.page)
            .finish()
    }
}

/// Titles that browsers and bot walls show instead of the article.
const ERROR_TITLE_MARKERS: &[&str] = &[
    "this site can't be reached",
    "this site can\u{2019}t be reached",
    "site can't be reached",
    "site can\u{2019}t be reached",
    "just a moment",
    "attention required",
    "access denied",
    "checking your browser",
    "verify you are human",
    "page not found",
    "404 not found",
];

/// Words an error title may carry after its marker, such as a status code or server name.
const ERROR_TITLE_TRAILING_WORDS: usize = 2;

/// Separators between a page title and the site name.
const TITLE_SITE_SEPARATORS: &[&str] = &[" | ", " - ", " \u{2013} ", " \u{2014} "];

/// Markup fragments that only appear on challenge interstitials.
const CHALLENGE_MARKUP_MARKERS: &[&str] = &[
    "cf-browser-verification",
    "cf-challenge",
    "cf-turnstile",
    "challenge-platform",
    "cf-chl-bypass",
];

static ERROR_TITLES: Lazy<Option<AhoCorasick>> = Lazy::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .match_kind(MatchKind::LeftmostLongest)
        .build(ERROR_TITLE_MARKERS)
        .ok()
});

static CHALLENGE_MARKUP: Lazy<Option<AhoCorasick>> = Lazy::new(|| {
    AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(CHALLENGE_MARKUP_MARKERS)
        .ok()
});

/// The rendered page obtained for one extraction. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPage {
    pub url: Url,
    pub final_url: Url,
    pub html: String,
}

impl RawPage {
    /// Wraps already-rendered HTML.
    pub fn from_html(url: Url, html: impl Into<String>) -> Self {
        Self {
            final_url: url.clone(),
            url,
            html: html.into(),
        }
    }

    /// Parses the HTML. The returned document is not `Send`; keep it out of `.await` scopes.
    pub fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }

    /// Base for resolving relative media URLs.
    pub fn base_url(&self) -> &Url {
        &self.final_url
    }

    /// The `<title>` text, whitespace-normalized.
    pub fn title(&self) -> Option<String> {
        let sel = compiled::selector("title")?;
        let doc = self.document();
        let text = doc
            .select(&sel)
            .next()
            .map(|el| normalize_whitespace(&el.text().collect::<String>()))?;
        (!text.is_empty()).then_some(text)
    }

    /// Describes why this page looks like a browser error or bot challenge
    /// rather than an article.
    pub fn error_marker(&self) -> Option<String> {
        if let Some(title) = self.title().filter(|t| is_error_title(t)) {
            return Some(format!("error page title {title:?}"));
        }
        if let Some(ac) = CHALLENGE_MARKUP.as_ref() {
            if let Some(m) = ac.find(&self.html) {
                return Some(format!(
                    "challenge markup {:?}",
                    CHALLENGE_MARKUP_MARKERS[m.pattern().as_usize()]
                ));
            }
        }
        None
    }
}

/// True when the title, minus any site name, is an error marker on its own.
///
/// A headline that merely opens with the same words ("Just a moment of
/// silence ...") is an article, not an interstitial.
fn is_error_title(title: &str) -> bool {
    let Some(ac) = ERROR_TITLES.as_ref() else {
        return false;
    };
    let head = TITLE_SITE_SEPARATORS
        .iter()
        .filter_map(|sep| title.find(sep))
        .min()
        .map_or(title, |idx| &title[..idx])
        .trim();
    let Some(m) = ac.find(head).filter(|m| m.start() == 0) else {
        return false;
    };
    let trailing = head[m.end()..]
        .split_whitespace()
        .filter(|w| w.chars().any(char::is_alphanumeric))
        .count();
    trailing <= ERROR_TITLE_TRAILING_WORDS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingRenderer {
        opened: AtomicUsize,
        closed: AtomicUsize,
    }

    #[async_trait]
    impl Renderer for CountingRenderer {
        async fn render(&self, url: &Url, _wait: &WaitPolicy) -> Result<PageHandle, ExtractError> {
            let id = self.opened.fetch_add(1, Ordering::SeqCst) as u64;
            Ok(PageHandle {
                id,
                requested_url: url.clone(),
                final_url: url.clone(),
            })
        }

        async fn content(&self, _page: &PageHandle) -> Result<String, ExtractError> {
            Ok("<html><head><title>Story</title></head></html>".to_string())
        }

        fn close(&self, _page: &PageHandle) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn url() -> Url {
        Url::parse("https://nypost.com/x").unwrap()
    }

    #[tokio::test]
    async fn session_released_after_snapshot() {
        let r = CountingRenderer::default();
        let session = RenderSession::acquire(&r, &url(), &WaitPolicy::default()).await.unwrap();
        let page = session.into_raw_page().await.unwrap();
        assert_eq!(page.title().as_deref(), Some("Story"));
        assert_eq!(r.opened.load(Ordering::SeqCst), 1);
        assert_eq!(r.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropped_session_is_released_once() {
        let r = CountingRenderer::default();
        {
            let mut session = RenderSession::acquire(&r, &url(), &WaitPolicy::default())
                .await
                .unwrap();
            session.release();
        }
        {
            let _session = RenderSession::acquire(&r, &url(), &WaitPolicy::default())
                .await
                .unwrap();
        }
        assert_eq!(r.opened.load(Ordering::SeqCst), 2);
        assert_eq!(r.closed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn detects_browser_error_pages() {
        let page = RawPage::from_html(
            url(),
            "<html><head><title>This site can\u{2019}t be reached</title></head></html>",
        );
        assert!(page.error_marker().is_some());

        let challenge = RawPage::from_html(url(), r#"<div id="cf-challenge-running"></div>"#);
        assert!(challenge.error_marker().unwrap().contains("cf-challenge"));

        let story = RawPage::from_html(url(), "<title>Senate passes bill</title><p>Text</p>");
        assert_eq!(story.error_marker(), None);
    }

    #[test]
    fn error_titles_must_stand_alone() {
        for title in [
            "Just a moment...",
            "Access Denied | Cloudflare",
            "Page not found - The Hill",
            "404 Not Found nginx",
            "Attention Required! | Cloudflare",
        ] {
            assert!(is_error_title(title), "{title}");
        }
        for title in [
            "Just a moment of silence as Senate honors fallen officers | New York Post",
            "Access denied: Senate blocks nominee vote",
            "Voters say page not found on state election site",
        ] {
            assert!(!is_error_title(title), "{title}");
        }
    }

    #[test]
    fn wait_budget_adds_settle() {
        let wait = WaitPolicy {
            page_load_timeout: Duration::from_secs(60),
            settle: Duration::from_secs(5),
        };
        assert_eq!(wait.budget(), Duration::from_secs(65));
    }
}
