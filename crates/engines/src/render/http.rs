// ABOUTME: Static-page Renderer backed by reqwest, reusing the SSRF-guarded fetch path.
// ABOUTME: Rotates user agents round-robin and tracks open pages so leaked sessions are observable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use crate::error::ExtractError;
use crate::render::{PageHandle, Renderer, WaitPolicy};
use crate::resource::{fetch, is_private_ip, FetchOptions};

/// Desktop browser user agents rotated across requests.
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
];

/// Renders pages with a plain HTTP GET. Suitable for server-rendered sites;
/// JavaScript-heavy sites need a browser-backed [`Renderer`].
#[derive(Debug)]
pub struct HttpRenderer {
    client: reqwest::Client,
    user_agents: Vec<String>,
    headers: HashMap<String, String>,
    allow_private_networks: bool,
    next_agent: AtomicUsize,
    next_id: AtomicU64,
    pages: Mutex<HashMap<u64, String>>,
}

/// Construction options for [`HttpRenderer`].
#[derive(Debug, Clone)]
pub struct HttpRendererConfig {
    pub timeout: Duration,
    pub user_agents: Vec<String>,
    pub headers: HashMap<String, String>,
    pub allow_private_networks: bool,
}

impl Default for HttpRendererConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            headers: HashMap::new(),
            allow_private_networks: false,
        }
    }
}

impl HttpRenderer {
    pub fn new(config: HttpRendererConfig) -> Result<Self, reqwest::Error> {
        let allow_private = config.allow_private_networks;
        // IP-literal redirect targets are refused here; hostnames are resolved
        // and checked again after the response arrives.
        let redirect_policy = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= 10 {
                return attempt.error("too many redirects");
            }
            if !allow_private {
                let blocked = attempt
                    .url()
                    .host_str()
                    .map(|h| h.trim_start_matches('[').trim_end_matches(']'))
                    .and_then(|h| h.parse::<std::net::IpAddr>().ok())
                    .is_some_and(|ip| is_private_ip(&ip));
                if blocked {
                    return attempt.error("redirect to private IP blocked");
                }
            }
            attempt.follow()
        });

        let client = reqwest::Client::builder()
            .redirect(redirect_policy)
            .timeout(config.timeout)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;

        Ok(Self::with_client(client, config))
    }

    /// Uses a caller-supplied HTTP client.
    pub fn with_client(client: reqwest::Client, config: HttpRendererConfig) -> Self {
        Self {
            client,
            user_agents: config.user_agents,
            headers: config.headers,
            allow_private_networks: config.allow_private_networks,
            next_agent: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            pages: Mutex::new(HashMap::new()),
        }
    }

    /// Number of pages rendered but not yet closed.
    pub fn active_sessions(&self) -> usize {
        self.pages.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn next_user_agent(&self) -> Option<String> {
        if self.user_agents.is_empty() {
            return None;
        }
        let idx = self.next_agent.fetch_add(1, Ordering::Relaxed) % self.user_agents.len();
        self.user_agents.get(idx).cloned()
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn render(&self, url: &Url, wait: &WaitPolicy) -> Result<PageHandle, ExtractError> {
        let opts = FetchOptions {
            headers: self.headers.clone(),
            user_agent: self.next_user_agent(),
            allow_private_networks: self.allow_private_networks,
        };

        let result = tokio::time::timeout(wait.page_load_timeout, fetch(&self.client, url.as_str(), &opts))
            .await
            .map_err(|_| {
                ExtractError::timeout(
                    url.as_str(),
                    "Render",
                    Some(anyhow::anyhow!("page load exceeded {:?}", wait.page_load_timeout)),
                )
            })??;

        if !result.is_html() {
            return Err(ExtractError::fetch(
                url.as_str(),
                "Render",
                Some(anyhow::anyhow!(
                    "unexpected content type {}",
                    result.content_type.as_deref().unwrap_or("")
                )),
            ));
        }

        let final_url = Url::parse(&result.final_url).unwrap_or_else(|_| url.clone());
        let html = result.text();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, html);
        debug!(page_id = id, status = result.status, bytes = result.body.len(), "page rendered");

        Ok(PageHandle {
            id,
            requested_url: url.clone(),
            final_url,
        })
    }

    async fn content(&self, page: &PageHandle) -> Result<String, ExtractError> {
        self.pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&page.id)
            .cloned()
            .ok_or_else(|| {
                ExtractError::fetch(
                    page.requested_url.as_str(),
                    "Render",
                    Some(anyhow::anyhow!("page {} is not open", page.id)),
                )
            })
    }

    fn close(&self, page: &PageHandle) {
        let removed = self
            .pages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&page.id);
        if removed.is_none() {
            warn!(page_id = page.id, "close called on unknown page");
        }
    }
}
