// ABOUTME: The Pipeline facade: route a URL to its engine, render, extract, classify media and validate.
// ABOUTME: Provides async extract() and extract_with_retry() plus extract_html() for already-rendered pages.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::engine::registry::EngineRegistry;
use crate::engine::SourceEngine;
use crate::error::ExtractError;
use crate::options::{PipelineBuilder, PipelineOptions};
use crate::record::{ExtractionOutcome, ExtractionRequest};
use crate::render::{RawPage, Renderer};

/// Runs extractions against a fixed registry and renderer.
///
/// The registry is read-only after construction, so one pipeline can serve
/// any number of concurrent extractions; each holds its own render session.
#[derive(Debug, Clone)]
pub struct Pipeline {
    registry: Arc<EngineRegistry>,
    renderer: Arc<dyn Renderer>,
    opts: PipelineOptions,
}

impl Pipeline {
    /// Create a new PipelineBuilder for configuring the pipeline.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub(crate) fn new(
        registry: EngineRegistry,
        renderer: Arc<dyn Renderer>,
        opts: PipelineOptions,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            renderer,
            opts,
        }
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    pub fn renderer(&self) -> &Arc<dyn Renderer> {
        &self.renderer
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.opts
    }

    /// The engine that serves `request`, if its domain is registered and the
    /// engine accepts the URL's path.
    fn route(&self, request: &ExtractionRequest) -> Option<&Arc<SourceEngine>> {
        self.registry
            .resolve_domain(&request.domain)
            .filter(|engine| engine.can_handle_url(&request.url))
    }

    /// Extracts one article.
    ///
    /// Routing misses and failed validation are outcomes; only invalid input,
    /// rendering failures and an exceeded deadline are errors. A cancelled
    /// extraction never yields a record.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn extract(&self, url: &str) -> Result<ExtractionOutcome, ExtractError> {
        let request = ExtractionRequest::parse(url)?;
        let Some(engine) = self.route(&request) else {
            info!(domain = %request.domain, "no engine for URL");
            return Ok(ExtractionOutcome::Unroutable {
                url: request.url.to_string(),
                domain: request.domain,
            });
        };
        debug!(engine = %engine.name(), "routed");

        let fetch = engine.fetch_and_parse(self.renderer.as_ref(), &request, &self.opts.wait);
        let page = match self.opts.deadline {
            Some(deadline) => tokio::time::timeout(deadline, fetch).await.map_err(|_| {
                warn!(?deadline, "extraction deadline exceeded");
                ExtractError::cancelled(
                    request.url.as_str(),
                    "Extract",
                    Some(anyhow::anyhow!("deadline of {deadline:?} exceeded")),
                )
            })??,
            None => fetch.await?,
        };

        Ok(self.process_page(engine, &page))
    }

    /// Like [`Pipeline::extract`], retrying fetch failures and timeouts with
    /// exponential backoff up to `max_attempts` tries in total.
    #[instrument(skip_all, fields(url = %url))]
    pub async fn extract_with_retry(&self, url: &str) -> Result<ExtractionOutcome, ExtractError> {
        let attempts = self.opts.max_attempts.max(1);
        let mut delay = self.opts.retry_backoff;
        let mut attempt = 1;
        loop {
            match self.extract(url).await {
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!(attempt, ?delay, error = %err, "extraction failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay = delay.saturating_mul(2);
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Runs the pipeline on HTML that was rendered elsewhere.
    pub fn extract_html(&self, html: &str, url: &str) -> Result<ExtractionOutcome, ExtractError> {
        if html.trim().is_empty() {
            return Err(ExtractError::invalid_url(
                url,
                "ExtractHTML",
                Some(anyhow::anyhow!("empty HTML")),
            ));
        }
        let request = ExtractionRequest::parse(url)?;
        let Some(engine) = self.route(&request) else {
            return Ok(ExtractionOutcome::Unroutable {
                url: request.url.to_string(),
                domain: request.domain,
            });
        };
        let page = RawPage::from_html(request.url, html);
        Ok(self.process_page(engine, &page))
    }

    fn process_page(&self, engine: &SourceEngine, page: &RawPage) -> ExtractionOutcome {
        let fields = engine.extract_fields(page);
        let media = engine.extract_media(page, &fields);
        let record = engine.build_record(page, fields, &media);

        match engine.validate_against(&record, &self.opts.validation) {
            Ok(()) => {
                info!(
                    engine = %engine.name(),
                    images = record.images.len(),
                    videos = record.videos.len(),
                    words = record.word_count(),
                    fallback = record.used_fallback_image,
                    "article accepted"
                );
                ExtractionOutcome::Accepted {
                    record,
                    verdicts: media.verdicts,
                }
            }
            Err(reason) => {
                info!(engine = %engine.name(), %reason, "article rejected");
                ExtractionOutcome::Rejected {
                    url: record.url,
                    engine: engine.name().to_string(),
                    reason,
                    verdicts: media.verdicts,
                }
            }
        }
    }
}
