// ABOUTME: SourceEngine binds a site's domains to locator chains, media rules, a fallback table and validation rules.
// ABOUTME: All engines share one algorithm; per-site variation lives entirely in EngineConfig data.

//! Source engines.
//!
//! An engine is built from an [`EngineConfig`] and exposes the same surface
//! for every site:
//!
//! - [`SourceEngine::can_handle`]: cheap, I/O-free URL test
//! - [`SourceEngine::fetch_and_parse`]: drives a [`Renderer`] under a bounded wait
//! - [`SourceEngine::extract_fields`]: resolves each field's locator chain
//! - [`SourceEngine::extract_media`]: harvest, classify, fallback
//! - [`SourceEngine::validate`]: shared minimums, optionally tightened

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use url::Url;

use crate::error::{ExtractError, RegistryError};
use crate::extractors::compiled;
use crate::extractors::fields::{description_from_body, parse_date};
use crate::extractors::locator::LocatorChain;
use crate::extractors::resolve::resolve_field;
use crate::media::harvest::harvest;
use crate::media::{
    MediaClassifier, MediaReport, MediaRules, MediaVerdict, TopicImageTable, VerdictReason,
};
use crate::record::{ContentRecord, ExtractedFields, ExtractionRequest};
use crate::render::{RawPage, RenderSession, Renderer, WaitPolicy};
use crate::validate::{ContentValidator, RejectReason, ValidationRules};

pub mod loader;
pub mod registry;

/// Declarative definition of one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Human-readable source name, e.g. "New York Post"
    pub name: String,
    /// Hosts this engine serves, without `www.`
    pub domains: Vec<String>,
    /// URL path fragments the engine declines (e.g. live blogs)
    #[serde(default)]
    pub excluded_paths: Vec<String>,
    /// Query parameters that re-admit an excluded path
    #[serde(default)]
    pub entry_params: Vec<String>,
    #[serde(default)]
    pub title: LocatorChain,
    #[serde(default)]
    pub description: LocatorChain,
    #[serde(default)]
    pub body: LocatorChain,
    #[serde(default)]
    pub author: LocatorChain,
    #[serde(default)]
    pub published_at: LocatorChain,
    #[serde(default)]
    pub media: MediaRules,
    #[serde(default)]
    pub fallback: TopicImageTable,
    #[serde(default)]
    pub validation: ValidationRules,
}

impl EngineConfig {
    /// A config with the given name and domains and every other setting defaulted.
    pub fn new<I, S>(name: impl Into<String>, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            domains: domains.into_iter().map(Into::into).collect(),
            excluded_paths: Vec::new(),
            entry_params: Vec::new(),
            title: LocatorChain::default(),
            description: LocatorChain::default(),
            body: LocatorChain::default(),
            author: LocatorChain::default(),
            published_at: LocatorChain::default(),
            media: MediaRules::default(),
            fallback: TopicImageTable::default(),
            validation: ValidationRules::default(),
        }
    }

    fn chains(&self) -> [(&'static str, &LocatorChain); 5] {
        [
            ("title", &self.title),
            ("description", &self.description),
            ("body", &self.body),
            ("author", &self.author),
            ("published_at", &self.published_at),
        ]
    }
}

/// A compiled, ready-to-run engine.
#[derive(Debug)]
pub struct SourceEngine {
    config: EngineConfig,
    domains: HashSet<String>,
    classifier: MediaClassifier,
}

impl SourceEngine {
    /// Validates and compiles a config. Invalid selectors, regexes or an
    /// empty domain list are configuration errors.
    pub fn new(config: EngineConfig) -> Result<Self, RegistryError> {
        let name = config.name.trim();
        if name.is_empty() {
            return Err(RegistryError::invalid("<unnamed>", "engine name is empty"));
        }

        let domains: HashSet<String> = config
            .domains
            .iter()
            .map(|d| registry::normalize_host(d))
            .filter(|d| !d.is_empty())
            .collect();
        if domains.is_empty() {
            return Err(RegistryError::invalid(name, "no domains configured"));
        }

        for (field, chain) in config.chains() {
            let bad = chain.precompile();
            if !bad.is_empty() {
                return Err(RegistryError::invalid(
                    name,
                    format!("{field}: invalid selectors or patterns {bad:?}"),
                ));
            }
        }
        let bad_scopes = compiled::precompile_selectors(&config.media.body_scopes);
        if !bad_scopes.is_empty() {
            return Err(RegistryError::invalid(
                name,
                format!("media.body_scopes: invalid selectors {bad_scopes:?}"),
            ));
        }
        if config.fallback.default_image.trim().is_empty() {
            return Err(RegistryError::invalid(name, "fallback.default_image is empty"));
        }

        let classifier = MediaClassifier::new(config.media.clone())
            .map_err(|e| RegistryError::invalid(name, format!("media patterns: {e}")))?;

        Ok(Self {
            config,
            domains,
            classifier,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Normalized domains, sorted.
    pub fn domains(&self) -> Vec<String> {
        let mut out: Vec<String> = self.domains.iter().cloned().collect();
        out.sort();
        out
    }

    /// Domain test plus path exclusions. No I/O.
    pub fn can_handle(&self, url: &str) -> bool {
        Url::parse(url.trim())
            .map(|u| self.can_handle_url(&u))
            .unwrap_or(false)
    }

    pub fn can_handle_url(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        if !self.domains.contains(&registry::normalize_host(host)) {
            return false;
        }
        let path = url.path();
        let excluded = self
            .config
            .excluded_paths
            .iter()
            .any(|p| !p.is_empty() && path.contains(p.as_str()));
        if !excluded {
            return true;
        }
        url.query_pairs()
            .any(|(k, v)| !v.is_empty() && self.config.entry_params.iter().any(|p| p == k.as_ref()))
    }

    /// Renders the request's URL within `wait.budget()`, holding one render
    /// session that is released on every exit path.
    pub async fn fetch_and_parse(
        &self,
        renderer: &dyn Renderer,
        request: &ExtractionRequest,
        wait: &WaitPolicy,
    ) -> Result<RawPage, ExtractError> {
        let work = async {
            let session = RenderSession::acquire(renderer, &request.url, wait).await?;
            if !wait.settle.is_zero() {
                tokio::time::sleep(wait.settle).await;
            }
            session.into_raw_page().await
        };

        let page = tokio::time::timeout(wait.budget(), work)
            .await
            .map_err(|_| {
                ExtractError::timeout(
                    request.url.as_str(),
                    "Render",
                    Some(anyhow::anyhow!("rendering exceeded {:?}", wait.budget())),
                )
            })??;

        if let Some(marker) = page.error_marker() {
            warn!(engine = %self.name(), url = %request.url, %marker, "renderer returned an error page");
            return Err(ExtractError::fetch(
                request.url.as_str(),
                "Render",
                Some(anyhow::anyhow!(marker)),
            ));
        }
        Ok(page)
    }

    /// Resolves every field. Exhausted chains leave the field empty.
    pub fn extract_fields(&self, page: &RawPage) -> ExtractedFields {
        let doc = page.document();
        let c = &self.config;

        let title = resolve_field(&doc, &c.title).unwrap_or_default();
        let body = resolve_field(&doc, &c.body).unwrap_or_default();
        let description = resolve_field(&doc, &c.description)
            .or_else(|| description_from_body(&body))
            .unwrap_or_default();
        let author = resolve_field(&doc, &c.author);
        let published_raw = resolve_field(&doc, &c.published_at);
        let published_at = published_raw.as_deref().and_then(parse_date);

        let fields = ExtractedFields {
            title,
            description,
            body,
            author,
            published_at,
            published_raw,
        };
        let missing = fields.missing();
        if !missing.is_empty() {
            debug!(engine = %self.name(), url = %page.url, ?missing, "partial extraction");
        }
        fields
    }

    /// Harvests and classifies media; substitutes the topic image when nothing survives.
    /// Deterministic for a given page and field set.
    pub fn extract_media(&self, page: &RawPage, fields: &ExtractedFields) -> MediaReport {
        let candidates = {
            let doc = page.document();
            harvest(&doc, page.base_url(), self.classifier.rules())
        };
        let mut report = self.classifier.classify(candidates);

        let rejected = report.verdicts.len();
        if report.is_empty() {
            let fallback = self.config.fallback.candidate(&fields.title);
            debug!(
                engine = %self.name(),
                rejected,
                image = %fallback.url,
                "no editorial media survived, using topic image"
            );
            report.accepted.push(fallback.clone());
            report.verdicts.push(MediaVerdict {
                candidate: fallback,
                accepted: true,
                reason: VerdictReason::FallbackSelected,
            });
        }
        report
    }

    /// Assembles the output record from fields and media.
    pub fn build_record(
        &self,
        page: &RawPage,
        fields: ExtractedFields,
        media: &MediaReport,
    ) -> ContentRecord {
        let source_domain = page
            .url
            .host_str()
            .map(registry::normalize_host)
            .unwrap_or_default();
        ContentRecord {
            url: page.url.to_string(),
            source_domain,
            source_name: self.config.name.clone(),
            title: fields.title,
            description: fields.description,
            body: fields.body,
            author: fields.author,
            published_at: fields.published_at,
            images: media.images(),
            videos: media.videos(),
            used_fallback_image: media.used_fallback(),
        }
    }

    /// Effective rules: the shared `base` tightened by this engine's own.
    pub fn validation_rules(&self, base: &ValidationRules) -> ValidationRules {
        base.tightened_by(&self.config.validation)
    }

    /// Validates against the shared default minimums.
    pub fn validate(&self, record: &ContentRecord) -> Result<(), RejectReason> {
        self.validate_against(record, &ValidationRules::default())
    }

    /// Validates against caller-supplied base minimums.
    pub fn validate_against(
        &self,
        record: &ContentRecord,
        base: &ValidationRules,
    ) -> Result<(), RejectReason> {
        ContentValidator::new(self.validation_rules(base)).validate(record)
    }
}
