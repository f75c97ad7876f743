// ABOUTME: Runtime options for the extraction pipeline and the fluent PipelineBuilder.
// ABOUTME: PipelineBuilder assembles a Pipeline with a registry, renderer, wait policy and retry settings.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::engine::loader::load_builtin_registry;
use crate::engine::registry::EngineRegistry;
use crate::error::BuildError;
use crate::pipeline::Pipeline;
use crate::render::http::{HttpRendererConfig, DEFAULT_USER_AGENTS};
use crate::render::{HttpRenderer, Renderer, WaitPolicy};
use crate::validate::ValidationRules;

/// Configuration options for the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub wait: WaitPolicy,
    /// Timeout of a single HTTP request made by the default renderer
    pub http_timeout: Duration,
    /// Rotated round-robin by the default renderer
    pub user_agents: Vec<String>,
    pub headers: HashMap<String, String>,
    pub allow_private_networks: bool,
    /// Total tries made by `extract_with_retry`, including the first
    pub max_attempts: u32,
    /// Delay before the first retry; doubles for each further retry
    pub retry_backoff: Duration,
    /// Hard limit on one extraction; exceeding it cancels the extraction
    pub deadline: Option<Duration>,
    /// Shared minimums every engine validates against
    pub validation: ValidationRules,
    pub registry: Option<EngineRegistry>,
    pub renderer: Option<Arc<dyn Renderer>>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            wait: WaitPolicy::default(),
            http_timeout: Duration::from_secs(30),
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            headers: HashMap::new(),
            allow_private_networks: false,
            max_attempts: 3,
            retry_backoff: Duration::from_millis(500),
            deadline: None,
            validation: ValidationRules::default(),
            registry: None,
            renderer: None,
        }
    }
}

/// Builder for constructing Pipeline instances with custom configuration.
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    opts: PipelineOptions,
}

impl PipelineBuilder {
    /// Create a new PipelineBuilder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the page-load timeout.
    pub fn page_load_timeout(mut self, timeout: Duration) -> Self {
        self.opts.wait.page_load_timeout = timeout;
        self
    }

    /// Set the pause after page load for dynamic content.
    pub fn settle(mut self, settle: Duration) -> Self {
        self.opts.wait.settle = settle;
        self
    }

    pub fn wait_policy(mut self, wait: WaitPolicy) -> Self {
        self.opts.wait = wait;
        self
    }

    /// Set the per-request HTTP timeout of the default renderer.
    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.opts.http_timeout = timeout;
        self
    }

    /// Replace the user-agent rotation list.
    pub fn user_agents<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.opts.user_agents = agents.into_iter().map(Into::into).collect();
        self
    }

    /// Add a custom header to all requests.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.opts.headers.insert(key.into(), value.into());
        self
    }

    /// Allow or disallow requests to private networks.
    pub fn allow_private_networks(mut self, allow: bool) -> Self {
        self.opts.allow_private_networks = allow;
        self
    }

    /// Set the number of attempts `extract_with_retry` makes. Clamped to at least one.
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.opts.max_attempts = attempts.max(1);
        self
    }

    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.opts.retry_backoff = backoff;
        self
    }

    /// Cancel any extraction that runs longer than `deadline`.
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.opts.deadline = Some(deadline);
        self
    }

    /// Set the shared validation minimums. Engines can only tighten these.
    pub fn validation(mut self, rules: ValidationRules) -> Self {
        self.opts.validation = rules;
        self
    }

    /// Use a custom engine registry instead of the builtin one.
    pub fn registry(mut self, registry: EngineRegistry) -> Self {
        self.opts.registry = Some(registry);
        self
    }

    /// Use a custom renderer instead of the HTTP renderer.
    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.opts.renderer = Some(renderer);
        self
    }

    /// Build the Pipeline with the configured options.
    pub fn build(mut self) -> Result<Pipeline, BuildError> {
        let registry = match self.opts.registry.take() {
            Some(registry) => registry,
            None => load_builtin_registry()?,
        };
        let renderer: Arc<dyn Renderer> = match self.opts.renderer.take() {
            Some(renderer) => renderer,
            None => Arc::new(HttpRenderer::new(HttpRendererConfig {
                timeout: self.opts.http_timeout,
                user_agents: self.opts.user_agents.clone(),
                headers: self.opts.headers.clone(),
                allow_private_networks: self.opts.allow_private_networks,
            })?),
        };
        Ok(Pipeline::new(registry, renderer, self.opts))
    }
}
