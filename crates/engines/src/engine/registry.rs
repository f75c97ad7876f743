// ABOUTME: Domain to SourceEngine lookup table, populated once at startup and read-only afterwards.
// ABOUTME: Registration is first-come and refuses conflicting claims; resolution is exact-match on the normalized host.

use std::collections::HashMap;
use std::sync::Arc;

use url::Url;

use crate::engine::SourceEngine;
use crate::error::RegistryError;

/// Lowercases a host and strips a leading `www.` and any trailing dot.
pub fn normalize_host(host: &str) -> String {
    let lower = host.trim().trim_end_matches('.').to_ascii_lowercase();
    match lower.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => lower,
    }
}

/// Registry for looking up engines by domain.
#[derive(Debug, Default, Clone)]
pub struct EngineRegistry {
    map: HashMap<String, Arc<SourceEngine>>,
    engines: Vec<Arc<SourceEngine>>,
}

impl EngineRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `domain_patterns` for `engine`.
    ///
    /// Fails without modifying the registry if any pattern is already claimed
    /// by a different engine. Re-claiming a pattern for the same engine is a no-op.
    pub fn register<I, S>(&mut self, domain_patterns: I, engine: Arc<SourceEngine>) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = domain_patterns
            .into_iter()
            .map(|p| normalize_host(p.as_ref()))
            .filter(|p| !p.is_empty())
            .collect();
        if patterns.is_empty() {
            return Err(RegistryError::invalid(engine.name(), "no domain patterns to register"));
        }

        for pattern in &patterns {
            if let Some(existing) = self.map.get(pattern) {
                if !Arc::ptr_eq(existing, &engine) {
                    return Err(RegistryError::DuplicateDomain {
                        domain: pattern.clone(),
                        existing: existing.name().to_string(),
                        incoming: engine.name().to_string(),
                    });
                }
            }
        }

        for pattern in patterns {
            self.map.insert(pattern, Arc::clone(&engine));
        }
        if !self.engines.iter().any(|e| Arc::ptr_eq(e, &engine)) {
            self.engines.push(engine);
        }
        Ok(())
    }

    /// Registers an engine under its own configured domains.
    pub fn register_engine(&mut self, engine: SourceEngine) -> Result<Arc<SourceEngine>, RegistryError> {
        let engine = Arc::new(engine);
        self.register(engine.domains(), Arc::clone(&engine))?;
        Ok(engine)
    }

    /// Finds the engine for a URL string. `None` is a routing miss.
    pub fn resolve(&self, url: &str) -> Option<&Arc<SourceEngine>> {
        let parsed = Url::parse(url.trim()).ok()?;
        self.resolve_url(&parsed)
    }

    pub fn resolve_url(&self, url: &Url) -> Option<&Arc<SourceEngine>> {
        self.resolve_domain(url.host_str()?)
    }

    /// Exact lookup on the normalized host.
    pub fn resolve_domain(&self, host: &str) -> Option<&Arc<SourceEngine>> {
        self.map.get(&normalize_host(host))
    }

    /// Registered engines in registration order.
    pub fn engines(&self) -> &[Arc<SourceEngine>] {
        &self.engines
    }

    /// All claimed domains, sorted.
    pub fn domains(&self) -> Vec<&str> {
        let mut out: Vec<&str> = self.map.keys().map(String::as_str).collect();
        out.sort_unstable();
        out
    }

    /// Returns the number of registered domain mappings.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if no engines are registered.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;

    fn engine(name: &str, domains: &[&str]) -> SourceEngine {
        SourceEngine::new(EngineConfig::new(name, domains.iter().copied())).unwrap()
    }

    #[test]
    fn normalize_strips_www_and_case() {
        assert_eq!(normalize_host("WWW.NYPost.com"), "nypost.com");
        assert_eq!(normalize_host("thehill.com."), "thehill.com");
        assert_eq!(normalize_host("abcnews.go.com"), "abcnews.go.com");
    }

    #[test]
    fn www_and_bare_hosts_resolve_to_same_engine() {
        let mut reg = EngineRegistry::new();
        reg.register_engine(engine("New York Post", &["nypost.com"])).unwrap();

        let a = reg.resolve("https://www.nypost.com/x").unwrap();
        let b = reg.resolve("https://nypost.com/x").unwrap();
        assert!(Arc::ptr_eq(a, b));
        assert_eq!(a.name(), "New York Post");
    }

    #[test]
    fn routing_miss_is_none() {
        let mut reg = EngineRegistry::new();
        reg.register_engine(engine("The Hill", &["thehill.com"])).unwrap();
        assert!(reg.resolve("https://example.org/story").is_none());
        assert!(reg.resolve("https://sub.thehill.com/story").is_none());
        assert!(reg.resolve("garbage").is_none());
    }

    #[test]
    fn duplicate_domain_is_refused_atomically() {
        let mut reg = EngineRegistry::new();
        reg.register_engine(engine("New York Post", &["nypost.com"])).unwrap();

        let err = reg
            .register_engine(engine("Copycat", &["pagesix.com", "www.nypost.com"]))
            .unwrap_err();
        match err {
            RegistryError::DuplicateDomain {
                domain,
                existing,
                incoming,
            } => {
                assert_eq!(domain, "nypost.com");
                assert_eq!(existing, "New York Post");
                assert_eq!(incoming, "Copycat");
            }
            other => panic!("unexpected error: {other}"),
        }
        // Nothing from the failed registration leaked in
        assert!(reg.resolve("https://pagesix.com/a").is_none());
        assert_eq!(reg.engines().len(), 1);
    }

    #[test]
    fn same_engine_may_reclaim_its_domains() {
        let mut reg = EngineRegistry::new();
        let e = reg.register_engine(engine("The Hill", &["thehill.com"])).unwrap();
        reg.register(["thehill.com", "www.thehill.com"], Arc::clone(&e)).unwrap();
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.engines().len(), 1);
    }
}
