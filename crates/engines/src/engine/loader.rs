// ABOUTME: Loads engine configurations from embedded or on-disk JSON and builds an EngineRegistry.
// ABOUTME: Provides load_builtin_registry() for the sites shipped with the crate.

//! Engine registry loader.
//!
//! Engine definitions are a JSON array of [`EngineConfig`] objects. The
//! builtin set is embedded at compile time; deployments can point at their
//! own file with [`load_registry_from_path`].

use std::path::Path;

use tracing::debug;

use crate::engine::registry::EngineRegistry;
use crate::engine::{EngineConfig, SourceEngine};
use crate::error::RegistryError;

/// Embedded JSON containing the builtin engines.
const BUILTIN_ENGINES_JSON: &str = include_str!("../../data/engines.json");

/// Parses a JSON array of engine configs.
pub fn load_engine_configs(json: &str) -> Result<Vec<EngineConfig>, RegistryError> {
    Ok(serde_json::from_str(json)?)
}

/// Compiles each config and registers it under its domains.
///
/// The first engine to claim a domain keeps it; a later claim fails the
/// whole build with [`RegistryError::DuplicateDomain`].
pub fn build_registry<I>(configs: I) -> Result<EngineRegistry, RegistryError>
where
    I: IntoIterator<Item = EngineConfig>,
{
    let mut registry = EngineRegistry::new();
    for config in configs {
        let engine = registry.register_engine(SourceEngine::new(config)?)?;
        debug!(engine = %engine.name(), domains = ?engine.domains(), "engine registered");
    }
    Ok(registry)
}

/// Loads the builtin engine registry.
pub fn load_builtin_registry() -> Result<EngineRegistry, RegistryError> {
    build_registry(load_engine_configs(BUILTIN_ENGINES_JSON)?)
}

/// Loads engines from a JSON file.
pub fn load_registry_from_path(path: impl AsRef<Path>) -> Result<EngineRegistry, RegistryError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    build_registry(load_engine_configs(&json)?)
}
