// ABOUTME: Main library entry point for the newsdesk article extraction engines.
// ABOUTME: Re-exports the public API: Pipeline, PipelineBuilder, EngineRegistry, SourceEngine, outcomes and errors.

//! Newsdesk - per-site news article extraction.
//!
//! Each supported publication is described by an [`EngineConfig`]: ordered
//! locator chains for every field, media rules, a topic image table and
//! validation minimums. The [`Pipeline`] routes a URL to its engine, renders
//! the page through a [`Renderer`], extracts fields, classifies media and
//! validates the resulting [`ContentRecord`].
//!
//! # Example
//!
//! ```no_run
//! use newsdesk_engines::{ExtractionOutcome, Pipeline};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pipeline = Pipeline::builder().build()?;
//!     match pipeline.extract("https://nypost.com/2024/05/01/us-news/story/").await? {
//!         ExtractionOutcome::Accepted { record, .. } => println!("{}", record.title),
//!         other => println!("{other:?}"),
//!     }
//!     Ok(())
//! }
//! ```

pub mod engine;
pub mod error;
pub mod extractors;
pub mod media;
pub mod options;
pub mod pipeline;
pub mod record;
pub mod render;
pub mod resource;
pub mod validate;

pub use crate::engine::loader::{load_builtin_registry, load_registry_from_path};
pub use crate::engine::registry::EngineRegistry;
pub use crate::engine::{EngineConfig, SourceEngine};
pub use crate::error::{BuildError, ErrorCode, ExtractError, RegistryError};
pub use crate::extractors::locator::{Locator, LocatorChain};
pub use crate::media::{
    MediaCandidate, MediaKind, MediaReport, MediaRules, MediaTier, MediaVerdict, TopicImageTable,
    VerdictReason,
};
pub use crate::options::{PipelineBuilder, PipelineOptions};
pub use crate::pipeline::Pipeline;
pub use crate::record::{ContentRecord, ExtractedFields, ExtractionOutcome, ExtractionRequest};
pub use crate::render::{HttpRenderer, PageHandle, RawPage, RenderSession, Renderer, WaitPolicy};
pub use crate::validate::{ContentValidator, RejectReason, ValidationRules};
