#![forbid(unsafe_code)]

//! # concierge
//!
//! "What are the best real places of a given kind near here?"
//!
//! concierge answers that without owning a place database: it fans the
//! question out to several independent LLM providers in parallel, has the
//! providers cross-validate each other's answers, fuses everything with a
//! weighted consensus score, enriches matches against a real-world places
//! source, and caches the consolidated result on a geographic grid so nearby
//! requests coalesce.
//!
//! The entry point is [`pipeline::Pipeline::run`].

pub mod cache;
pub mod config;
pub mod credentials;
pub mod error;
pub mod geocode;
pub mod matching;
pub mod parser;
pub mod pipeline;
pub mod places;
pub mod prompts;
pub mod providers;
pub mod types;

pub use cache::{address_cache_key, coordinate_cache_key, ResponseCache, SqliteResponseCache};
pub use config::AppConfig;
pub use credentials::CredentialScope;
pub use error::PipelineError;
pub use pipeline::Pipeline;
pub use providers::{build_registry, RecommendationProvider};
pub use types::{
    Category, ConfidenceLevel, Recommendation, RecommendationRequest, RecommendationResponse,
};
