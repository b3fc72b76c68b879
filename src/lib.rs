//! Talentcache - a client-side reactive cache for a candidate pipeline API.
//!
//! The crate keeps one authoritative in-memory copy of the remote candidate
//! collection and exposes it to UI consumers through watch channels, so a
//! subscriber always starts from the latest snapshot and observes every
//! update in order. Fetches are suppressed while the collection is fresh,
//! deletes re-derive the collection from a single settled snapshot, and
//! hires are applied optimistically before the server confirms them.
//!
//! Typical wiring:
//!
//! ```no_run
//! use talentcache::{ApiClient, CandidateCache, Config};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let cache = CandidateCache::new(ApiClient::new(config.api_url())?);
//!
//! cache.refresh().await?;
//! let roster = cache.candidates();
//! println!("{} candidates cached", roster.borrow().len());
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod models;
pub mod utils;

pub use api::{ApiClient, ApiError, CandidateApi};
pub use cache::{CandidateCache, CandidateWatch};
pub use config::Config;
pub use models::Candidate;
