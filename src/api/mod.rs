//! REST transport for the candidate pipeline API.
//!
//! This module provides the [`CandidateApi`] trait - the capability the
//! cache service consumes - and [`ApiClient`], the reqwest-backed
//! implementation talking to the remote collection endpoint:
//!
//! - `GET /candidates` - full collection
//! - `DELETE /candidates/{id}` - remove one candidate
//! - `PATCH /candidates/{id}` - partial update of one candidate
//!
//! The base URL comes from [`Config`](crate::config::Config).

pub mod client;
pub mod error;

pub use client::{ApiClient, CandidateApi};
pub use error::ApiError;
