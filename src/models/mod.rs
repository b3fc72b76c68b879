//! Data models for candidate pipeline entities.
//!
//! The collection managed by this crate holds a single entity type,
//! [`Candidate`], matching the records served by the remote pipeline API.
//! Identifiers are server-assigned and immutable; the wire format is
//! camelCase JSON.

pub mod candidate;

pub use candidate::Candidate;
