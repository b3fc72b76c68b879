//! Reactive in-memory cache for the candidate collection.
//!
//! [`CandidateCache`] owns the single authoritative snapshot of the
//! collection, a loading flag, and the staleness clock, and mediates all
//! reads and writes between consumers and the remote API. State is exposed
//! through watch channels: subscribers always see the latest snapshot
//! immediately and every subsequent publish in order.

pub mod service;

pub use service::{CandidateCache, CandidateWatch};
