//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - IDs are serialised in MongoDB's own format.
//! - Maps keyed by ID are serialised with hex string keys.

pub mod candidate;
pub mod category;
pub mod identity;
pub mod settings;
