//! API-friendly types.
//!
//! The types in this module are de/serialised in a JSON-friendly way, e.g.:
//!
//! - IDs are hex strings.
//! - Datetimes are RFC 3339 strings.

pub mod auth;
pub mod candidate;
pub mod category;
pub mod id;
pub mod identity;
pub mod stats;
pub mod vote;
