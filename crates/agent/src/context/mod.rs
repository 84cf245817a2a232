//! Transcript policies applied before every provider call.
//!
//! Both operate in place on the message list and never add or drop turns.

pub mod cache;
pub mod images;

pub use cache::{DEFAULT_CACHE_HINTS, place_cache_hints};
pub use images::prune_images;
