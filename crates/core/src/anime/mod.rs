//! Canonical anime model shared by adapters, normalizer, store and cache.

mod types;

pub use types::*;
