//! Cache module for forecast sources
//!
//! This module provides a caching decorator that keeps forecasts in memory
//! keyed by `(latitude, longitude, days)` with a configurable TTL. Expired
//! entries are evicted lazily: on the read that finds them, and in a sweep
//! after every miss.

mod decorator;

pub use decorator::{CacheStats, CachedSource, DEFAULT_TTL};
