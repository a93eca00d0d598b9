//! astrodash library
//!
//! Fetches astronomy events from NASA's public APIs and a daily weather
//! forecast from Open-Meteo, caches both, and merges them into one combined
//! forecast per location.

pub mod cache;
pub mod cli;
pub mod combined;
pub mod config;
pub mod data;
pub mod error;
pub mod manager;
pub mod moon;
pub mod refresh;
pub mod sources;
pub mod transport;
