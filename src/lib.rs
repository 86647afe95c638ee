//! Join Manager library.
//!
//! Implements the OGC API - Joins extension's server-side Join Manager:
//! ingesting CSV join sources, persisting them, sweeping them for retention,
//! and enriching feature collections against them at read time.

pub mod api;
pub mod config;
pub mod error;
pub mod join;
pub mod middleware;
