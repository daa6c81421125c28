//! Airtrack - broadcast airplay detection and play-duration tracking.
//!
//! Classified audio segments captured from radio stations flow through a
//! matching hierarchy (local signatures, identifiers, external recognition
//! providers), are resolved to canonical tracks and merged into play
//! sessions whose durations feed airplay statistics.

pub mod cli;
pub mod config;
pub mod db;
pub mod detection;
pub mod error;
pub mod model;
pub mod monitor;
pub mod sessions;
#[cfg(test)]
pub mod test_utils;
