//! AcoustID fingerprint lookup.
//!
//! AcoustID identifies music by Chromaprint fingerprint.
//! API docs: https://acoustid.org/webservice

mod adapter;
mod client;
pub mod dto;

pub use client::AcoustIdClient;
