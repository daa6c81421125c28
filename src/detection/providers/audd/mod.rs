//! AudD clip recognition.
//!
//! API docs: https://docs.audd.io/

mod adapter;
mod client;
pub mod dto;

pub use client::AudDClient;
