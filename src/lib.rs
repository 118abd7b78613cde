//! Coinbrew client cache library
//!
//! Read-through caching for the paper-trading client, plus the CLI parsing
//! and HTTP producer used by the `coinbrew-cache` binary.

pub mod cache;
pub mod cli;
pub mod http;
pub mod keys;
pub mod profile;
