//! Command-line interface parsing for the coinbrew cache tool
//!
//! This module handles parsing of CLI arguments using clap and turns them
//! into a [`CacheConfig`] plus the command to run.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::cache::CacheConfig;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// A bulk argument was not of the form KEY=URL
    #[error("Invalid pair: '{0}'. Expected KEY=URL")]
    InvalidPair(String),

    /// The JSON given to `set` does not parse
    #[error("Invalid JSON value: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Coinbrew cache - inspect and drive the client-side read-through cache
#[derive(Parser, Debug)]
#[command(name = "coinbrew-cache")]
#[command(about = "Inspect and drive the coinbrew read-through cache")]
#[command(version)]
pub struct Cli {
    /// Parent directory of the cache database (defaults to the XDG cache dir)
    #[arg(long, global = true, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// How long entries stay valid, in minutes
    #[arg(long, global = true, value_name = "MINUTES")]
    pub ttl_minutes: Option<u64>,

    /// Let concurrent fetches of one key each hit the network
    #[arg(long, global = true)]
    pub no_dedupe: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the cached JSON value for KEY
    Get { key: String },

    /// Store a JSON value under KEY
    Set { key: String, json: String },

    /// Remove KEY
    Delete { key: String },

    /// Remove every entry
    Clear,

    /// Return KEY from cache, or GET it from URL and cache the response
    Fetch {
        key: String,
        url: String,
        /// Give up on the request after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout_secs: Option<u64>,
    },

    /// Warm several keys without clearing the cache
    Preload {
        /// Entries of the form KEY=URL
        #[arg(required = true, value_name = "KEY=URL")]
        pairs: Vec<String>,
    },

    /// Clear the cache, then re-fetch several keys in order
    Refresh {
        /// Entries of the form KEY=URL
        #[arg(required = true, value_name = "KEY=URL")]
        pairs: Vec<String>,
    },

    /// Print the cached user profile
    Profile,
}

/// A cache key paired with the URL that produces it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyUrl {
    pub key: String,
    pub url: String,
}

/// Parses a `KEY=URL` argument; the key ends at the first `=`.
///
/// # Returns
/// * `Ok(KeyUrl)` if both sides are non-empty
/// * `Err(CliError::InvalidPair)` otherwise
pub fn parse_key_url(s: &str) -> Result<KeyUrl, CliError> {
    match s.split_once('=') {
        Some((key, url)) if !key.is_empty() && !url.is_empty() => Ok(KeyUrl {
            key: key.to_string(),
            url: url.to_string(),
        }),
        _ => Err(CliError::InvalidPair(s.to_string())),
    }
}

/// Parses every `KEY=URL` argument, failing on the first bad one
pub fn parse_key_urls(pairs: &[String]) -> Result<Vec<KeyUrl>, CliError> {
    pairs.iter().map(|p| parse_key_url(p)).collect()
}

impl Cli {
    /// Builds the cache configuration from global flags
    pub fn cache_config(&self) -> CacheConfig {
        let mut config = match &self.cache_dir {
            Some(dir) => CacheConfig::with_dir(dir),
            None => CacheConfig::default(),
        };
        if let Some(minutes) = self.ttl_minutes {
            config = config.with_ttl(Duration::from_secs(minutes * 60));
        }
        config.with_dedupe(!self.no_dedupe)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_url() {
        let pair = parse_key_url("top-coins=http://localhost/api/coins?limit=10").unwrap();
        assert_eq!(pair.key, "top-coins");
        assert_eq!(pair.url, "http://localhost/api/coins?limit=10");
    }

    #[test]
    fn test_parse_key_url_invalid() {
        for bad in ["no-equals", "=http://x", "key=", ""] {
            let err = parse_key_url(bad).unwrap_err();
            assert!(err.to_string().contains("Invalid pair"), "{}", bad);
        }
    }

    #[test]
    fn test_parse_key_urls_stops_at_first_error() {
        let pairs = vec!["a=http://a".to_string(), "broken".to_string()];
        assert!(parse_key_urls(&pairs).is_err());
    }

    #[test]
    fn test_cli_parse_get() {
        let cli = Cli::parse_from(["coinbrew-cache", "get", "top-coins"]);
        assert_eq!(
            cli.command,
            Command::Get {
                key: "top-coins".to_string()
            }
        );
        assert!(cli.cache_dir.is_none());
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "coinbrew-cache",
            "clear",
            "--cache-dir",
            "/tmp/brew",
            "--ttl-minutes",
            "5",
            "--no-dedupe",
        ]);
        let config = cli.cache_config();
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/brew")));
        assert_eq!(config.ttl, Duration::from_secs(300));
        assert!(!config.dedupe_in_flight);
    }

    #[test]
    fn test_cli_fetch_with_timeout() {
        let cli = Cli::parse_from([
            "coinbrew-cache",
            "fetch",
            "trades-1",
            "http://localhost/trades",
            "--timeout-secs",
            "3",
        ]);
        match cli.command {
            Command::Fetch { timeout_secs, .. } => assert_eq!(timeout_secs, Some(3)),
            other => panic!("Unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_refresh_requires_pairs() {
        assert!(Cli::try_parse_from(["coinbrew-cache", "refresh"]).is_err());
    }

    #[test]
    fn test_default_config_keeps_reference_ttl() {
        let cli = Cli::parse_from(["coinbrew-cache", "profile"]);
        let config = cli.cache_config();
        assert_eq!(config.ttl, Duration::from_secs(7200));
        assert!(config.dedupe_in_flight);
    }
}
