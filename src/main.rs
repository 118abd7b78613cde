//! Coinbrew cache - command-line access to the client-side cache
//!
//! Reads, writes and warms the same on-disk cache the trading client uses,
//! which makes it handy for checking what a page would be served offline.

use std::io;
use std::process;
use std::time::Duration;

use clap::Parser;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

use coinbrew_cache::cache::Cache;
use coinbrew_cache::cli::{parse_key_urls, Cli, Command};
use coinbrew_cache::http::JsonClient;
use coinbrew_cache::profile::user_from_cache;

/// Sends logs to stderr so stdout stays clean JSON
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("coinbrew_cache=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn print_json(value: &Value) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    let cache = Cache::new(cli.cache_config());
    let client = JsonClient::new();

    match cli.command {
        Command::Get { key } => match cache.get::<Value>(&key).await {
            Some(value) => print_json(&value)?,
            None => {
                eprintln!("miss: {}", key);
                process::exit(1);
            }
        },
        Command::Set { key, json } => {
            let value: Value = serde_json::from_str(&json)
                .map_err(coinbrew_cache::cli::CliError::from)?;
            cache.try_set(&key, &value).await?;
        }
        Command::Delete { key } => cache.try_delete(&key).await?,
        Command::Clear => cache.try_clear().await?,
        Command::Fetch {
            key,
            url,
            timeout_secs,
        } => {
            let producer = client.get_json::<Value>(&url);
            let value = match timeout_secs {
                Some(secs) => {
                    cache
                        .fetch_with_timeout(&key, Duration::from_secs(secs), producer)
                        .await?
                }
                None => cache.fetch(&key, producer).await?,
            };
            print_json(&value)?;
        }
        Command::Preload { pairs } => {
            let pairs = parse_key_urls(&pairs)?;
            let producers = pairs.iter().map(|pair| {
                cache.fetch(&pair.key, client.get_json::<Value>(&pair.url))
            });
            cache.preload_all(producers).await?;
        }
        Command::Refresh { pairs } => {
            let pairs = parse_key_urls(&pairs)?;
            let producers = pairs.iter().map(|pair| {
                cache.fetch(&pair.key, client.get_json::<Value>(&pair.url))
            });
            cache.refresh_all(producers).await?;
        }
        Command::Profile => match user_from_cache(&cache).await {
            Some(user) => print_json(&serde_json::to_value(user)?)?,
            None => {
                eprintln!("miss: no cached user profile");
                process::exit(1);
            }
        },
    }

    Ok(())
}
