//! `access-layer` command line.
//!
//! Runs fetches through the access coordinator and inspects the local cache.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::Method;
use serde_json::json;

use access_layer::cache::{CacheStore, SystemClock};
use access_layer::config::{load_config, AccessConfig};
use access_layer::observability::{logging, metrics};
use access_layer::{AccessCoordinator, FetchRequest, Shutdown};

#[derive(Parser)]
#[command(name = "access-layer")]
#[command(about = "Pooled, retrying, caching HTTP access with latency statistics", long_about = None)]
struct Cli {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch a URL through the cache and pooled client
    Fetch {
        url: String,

        /// Operation class used for TTL policy and statistics
        #[arg(short, long, default_value = "api_test")]
        operation: String,

        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// Request header as `Name: value` (repeatable)
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        #[arg(short, long)]
        body: Option<String>,

        /// Cache TTL override in seconds
        #[arg(long)]
        ttl_secs: Option<u64>,

        /// Number of times to issue the fetch
        #[arg(short, long, default_value_t = 1)]
        repeat: u32,
    },
    /// Inspect or maintain the response cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Print cache statistics
    Stats,
    /// Remove every cached entry
    Clear,
    /// Remove expired entries
    Sweep,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AccessConfig::default(),
    };

    logging::init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "access-layer starting");

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    match cli.command {
        Commands::Fetch {
            url,
            operation,
            method,
            headers,
            body,
            ttl_secs,
            repeat,
        } => {
            let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())?;
            let mut request = FetchRequest::new(operation.clone(), method, url);
            for header in &headers {
                let (name, value) = parse_header(header)?;
                request = request.header(name, value);
            }
            if let Some(body) = body {
                request = request.body(body);
            }
            if let Some(secs) = ttl_secs {
                request = request.ttl(Duration::from_secs(secs));
            }
            run_fetch(&config, request, repeat).await?;
        }
        Commands::Cache { action } => {
            let cache = CacheStore::open(&config.cache, std::sync::Arc::new(SystemClock));
            let output = match action {
                CacheAction::Stats => serde_json::to_value(cache.stats())?,
                CacheAction::Clear => json!({ "cleared": cache.clear() }),
                CacheAction::Sweep => json!({ "purged": cache.sweep() }),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}

async fn run_fetch(
    config: &AccessConfig,
    request: FetchRequest,
    repeat: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let access = AccessCoordinator::from_config(config);
    let shutdown = Shutdown::new();
    let sweeper = access.start_sweeper(shutdown.subscribe());
    let mut interrupted = shutdown.subscribe();
    shutdown.listen_for_ctrl_c();

    let operation = request.operation.clone();
    let mut last_error = None;

    for round in 1..=repeat.max(1) {
        let result = tokio::select! {
            result = access.fetch(request.clone()) => result,
            _ = interrupted.recv() => break,
        };
        match result {
            Ok(fetched) => {
                tracing::info!(
                    round,
                    source = fetched.source.label(),
                    status = fetched.response.status,
                    elapsed = ?fetched.elapsed,
                    "Fetch complete"
                );
                if round == 1 {
                    println!("{}", fetched.response.body);
                }
            }
            Err(e) => {
                tracing::error!(round, error = %e, "Fetch failed");
                last_error = Some(e);
            }
        }
    }

    shutdown.trigger();
    let _ = sweeper.await;

    let report = json!({
        "summary": access.summarize(&operation),
        "cache": access.cache_stats(),
        "pools": access.pool_snapshots(),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    access.shutdown();
    match last_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("invalid header '{}', expected 'Name: value'", raw)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_header() {
        assert_eq!(
            parse_header("Accept: application/json").unwrap(),
            ("Accept".to_string(), "application/json".to_string())
        );
        assert_eq!(
            parse_header("X-Empty:").unwrap(),
            ("X-Empty".to_string(), String::new())
        );
        assert!(parse_header("no-colon").is_err());
        assert!(parse_header(": value").is_err());
    }

    #[test]
    fn test_cli_parses_fetch() {
        let cli = Cli::try_parse_from([
            "access-layer",
            "fetch",
            "https://example.com",
            "-H",
            "Accept: text/plain",
            "--ttl-secs",
            "60",
            "--repeat",
            "3",
        ])
        .unwrap();
        match cli.command {
            Commands::Fetch { headers, ttl_secs, repeat, operation, .. } => {
                assert_eq!(headers, vec!["Accept: text/plain".to_string()]);
                assert_eq!(ttl_secs, Some(60));
                assert_eq!(repeat, 3);
                assert_eq!(operation, "api_test");
            }
            Commands::Cache { .. } => panic!("expected fetch"),
        }
    }
}
