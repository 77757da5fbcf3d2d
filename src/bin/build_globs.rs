//! Glob builder binary.
//!
//! Recomputes every overlay's globs from the database and rewrites the
//! `county_globs` table.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL`, `DB_MAX_CONNECTIONS`, `DB_CONNECT_TIMEOUT_SECS`: see
//!   `PostgresConfig::from_env`
//! - `GLOB_POLICY_PATH`: JSON glob policy (default: built-in policy)
//! - `GLOBS_DRY_RUN`: `1` or `true` to compute and report without writing
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! The run report is printed to stdout as JSON. Any error exits non-zero.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://... cargo run --bin build_globs --features postgres
//! ```

use std::time::{Duration, Instant};

use tracing::{error, info};
use tracing_subscriber::{
    fmt,
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use county_globs::{GlobPolicy, GlobRunner, PostgresGlobStore, RunOptions};

/// Install logging on stderr; stdout carries only the run report.
fn init_tracing() {
    let json = std::env::var("LOG_FORMAT").map_or(true, |f| f != "pretty");

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "build_globs=info,county_globs=info,sqlx=warn".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| {
            fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_current_span(true)
                .flatten_event(true)
        }))
        .with((!json).then(|| fmt::layer().pretty().with_writer(std::io::stderr)))
        .init();
}

fn load_policy() -> Result<GlobPolicy, county_globs::PolicyError> {
    match std::env::var("GLOB_POLICY_PATH") {
        Ok(path) if !path.is_empty() => {
            info!(path = %path, "Loading glob policy");
            GlobPolicy::from_path(&path)
        }
        _ => {
            info!("GLOB_POLICY_PATH not set, using built-in glob policy");
            let policy = GlobPolicy::default();
            policy.validate()?;
            Ok(policy)
        }
    }
}

fn dry_run_requested() -> bool {
    std::env::var("GLOBS_DRY_RUN")
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting glob builder");

    let policy = load_policy().map_err(|e| {
        error!(error = %e, "Invalid glob policy");
        e
    })?;
    let options = RunOptions { dry_run: dry_run_requested() };

    let connect_start = Instant::now();
    let store = match tokio::time::timeout(Duration::from_secs(30), PostgresGlobStore::from_env()).await {
        Ok(Ok(store)) => store,
        Ok(Err(e)) => {
            error!(error = %e, "Failed to connect to PostgreSQL");
            return Err(e.into());
        }
        Err(_) => {
            error!("PostgreSQL connection timeout after 30s");
            return Err("Database connection timeout".into());
        }
    };
    info!(
        latency_ms = connect_start.elapsed().as_millis() as u64,
        "PostgreSQL connection established"
    );

    let runner = GlobRunner::new(&store, &store, &policy, options);
    let report = match runner.run().await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Glob build failed");
            return Err(e.into());
        }
    };

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
