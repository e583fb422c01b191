//! nimbus-sim — drives the Nimbus control-layer simulation.
//!
//! Single binary that assembles the three subsystems:
//! - Request dispatcher (load balancing, health checks, pool scaling)
//! - Replication engine (multi-region writes and reads)
//! - Request-rate autoscaler
//!
//! Drives a configurable stream of requests through the dispatcher and
//! autoscaler, replicates a record every few ticks, then prints the
//! final status snapshots as JSON.
//!
//! # Usage
//!
//! ```text
//! nimbus-sim --requests 100 --algorithm weighted --seed 42
//! ```

use std::time::Duration;

use clap::Parser;
use serde_json::json;
use tracing::{info, warn};

use nimbus_autoscale::RequestScaler;
use nimbus_core::{AutoscalerConfig, DispatcherConfig, ReplicationConfig};
use nimbus_dispatch::Dispatcher;
use nimbus_replication::ReplicationEngine;

#[derive(Parser)]
#[command(name = "nimbus-sim", about = "Nimbus cloud-control simulation driver")]
struct Cli {
    /// Seed for the subsystems' randomness sources. Omit to seed from
    /// entropy.
    #[arg(long)]
    seed: Option<u64>,

    /// Number of requests to drive through the dispatcher.
    #[arg(long, default_value = "50")]
    requests: u32,

    /// Pause between driven requests in milliseconds.
    #[arg(long, default_value = "100")]
    tick_ms: u64,

    /// Balancing algorithm: round-robin, least-connections, or weighted.
    #[arg(long, default_value = "round-robin")]
    algorithm: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let dispatcher = Dispatcher::new(DispatcherConfig {
        seed: cli.seed,
        ..DispatcherConfig::default()
    });
    dispatcher.set_algorithm(&cli.algorithm).await?;
    dispatcher.start().await;

    let engine = ReplicationEngine::new(ReplicationConfig {
        seed: cli.seed,
        ..ReplicationConfig::default()
    });
    let scaler = RequestScaler::new(AutoscalerConfig::default());

    info!(
        requests = cli.requests,
        algorithm = %cli.algorithm,
        "simulation starting"
    );

    for i in 0..cli.requests {
        let request_id = format!("req-{i}");
        scaler.record_request();

        if let Err(err) = dispatcher.handle_request(&request_id, None).await {
            warn!(%request_id, %err, "dispatch failed");
        }

        // Replicate a session record every tenth tick and read it back.
        if i % 10 == 0 {
            let key = format!("session-{}", i / 10);
            let outcome = engine
                .replicate(&key, json!({ "request": request_id, "tick": i }))
                .await;
            if outcome.success
                && let Err(err) = engine.read(&key).await
            {
                warn!(%key, %err, "read failed");
            }
        }

        tokio::time::sleep(Duration::from_millis(cli.tick_ms)).await;
    }

    let snapshot = json!({
        "dispatcher": dispatcher.status().await,
        "replication": engine.status().await,
        "autoscaler": scaler.status(),
    });
    println!("{}", serde_json::to_string_pretty(&snapshot)?);

    dispatcher.shutdown().await;
    engine.shutdown().await;
    info!("simulation complete");
    Ok(())
}
