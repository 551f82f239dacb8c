//! edgepulse - edge-to-database latency measurement.
//!
//! `edgepulse serve` hosts one probe-region endpoint; `edgepulse run` drives
//! a measurement sweep across the fleet and renders live statistics.

mod config;
mod distance;
mod orchestrator;
mod probe;
mod regions;
mod resolve;
mod stats;
mod web;

use config::{RunnerConfig, ServerConfig};
use orchestrator::{Orchestrator, RunConfig};
use probe::{HttpProber, Prober, SyntheticProber};
use regions::RegionDirectory;
use stats::{DisplayLatency, LatencySlot, Summary, DB_ERROR_MS};
use web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("edgepulse=info".parse()?),
        )
        .init();

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("serve") => serve().await,
        Some("run") => match args.next() {
            Some(database) => run_measurement(&database).await,
            None => usage(),
        },
        _ => usage(),
    }
}

fn usage() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    eprintln!("usage: edgepulse serve");
    eprintln!("       edgepulse run <connection-string>");
    std::process::exit(2);
}

async fn serve() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cfg = ServerConfig::load();
    tracing::info!("Starting edgepulse probe server on port {}", cfg.http_port);

    let server = Server::new(cfg);
    server.start().await
}

async fn run_measurement(database: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cfg = RunnerConfig::load();
    let directory = Arc::new(RegionDirectory::load()?);
    tracing::info!(
        "Measuring across {} probe regions ({} trials each)",
        directory.probe_regions().len(),
        cfg.trials
    );

    let run_config = RunConfig {
        trials: cfg.trials,
        pacing: cfg.pacing,
        max_in_flight: cfg.max_in_flight,
    };
    let view = match std::env::var("EDGEPULSE_VIEW").as_deref() {
        Ok("total") => DisplayLatency::Total,
        _ => DisplayLatency::EdgeToHost,
    };

    if cfg.offline {
        tracing::info!("Offline mode: synthetic prober");
        let orchestrator = Orchestrator::new(directory, SyntheticProber::default(), run_config);
        drive(orchestrator, database, cfg.trials, view).await
    } else {
        let prober = HttpProber::new(&cfg.probe_url, &cfg.nearest_url, cfg.probe_timeout)?;
        let orchestrator = Orchestrator::new(directory, prober, run_config);
        drive(orchestrator, database, cfg.trials, view).await
    }
}

/// Run one measurement and render it as plain text, consuming only the
/// orchestrator's observable state.
async fn drive<P: Prober + 'static>(
    orchestrator: Orchestrator<P>,
    database: &str,
    trials: usize,
    view: DisplayLatency,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut events = orchestrator.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if event.sample.is_error() {
                let origin = if event.sample.total_ms == DB_ERROR_MS { "database" } else { "transport" };
                println!("{:<6} trial failed ({origin})", event.region_id);
            } else {
                println!(
                    "{:<6} edge {} ms, total {} ms",
                    event.region_id, event.sample.edge_to_host_ms, event.sample.total_ms
                );
            }
        }
    });

    let report = orchestrator.run(database).await?;
    printer.abort();

    println!();
    match report.client {
        Some(client) => println!(
            "host region {}, client at ({:.2}, {:.2})",
            report.host_region_id, client.latitude, client.longitude
        ),
        None => println!("host region {}, client location unknown", report.host_region_id),
    }

    for ranked in &report.regions {
        let samples = orchestrator.samples_for(&ranked.region.id).await;
        let values = stats::series(&samples, view);

        let summary = match stats::summarize(&values, trials) {
            Summary::Waiting { completed } => format!("{completed} trials"),
            Summary::Errored => "errors".to_string(),
            Summary::Stats { mean, median } => {
                format!("mean {mean:.0} ms, median {median} ms")
            }
        };
        let km = if ranked.km_to_host < 0.0 {
            "-".to_string()
        } else {
            format!("{:.0} km", ranked.km_to_host)
        };
        println!("{:<6} {:<26} {:>9}  {}", ranked.region.id, ranked.region.location, km, summary);

        if values.len() == trials {
            let marks = stats::mark_indices(trials);
            let slots: Vec<String> = stats::sorted_slots(&values)
                .into_iter()
                .enumerate()
                .map(|(i, slot)| {
                    let text = match slot {
                        LatencySlot::Error(_) => "ERR".to_string(),
                        LatencySlot::Ms(v) => v.to_string(),
                    };
                    if marks.contains(&i) {
                        format!("[{text}]")
                    } else {
                        text
                    }
                })
                .collect();
            println!("       {}", slots.join(" "));
        }
    }

    println!();
    let marks: Vec<String> = stats::PERCENTILE_MARKS.iter().map(|p| format!("p{p}")).collect();
    println!("bracketed slots mark {}", marks.join(", "));
    println!("{} trials dispatched, {} errored", report.dispatched, report.errored);
    Ok(())
}
