//! Drives a scenario file through simulated VUs: loads global/scenario data
//! via [`loadcore::DataManager`] and waits at any declared rendezvous points,
//! for exercising the core outside of a full load-testing harness.
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Deserialize;

use loadcore::{
    BarrierPointConfig, DataManager, ProviderConfig, ProviderRegistry, RendezvousBarrier,
    ScenarioSource, VuContext,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to a TOML or JSON scenario file (see `ScenarioFile`); format is
    /// picked from the `.json`/`.toml` extension, defaulting to TOML.
    scenario: PathBuf,

    /// Number of simulated VUs to run concurrently.
    #[arg(long, default_value_t = 1)]
    vus: u64,

    /// Number of iterations each VU runs.
    #[arg(long, default_value_t = 1)]
    iterations: u64,
}

#[derive(Debug, Deserialize)]
struct ScenarioFile {
    /// The global data source, if any.
    #[serde(default)]
    global: Option<ProviderConfig>,
    /// Named per-scenario data sources.
    #[serde(default)]
    scenarios: HashMap<String, ProviderConfig>,
    /// Rendezvous points every VU waits at, once per iteration, in order.
    #[serde(default)]
    barrier_points: Vec<BarrierPointConfig>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let contents = std::fs::read_to_string(&args.scenario)?;
    let scenario: ScenarioFile =
        if args.scenario.extension().and_then(|ext| ext.to_str()) == Some("json") {
            serde_json::from_str(&contents)?
        } else {
            toml::from_str(&contents)?
        };

    let registry = Arc::new(ProviderRegistry::new());
    let barrier = Arc::new(RendezvousBarrier::new());
    let scenario_sources: Vec<ScenarioSource> = scenario
        .scenarios
        .iter()
        .map(|(name, config)| ScenarioSource {
            name: name.clone(),
            provider: Some(config.clone()),
        })
        .collect();

    let mut handles = Vec::new();
    for vu_id in 1..=args.vus {
        let registry = registry.clone();
        let barrier = barrier.clone();
        let global = scenario.global.clone();
        let scenario_sources = scenario_sources.clone();
        let barrier_points = scenario.barrier_points.clone();
        let iterations = args.iterations;

        handles.push(tokio::spawn(async move {
            let mut manager = DataManager::init(registry, vu_id, global);
            manager.init_scenarios(&scenario_sources).await;
            let mut context = VuContext::new();

            'iterations: for iteration in 0..iterations {
                if manager.should_stop() {
                    tracing::info!(vu_id, iteration, "VU stopped");
                    break;
                }
                manager.on_iteration_start(iteration);

                if let Err(error) = manager.load_global_into(&mut context).await {
                    tracing::error!(vu_id, iteration, %error, "aborting: test-stop signaled");
                    break;
                }
                for source in &scenario_sources {
                    if let Err(error) = manager.load_scenario_into(&source.name, &mut context).await {
                        tracing::error!(vu_id, iteration, scenario = %source.name, %error, "aborting: test-stop signaled");
                        break 'iterations;
                    }
                }

                for point in &barrier_points {
                    match barrier.wait(point.clone(), vu_id).await {
                        Ok(outcome) => tracing::debug!(vu_id, point = %point.name, ?outcome, "rendezvous"),
                        Err(error) => tracing::warn!(vu_id, point = %point.name, %error, "rendezvous aborted"),
                    }
                }

                manager.on_iteration_end(iteration).await;
                tracing::info!(vu_id, iteration, variables = ?context.variables, "iteration complete");
            }
        }));
    }

    for handle in handles {
        handle.await?;
    }

    Ok(())
}
