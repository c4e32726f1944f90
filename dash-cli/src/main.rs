//! dashcap - Annotated Driving Dataset Capture
//!
//! Connects to a running driving simulator and captures colour, annotation,
//! depth and metadata for a list of maps.

mod args;

use std::io::Write;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use dash_capture::{
    write_parameters, CaptureConfig, CaptureEvent, Generator, SimClient, Simulator, SpawnCatalog,
};
use dash_sim::{run_virtual_sim_task, VirtualSimulator};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use args::Cli;

#[tokio::main]
async fn main() -> ExitCode {
    // Include all our crates in the default filter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "dashcap=info,dash_protocol=info,dash_capture=info,dash_sim=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.capture_config()?;
    let catalog = cli.spawn_catalog()?;

    write_parameters(Path::new(&config.experiment_name), &cli)
        .context("writing run parameters")?;

    if cli.virtual_sim {
        info!("Dry run against the virtual simulator");
        let (client_io, server_io) = tokio::io::duplex(1 << 20);
        let (_cmd_tx, cmd_rx) = mpsc::channel(8);
        let (event_tx, _event_rx) = broadcast::channel(8);
        let server = tokio::spawn(run_virtual_sim_task(
            server_io,
            VirtualSimulator::new(),
            cmd_rx,
            event_tx,
        ));

        let mut sim = SimClient::new(client_io);
        sim.hello().await.context("greeting virtual simulator")?;
        let sim = capture_maps(&cli, sim, config, catalog).await?;

        drop(sim);
        server.await.context("virtual simulator task")??;
        return Ok(());
    }

    let sim = SimClient::connect(&cli.host, cli.port)
        .await
        .with_context(|| format!("connecting to simulator at {}:{}", cli.host, cli.port))?;
    capture_maps(&cli, sim, config, catalog).await?;
    Ok(())
}

/// Capture every requested map in order; gives the simulator handle back
async fn capture_maps<S: Simulator>(
    cli: &Cli,
    sim: S,
    config: CaptureConfig,
    catalog: SpawnCatalog,
) -> Result<S> {
    let mut generator = Generator::new(sim, config, catalog)?;
    generator
        .configure()
        .await
        .context("configuring simulator")?;

    for map in &cli.maps {
        let mut session = generator
            .prepare_map(map)
            .await
            .with_context(|| format!("loading map {}", map))?;

        if !cli.no_prompt {
            wait_for_enter()
                .await
                .context("waiting for confirmation")?;
        }

        generator
            .capture(&mut session)
            .await
            .with_context(|| format!("capturing map {}", map))?;

        for event in generator.drain_events() {
            if let CaptureEvent::MapFinished {
                map,
                frames,
                iterations,
                recoveries,
            } = event
            {
                info!(
                    "{}: kept {} of {} captures, {} jam recoveries",
                    map, frames, iterations, recoveries
                );
            }
        }
    }

    info!(
        "Dataset {} complete ({} maps)",
        generator.experiment_dir().display(),
        cli.maps.len()
    );
    Ok(generator.into_simulator())
}

/// Block until the operator confirms the scenario finished loading
async fn wait_for_enter() -> Result<()> {
    print!("Press Enter to continue when the scenario is fully loaded...");
    std::io::stdout().flush()?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    Ok(())
}
