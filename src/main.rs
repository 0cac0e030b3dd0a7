use anyhow::Result;
use clap::Parser;
use stationflow::engine::Watchdog;
use stationflow::transport::open_sources;
use stationflow::{ObservationRuntime, Pipeline, PipelineConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "stationflow")]
#[command(about = "Station sample streaming and block processing pipeline")]
struct Cli {
    /// Pipeline configuration (JSON)
    #[arg(short = 'c', long)]
    config: PathBuf,

    /// Override the number of blocks to process
    #[arg(short = 'n', long)]
    blocks: Option<u64>,

    /// Force deterministic mode (writers wait for the reader, nothing is dropped)
    #[arg(long)]
    deterministic: bool,

    /// Only validate the configuration
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut config = PipelineConfig::from_file(&cli.config)?;
    if cli.blocks.is_some() {
        config.nr_blocks = cli.blocks;
    }
    if cli.deterministic {
        config.realtime = false;
    }

    if let Err(e) = config.validate() {
        log::error!("configuration error: {}", e);
        std::process::exit(1);
    }
    if cli.check {
        println!("{} is valid", cli.config.display());
        return Ok(());
    }

    let watchdog = match config.deadline() {
        Some(deadline) => Some(Watchdog::arm_exit(deadline)?),
        None => None,
    };

    let mut pipeline = Pipeline::builder(config.clone()).build()?;
    pipeline.start()?;

    let sources = open_sources(&config).await?;
    let stations = sources
        .into_iter()
        .zip(pipeline.rings().iter().cloned())
        .collect();

    let mut runtime = ObservationRuntime::new();
    runtime.start(stations)?;

    let finished = tokio::select! {
        stats = runtime.wait() => Some(stats),
        _ = tokio::signal::ctrl_c() => None,
    };
    let ingest = match finished {
        Some(stats) => stats,
        None => {
            log::warn!("interrupted, stopping stations");
            runtime.shutdown().await
        }
    };
    if let Err(e) = &ingest {
        log::error!("station ingest stopped: {:#}", e);
    }
    // Some sources (UDP) never end on their own.
    pipeline.end_of_input();

    let monitor = pipeline.monitor();
    let joined = tokio::task::spawn_blocking(move || pipeline.join()).await?;

    if let Some(watchdog) = watchdog {
        watchdog.cancel();
    }

    println!("{}", monitor.generate_report());
    joined?;
    ingest?;
    Ok(())
}
