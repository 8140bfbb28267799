//! Publishes random metric batches over Zenoh.

use std::time::Duration;

use clap::Parser;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use tracing::{info, warn};

use tsrelay_common::{KeyExprBuilder, LoggingConfig, connect, encode, init_tracing, load_config};
use tsrelay_loadgen::{BatchGenerator, LoadgenConfig};

/// Load generator for tsrelay exporters.
#[derive(Parser, Debug)]
#[command(name = "tsrelay-loadgen")]
#[command(about = "Publish random metric batches to tsrelay/metrics/<source>")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<String>,

    /// Source name to publish under.
    #[arg(long)]
    source: Option<String>,

    /// Metrics per batch.
    #[arg(long)]
    items: Option<usize>,

    /// Seconds between batches.
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Number of batches to publish (0 = until interrupted).
    #[arg(long)]
    rounds: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config: LoadgenConfig = match &args.config {
        Some(path) => load_config(path)?,
        None => LoadgenConfig::default(),
    };
    if let Some(source) = args.source {
        config.load.source = source;
    }
    if let Some(items) = args.items {
        config.load.items = items;
    }
    if let Some(interval) = args.interval_secs {
        config.load.interval_secs = interval;
    }
    if let Some(rounds) = args.rounds {
        config.load.rounds = rounds;
    }
    config.zenoh.validate()?;

    init_tracing(&LoggingConfig {
        level: format!("{},zenoh=warn", config.logging.level),
        format: config.logging.format,
    })?;

    let key = KeyExprBuilder::new().metrics(&config.load.source)?;
    let session = connect(&config.zenoh).await?;
    let generator = BatchGenerator::from_settings(&config.load);
    let mut rng = SmallRng::from_os_rng();

    info!(
        "Publishing {} metrics every {}s to '{}' ({:?})",
        config.load.items, config.load.interval_secs, key, config.serialization
    );

    let mut interval = tokio::time::interval(Duration::from_secs(config.load.interval_secs.max(1)));
    let mut published: u64 = 0;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, stopping");
                break;
            }
            _ = interval.tick() => {
                let batch = generator.generate(&mut rng);
                match encode(&batch, config.serialization) {
                    Ok(payload) => {
                        if let Err(e) = session.put(&key, payload).await {
                            warn!("Failed to publish to '{}': {}", key, e);
                        }
                    }
                    Err(e) => warn!("Failed to encode batch: {}", e),
                }

                published += 1;
                if config.load.rounds > 0 && published >= config.load.rounds {
                    break;
                }
            }
        }
    }

    info!("Published {} batches", published);
    session
        .close()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to close Zenoh session: {}", e))?;

    Ok(())
}
