mod extract;
mod search;
mod source;

use extract::extractor::RegionExtractor;
use extract::regions::RegionSet;
use search::Search;
use source::ImageDirSource;
use stagelight_common::config::Config;
use stagelight_common::snapshot::to_json;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        url = config.source.url,
        frames_dir = %config.source.frames_dir.display(),
        regions_dir = %config.regions.dir.display(),
        quality = config.regions.quality,
        step_secs = config.search.step_secs,
        accuracy_secs = config.search.accuracy_secs,
        workers = config.search.workers,
        valid_threshold = config.validity.threshold,
        "starting stagelight extractor"
    );

    let regions = match RegionSet::load(&config.regions.dir, &config.regions.quality) {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, "failed to load region set");
            std::process::exit(1);
        }
    };
    let extractor = RegionExtractor::new(regions, &config.validity, &config.color);
    if extractor.hue_regions() == 0 && extractor.temp_regions() == 0 {
        warn!("region set defines no hue or temperature regions, every update will be empty");
    }

    let source = match ImageDirSource::open(&config.source.frames_dir) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to open frame source");
            std::process::exit(1);
        }
    };

    let search = match Search::new(Arc::new(extractor), Arc::new(source), &config.search) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "invalid search settings");
            std::process::exit(1);
        }
    };
    let updates = match search.run().await {
        Ok(u) => u,
        Err(e) => {
            error!(error = %e, "search aborted");
            std::process::exit(1);
        }
    };
    if updates.is_empty() {
        warn!("no usable frames found, writing an empty result");
    }
    for update in &updates {
        info!(%update, "lighting state");
    }

    let json = match to_json(&updates, &config.source.url, config.output.compact) {
        Ok(j) => j,
        Err(e) => {
            error!(error = %e, "failed to serialize result");
            std::process::exit(1);
        }
    };
    if let Err(e) = std::fs::write(&config.output.path, json) {
        error!(error = %e, path = %config.output.path.display(), "failed to write result");
        std::process::exit(1);
    }

    info!(
        updates = updates.len(),
        path = %config.output.path.display(),
        "result written"
    );
}
