use std::{path::PathBuf, sync::Arc};

use agent::AgentContext;
use clap::Parser;
use config::{Config, LaneMode, SinkConfig};
use log::info;
use sink::{csv::CsvSink, db::DatabaseSink, rest::RestSink, Recorder, Sink};
use tokio_util::sync::CancellationToken;

mod agent;
mod carmen;
mod config;
mod error;
mod event;
mod sink;
mod snapshot;
#[cfg(test)]
mod testutil;
mod trigger;

/// Rust Plate Recorder
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Dumps a snapshot into the snapshot directory for each enabled lane
    #[clap(short, long)]
    snapshot: bool,
    /// Runs a single capture cycle for each enabled lane, then exits
    #[clap(long)]
    once: bool,
    /// Config file path, falls back to RPR_CONFIG then ./config.yaml
    #[clap(short, long)]
    config: Option<PathBuf>,
}

fn build_sink(config: &Config, client: &reqwest::Client, cancel: &CancellationToken) -> Sink {
    match &config.sink {
        SinkConfig::Database { url } => {
            Sink::Database(DatabaseSink::new(url.clone(), cancel.clone()))
        }
        SinkConfig::Rest {
            auth_url,
            insert_url,
            username,
            password,
        } => Sink::Rest(RestSink::new(
            client.clone(),
            auth_url.clone(),
            insert_url.clone(),
            username.clone(),
            password.clone(),
        )),
        SinkConfig::Csv => Sink::Csv(CsvSink::new(&config.snapshot_dir)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .parse_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    let config_path = args.config.unwrap_or_else(config::default_config_path);
    // the only fatal error class; everything after this is caught per cycle
    let config = Arc::new(Config::load(&config_path)?);
    tokio::fs::create_dir_all(&config.snapshot_dir).await?;

    if let Some(prometheus_bind) = config.prometheus_bind {
        prometheus_exporter::start(prometheus_bind).expect("failed to load prometheus_exporter");
    }

    let client = reqwest::Client::builder()
        .timeout(config.http_timeout())
        .build()?;
    let cancel = CancellationToken::new();
    let carmen = carmen::CarmenClient::new(client.clone(), config.carmen.clone());
    let recorder = Recorder::new(
        config.snapshot_dir.clone(),
        config.locations.clone(),
        config.dedup_plates,
        build_sink(&config, &client, &cancel),
    );
    let ctx = Arc::new(AgentContext {
        config: config.clone(),
        client,
        carmen,
        recorder,
    });

    if args.snapshot {
        for (name, lane) in &config.lanes {
            if matches!(lane.mode, LaneMode::Disable) {
                continue;
            }
            let image = snapshot::fetch_image(&ctx.client, &lane.camera_url).await?;
            let path = config.snapshot_dir.join(format!("{name}_screenshot.jpg"));
            tokio::fs::write(&path, &image).await?;
            info!("{name}: snapshot written to {}", path.display());
        }
        return Ok(());
    }

    if args.once {
        for (name, lane) in &config.lanes {
            if matches!(lane.mode, LaneMode::Disable) {
                continue;
            }
            match agent::cycle(&ctx, name, lane).await {
                Ok(outcome) => info!("{name}: cycle finished: {outcome:?}"),
                Err(e) => log::error!("{name}: cycle failed: {e}"),
            }
        }
        return Ok(());
    }

    let mut tasks = vec![];
    for (name, lane) in &config.lanes {
        if matches!(lane.mode, LaneMode::Disable) {
            continue;
        }
        tasks.push(tokio::spawn(agent::run_lane(
            ctx.clone(),
            name.clone(),
            cancel.clone(),
        )));
    }
    anyhow::ensure!(!tasks.is_empty(), "all lanes are disabled");

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("interrupt received, shutting down");
            cancel.cancel();
        }
    });

    futures::future::join_all(tasks).await;
    info!("shutdown complete");
    Ok(())
}
