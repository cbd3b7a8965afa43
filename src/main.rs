use anyhow::{Context, Result};
use image_mover::{
    background::{
        flows::{DispatchSettings, Dispatcher},
        processors::{metadata::MediaProbe, video::Ffmpeg},
        queue::processing_queue,
        supervisor::Supervisor,
        watcher::EventSource,
    },
    bootstrap::{check_ffmpeg_and_ffprobe, initialize_logger},
    common::WORKER_RUNTIME,
    config::AppConfig,
};
use log::{LevelFilter, error, info};
use std::{path::PathBuf, time::Instant};
use tokio::sync::broadcast;

fn main() {
    if let Err(err) = run() {
        if log::max_level() == LevelFilter::Off {
            eprintln!("Error: {:?}", err);
        } else {
            error!("{:?}", err);
        }
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;

    initialize_logger(&config)?;
    info!("Application started");

    config.validate()?;
    check_ffmpeg_and_ffprobe(&config);

    let dispatcher = Dispatcher::new(
        DispatchSettings::from_config(&config)?,
        MediaProbe::new(config.ffprobe_path.clone()),
        Ffmpeg::new(config.ffmpeg_path.clone()),
    );
    let (producer, consumer) = processing_queue();

    WORKER_RUNTIME.block_on(async {
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

        let event_source = EventSource::start(&config.source_dir, producer)
            .context("failed to start watching the source directory")?;

        WORKER_RUNTIME.spawn({
            let shutdown_tx = shutdown_tx.clone();
            async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("Application ending by request from user"),
                    Err(err) => error!("Failed to listen for Ctrl-C: {}", err),
                }
                let _ = shutdown_tx.send(());
            }
        });

        let start_time = Instant::now();
        let summary = Supervisor::new(dispatcher, consumer, shutdown_rx).run().await;
        event_source.stop();

        info!(
            duration = &*format!("{:?}", start_time.elapsed());
            "Processed {} item(s), {} filed", summary.processed, summary.succeeded
        );
        Ok(())
    })
}
