mod alarm;
mod api;
mod controls;
mod detector;
mod recorder;
mod runner;
mod source;

use std::path::PathBuf;
use std::sync::Arc;

use alarm::{AlarmDevice, CommandAlarm, SilentAlarm};
use controls::Controls;
use motion_watch_common::config::Config;
use recorder::{EmailAlertSink, HttpUploadSink, LogBook, LogRecorder};
use runner::{Monitor, MonitorSettings};
use source::HttpSnapshotSource;
use tokio::sync::watch;
use tracing::{error, info};

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
        source = config.source.url,
        width = config.source.width,
        height = config.source.height,
        fps = config.monitor.fps,
        threshold = config.detection.threshold,
        zone = ?config.detection.zone,
        "starting motion-watch"
    );

    let controls = Arc::new(Controls::new(&config.controls, config.detection.zone));
    let book = LogBook::new();

    let mut recorder = LogRecorder::new(book.clone());
    if let Some(email) = &config.notify.email {
        info!(recipient = email.recipient, "email alerts enabled");
        recorder = recorder.with_sink(Box::new(EmailAlertSink::new(email)));
    }
    if let Some(upload) = &config.notify.upload {
        match HttpUploadSink::new(upload) {
            Ok(sink) => {
                info!(url = upload.url, "snapshot upload enabled");
                recorder = recorder.with_sink(Box::new(sink));
            }
            Err(e) => error!(error = %e, "failed to set up snapshot upload, continuing without it"),
        }
    }

    let alarm: Box<dyn AlarmDevice> = match &config.alarm.command {
        Some(program) => Box::new(CommandAlarm::new(program.clone(), config.alarm.args.clone())),
        None => Box::new(SilentAlarm::new()),
    };

    let source = match HttpSnapshotSource::new(&config.source) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to create frame source");
            std::process::exit(1);
        }
    };

    if config.api.enabled {
        let state = Arc::new(api::ApiState {
            controls: Arc::clone(&controls),
            book: book.clone(),
        });
        let bind = config.api.bind.clone();
        tokio::spawn(async move {
            if let Err(e) = api::serve(&bind, state).await {
                error!(error = %e, bind, "control API stopped");
            }
        });
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
        info!("shutdown requested");
        let _ = shutdown_tx.send(true);
    });

    let monitor = Monitor::new(
        source,
        alarm,
        recorder,
        controls,
        MonitorSettings::from_config(&config),
    );
    monitor.run(shutdown_rx).await;
}
