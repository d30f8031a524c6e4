use anyhow::{Context, Result};
use clap::Parser;
use doorbell_core::classifier::OnnxOccupationClassifier;
use doorbell_core::detector::ScrfdDetector;
use doorbell_core::object_detector::YoloDetector;
use doorbell_core::recognizer::{ArcFaceMatcher, FaceRecognizer};
use doorbell_core::{Cascade, FaceAligner, FrameSource, LandmarkWorker, ModelWorker, PersonLocator};
use doorbell_hw::{Camera, FixtureSource};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

mod channel;
mod config;
mod dispatcher;
mod engine;
mod gallery;
#[cfg(test)]
mod testing;

use channel::{Channel, LogAlertChannel, TcpAlertChannel};
use config::{ChannelKind, Config, SourceKind};
use dispatcher::Dispatcher;

#[derive(Parser)]
#[command(name = "doorbelld", about = "Doorbell visitor alerting daemon")]
struct Cli {
    /// TOML configuration file (overrides DOORBELL_CONFIG)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Read frames from a fixture directory instead of the camera
    #[arg(long, value_name = "DIR")]
    fixtures: Option<PathBuf>,
    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,
    /// List V4L2 capture devices and exit
    #[arg(long)]
    list_devices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    if cli.list_devices {
        let devices = Camera::list_devices();
        if devices.is_empty() {
            println!("No V4L2 capture devices found");
        }
        for d in devices {
            println!("{}\t{} ({}, {})", d.path, d.name, d.driver, d.bus);
        }
        return Ok(());
    }

    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(dir) = cli.fixtures {
        config.use_fixtures(dir);
    }
    config.validate()?;

    tracing::info!(source = ?config.frame_source, channel = ?config.channel, "doorbelld starting");

    // Open the source, models and channel up front (fail-fast).
    let source: Box<dyn FrameSource> = match config.frame_source {
        SourceKind::Camera => Box::new(
            Camera::open(&config.camera_device, config.warmup_frames)
                .with_context(|| format!("opening camera {}", config.camera_device))?,
        ),
        SourceKind::Fixtures => Box::new(FixtureSource::new(&config.fixture_dir)),
    };

    let cascade = build_cascade(&config)?;

    let channel = match config.channel {
        ChannelKind::Tcp => Channel::Tcp(
            TcpAlertChannel::connect(&config.channel_addr)
                .await?
                .with_write_timeout(config.channel_write_timeout()),
        ),
        ChannelKind::Log => Channel::Log(LogAlertChannel),
    };

    let engine = engine::spawn_engine(source, cascade)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("shutdown requested"),
            Err(e) => tracing::warn!(error = %e, "failed to listen for ctrl-c; stopping"),
        }
        let _ = shutdown_tx.send(true);
    });

    tracing::info!("doorbelld ready");

    Dispatcher::new(engine, channel, config.capture_retry())
        .run(shutdown_rx, cli.once)
        .await?;

    tracing::info!("doorbelld shutting down");
    Ok(())
}

/// Load every model onto its own timed worker and enroll the gallery.
fn build_cascade(config: &Config) -> Result<Cascade> {
    let timeout = config.model_timeout();

    let scrfd = ScrfdDetector::load(&config.scrfd_model_path())?.with_threshold(config.face_confidence);
    let scrfd = LandmarkWorker::spawn("scrfd", scrfd, timeout)?;
    let mut aligner =
        FaceAligner::new(Box::new(scrfd.clone()), Box::new(scrfd)).with_min_confidence(config.face_confidence);

    let mut recognizer = FaceRecognizer::load(&config.arcface_model_path())?;
    let gallery = gallery::load_gallery(&config.gallery_dir, &mut aligner, |face| recognizer.extract(face))?;
    let matcher = ModelWorker::spawn("arcface", ArcFaceMatcher::new(recognizer, gallery), timeout)?;

    let yolo = YoloDetector::load(&config.yolo_model_path())?
        .with_limits(config.person_score, config.person_max_results);
    let yolo = ModelWorker::spawn("yolo", yolo, timeout)?;
    let locator = PersonLocator::new(Box::new(yolo)).with_limits(config.person_score, config.person_max_results);

    let classifier = OnnxOccupationClassifier::load(&config.occupation_model_path(), config.occupation_labels.clone())?;
    let classifier = ModelWorker::spawn("occupation", classifier, timeout)?;

    tracing::info!(timeout = ?timeout, "models loaded");

    Ok(Cascade::new(
        aligner,
        locator,
        Box::new(matcher),
        Box::new(classifier),
        config.policy(),
    ))
}
