use anyhow::{Context, Result};
use photoroute_core::{
    Config, DetectionAdapter, FaceIdentityStore, OnnxFaceAnalyzer, PhotoRecorder, TesseractReader,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod classify;
mod intake;
mod pool;

use classify::{ClassifySettings, Engine};
use intake::IntakeWatcher;
use pool::{HaltSignal, WorkerPool};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("photoroutd starting");

    let config = Config::load().context("loading configuration")?;
    config.ensure_dirs()?;
    tracing::info!(
        intake = %config.intake_dir.display(),
        faces = %config.faces_root.display(),
        digits = %config.digits_root.display(),
        workers = config.workers,
        "configuration loaded"
    );

    let analyzer = Arc::new(
        OnnxFaceAnalyzer::load(&config.scrfd_model_path(), &config.arcface_model_path())
            .context("loading face models")?,
    );
    let reader = Arc::new(TesseractReader::new(
        config.ocr_command.clone(),
        config.ocr_lang.clone(),
    ));
    let adapter = DetectionAdapter::new(analyzer, reader);

    let store = FaceIdentityStore::load(
        config.identity_paths(),
        config.identity_policy(),
        adapter.face_analyzer(),
    )
    .context("loading face identities")?;
    tracing::info!(identities = store.len(), "face identities ready");

    let recorder = Arc::new(PhotoRecorder::open(&config.db_path).context("opening photo database")?);
    let engine = Arc::new(Engine::new(
        adapter,
        Arc::new(Mutex::new(store)),
        recorder,
        ClassifySettings::from_config(&config),
    ));

    let (queue, receiver) = intake::channel();
    let halt = Arc::new(HaltSignal::default());
    let pool = WorkerPool::start(config.workers, engine, Arc::new(receiver), halt.clone())
        .context("starting worker pool")?;

    // watch first so nothing uploaded during the scan is missed
    let watcher = IntakeWatcher::start(
        &config.intake_dir,
        queue.clone(),
        Duration::from_millis(config.debounce_ms),
    )
    .context("watching intake directory")?;
    intake::scan_backlog(&config.intake_dir, &queue).context("scanning intake backlog")?;

    tracing::info!("photoroutd ready");

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("photoroutd shutting down");
        }
        _ = halt.tripped() => {
            tracing::error!("identity store failure, stopping intake");
        }
    }

    watcher.stop();
    drop(queue);
    tokio::task::spawn_blocking(move || pool.join()).await?;

    if halt.is_tripped() {
        anyhow::bail!("stopped after a fatal identity store error");
    }
    tracing::info!("photoroutd stopped");
    Ok(())
}
