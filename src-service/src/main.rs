//! Auricle Background Service
//!
//! Continuously captures the default microphone, segments speech, runs
//! local transcription and speaker attribution, and appends the results to
//! daily transcript files. Everything stays on this machine.

mod capture;
mod engine;
mod pipeline;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use auricle_types::{paths, ServiceConfig};

use engine::embedding::SpectralFingerprint;
use engine::energy_vad::EnergyVad;
use engine::whisper::WhisperBackend;
use engine::CentroidIndex;
use pipeline::speakers::SpeakerTracker;
use pipeline::{Pipeline, PIPELINE_SAMPLE_RATE};

fn main() {
    // Initialize logging with RUST_LOG env var support
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Auricle service starting (pid: {})...", std::process::id());

    let config_path = paths::config_path();
    let config = match ServiceConfig::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config {}: {}", config_path.display(), e);
            std::process::exit(1);
        }
    };

    let model_path = config
        .model_path
        .clone()
        .unwrap_or_else(engine::whisper::default_model_path);
    if !model_path.exists() {
        warn!(
            "Model file {} not found; transcription will fail until it exists",
            model_path.display()
        );
    }

    let transcripts_dir = config
        .output_dir
        .clone()
        .unwrap_or_else(paths::transcripts_dir);
    info!("Transcripts under {}", transcripts_dir.display());

    let speakers = SpeakerTracker::new(
        config.speakers.clone(),
        PIPELINE_SAMPLE_RATE,
        Box::new(SpectralFingerprint::new(PIPELINE_SAMPLE_RATE)),
        Box::new(CentroidIndex::new()),
        paths::speaker_store_path(),
    );
    info!("Loaded {} known speaker(s)", speakers.known_speakers());

    let mut pipeline = Pipeline::new(
        &config,
        PIPELINE_SAMPLE_RATE,
        Box::new(EnergyVad::new(PIPELINE_SAMPLE_RATE)),
        Box::new(WhisperBackend::new(Some(model_path))),
        speakers,
        transcripts_dir,
    );

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create Tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    runtime.block_on(async {
        let (chunk_tx, mut chunk_rx) = tokio::sync::mpsc::unbounded_channel();
        let handle = match capture::start_capture(chunk_tx) {
            Ok(handle) => handle,
            Err(e) => {
                error!("Failed to start capture: {}", e);
                std::process::exit(1);
            }
        };
        info!("Capture running");

        loop {
            tokio::select! {
                chunk = chunk_rx.recv() => {
                    match chunk {
                        // Inference is CPU-heavy and synchronous; run it off
                        // the async workers so shutdown stays responsive.
                        Some(chunk) => {
                            tokio::task::block_in_place(|| pipeline.handle_chunk(&chunk));
                        }
                        None => {
                            error!("Capture channel closed unexpectedly");
                            break;
                        }
                    }
                }
                result = tokio::signal::ctrl_c() => {
                    match result {
                        Ok(()) => info!("Received shutdown signal"),
                        Err(e) => error!("Signal handler error: {}", e),
                    }
                    break;
                }
            }
        }

        handle.stop();
    });

    info!("Auricle service stopped");
}
