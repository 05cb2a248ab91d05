//! Process entry point: loads configuration, wires the pipeline
//! controller, serves the REST admission API, and waits for a shutdown
//! signal.
//!
//! Grounded on `streaming-core`'s `main.rs` (`#[tokio::main]`,
//! `tracing_subscriber` initialization, "construct manager, serve, idle"
//! shape); `anyhow` is used only here for top-level fatal-error
//! propagation, per SPEC_FULL.md §3 ("`anyhow` only at the `main.rs` top
//! level for fatal configuration errors").

use std::sync::Arc;

use aicc_pipeline::config::Config;
use aicc_pipeline::metrics::Metrics;
use aicc_pipeline::pipeline::Pipeline;
use aicc_pipeline::stt::provider::{GrpcSttProvider, SttProvider};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// `SpeechToText` provider used when `AICC_STT_ENDPOINT` is unset: every
/// call fails closed with `ProviderFailed`, which batch/streaming STT
/// already degrade gracefully from (empty transcript / fallback rotation),
/// matching `StubSTT`'s role in the teacher as a no-model placeholder —
/// except ours fails rather than fabricates text, since a telephony
/// pipeline emitting invented transcripts would be worse than emitting none.
struct UnconfiguredSttProvider;

#[async_trait::async_trait]
impl SttProvider for UnconfiguredSttProvider {
    async fn recognize(&self, _cfg: &aicc_pipeline::config::SttConfig, _pcm: &[u8]) -> Result<aicc_pipeline::stt::TranscriptResult, aicc_pipeline::error::SttError> {
        Err(aicc_pipeline::error::SttError::NotInitialized)
    }

    async fn streaming_recognize(
        &self,
        _cfg: &aicc_pipeline::config::SttConfig,
        _audio_rx: tokio::sync::mpsc::Receiver<Vec<u8>>,
    ) -> Result<aicc_pipeline::stt::provider::ResultStream, aicc_pipeline::error::SttError> {
        Err(aicc_pipeline::error::SttError::NotInitialized)
    }
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received SIGINT"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            // Tracing isn't initialized yet (we need the config's log
            // level first) — a fatal config error always goes to stderr.
            eprintln!("fatal: {err}");
            std::process::exit(1);
        }
    };

    init_tracing(&config.log_level);
    tracing::info!(rest_host = %config.rest_host, rest_port = config.rest_port, "starting aicc-pipeline");

    let metrics = Arc::new(Metrics::new());

    let stt_provider: Arc<dyn SttProvider> = match &config.stt.endpoint {
        Some(endpoint) => {
            tracing::info!(endpoint, "connecting to STT provider");
            Arc::new(GrpcSttProvider::connect(endpoint).await?)
        }
        None => {
            tracing::warn!("AICC_STT_ENDPOINT not set, STT provider will fail closed on every request");
            Arc::new(UnconfiguredSttProvider)
        }
    };

    let rest_addr = format!("{}:{}", config.rest_host, config.rest_port);
    let listener = TcpListener::bind(&rest_addr).await?;

    let pipeline = Pipeline::new(config, metrics, stt_provider);

    let server_pipeline = pipeline.clone();
    let server = tokio::spawn(async move { aicc_pipeline::rest::serve(listener, server_pipeline).await });

    shutdown_signal().await;
    tracing::info!("shutting down");

    server.abort();
    let _ = server.await;
    pipeline.shutdown().await;

    Ok(())
}
