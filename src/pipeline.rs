//! Pipeline Controller: wiring, call lifecycle, shutdown sequencing.
//!
//! Grounded on `pipeline.rs`'s `PipelineState`/`PipelineConfig`/shutdown
//! shape, `call_server::CallManager`'s per-call task-tracking, and
//! `aicc_pipeline/core/pipeline.py`'s `AICCPipeline` (start/stop ordering,
//! `_on_first_packet` → `metadata_start`). Owns every long-lived resource:
//! port pool, session registry, WebSocket manager, per-call UDP receivers
//! and speaker processors.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Mutex as AsyncMutex};

use crate::config::Config;
use crate::error::PortPoolError;
use crate::event::TurnEvent;
use crate::metrics::Metrics;
use crate::session::{CallSession, PortPool, SessionRegistry};
use crate::speaker::SpeakerProcessor;
use crate::stt::provider::SttProvider;
use crate::task_registry::TaskRegistry;
use crate::udp::UdpReceiver;
use crate::ws::manager::WsManager;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    PortPool(#[from] PortPoolError),

    #[error("call not found: {0}")]
    NotFound(String),

    #[error("failed to start STT session: {0}")]
    Stt(#[from] crate::error::SttError),

    #[error("failed to bind UDP port: {0}")]
    Udp(#[from] std::io::Error),
}

/// Result of a successful call registration, returned to the REST layer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CallHandles {
    pub call_id: String,
    pub customer_port: u16,
    pub agent_port: u16,
}

struct ActiveCall {
    session: Arc<CallSession>,
    customer_processor: Arc<SpeakerProcessor>,
    agent_processor: Arc<SpeakerProcessor>,
    customer_receiver: UdpReceiver,
    agent_receiver: UdpReceiver,
    start: Instant,
}

/// Owns the full set of running calls plus the shared outbound fan-out.
/// `Arc`'d so REST handlers and shutdown hooks can share one instance.
pub struct Pipeline {
    config: Config,
    metrics: Arc<Metrics>,
    port_pool: Arc<PortPool>,
    registry: Arc<SessionRegistry>,
    ws: Arc<WsManager>,
    stt_provider: Arc<dyn SttProvider>,
    tasks: Arc<TaskRegistry>,
    active: AsyncMutex<HashMap<String, ActiveCall>>,
    event_tx: mpsc::Sender<TurnEvent>,
    started_at: Instant,
}

impl Pipeline {
    /// Constructs the controller and spawns the single task that drains
    /// the shared `TurnEvent` channel into the WebSocket manager.
    pub fn new(config: Config, metrics: Arc<Metrics>, stt_provider: Arc<dyn SttProvider>) -> Arc<Self> {
        let port_pool = Arc::new(PortPool::new(config.port_range_start, config.port_range_end));
        let registry = Arc::new(SessionRegistry::new());
        let ws = Arc::new(WsManager::start(config.ws.clone(), metrics.clone()));
        let tasks = TaskRegistry::new();

        let (event_tx, mut event_rx) = mpsc::channel::<TurnEvent>(256);
        let fanout_ws = ws.clone();
        let fanout_metrics = metrics.clone();
        tasks.spawn("event-fanout", async move {
            while let Some(event) = event_rx.recv().await {
                fanout_ws.send(event, &fanout_metrics);
            }
        });

        Arc::new(Self {
            config,
            metrics,
            port_pool,
            registry,
            ws,
            stt_provider,
            tasks,
            active: AsyncMutex::new(HashMap::new()),
            event_tx,
            started_at: Instant::now(),
        })
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Registers a new call: allocates ports, starts both speaker
    /// processors (streaming-mode sessions before any audio arrives, per
    /// spec.md §4.13), then binds both UDP receivers. Idempotent on a
    /// duplicate `call_id` — returns the existing allocation.
    pub async fn register_call(
        self: &Arc<Self>,
        call_id: String,
        customer_number: Option<String>,
        agent_id: Option<String>,
    ) -> Result<CallHandles, PipelineError> {
        if let Some(existing) = self.active.lock().await.get(&call_id) {
            return Ok(CallHandles {
                call_id,
                customer_port: existing.session.customer_port,
                agent_port: existing.session.agent_port,
            });
        }

        let (customer_port, agent_port) = match self.port_pool.allocate(&call_id) {
            Ok(ports) => ports,
            Err(err) => {
                self.metrics.calls_rejected_pool_exhausted.fetch_add(1, Ordering::Relaxed);
                return Err(err.into());
            }
        };

        let session = CallSession::new(call_id.clone(), customer_port, agent_port, customer_number.clone(), agent_id.clone());
        let session = self.registry.register(session);

        let customer_processor = Arc::new(self.new_processor("customer", &call_id).await?);
        let agent_processor = Arc::new(self.new_processor("agent", &call_id).await?);

        self.send_metadata_start(&call_id, customer_number, agent_id).await;

        let on_first_packet: Arc<dyn Fn(&'static str) + Send + Sync> = {
            let call_id = call_id.clone();
            Arc::new(move |speaker: &'static str| {
                tracing::debug!(call_id = %call_id, speaker, "first RTP packet observed");
            })
        };

        let customer_receiver = UdpReceiver::start(
            customer_port,
            "customer",
            customer_processor.clone(),
            Some(on_first_packet.clone()),
            Vec::new(),
            self.metrics.clone(),
        )
        .await?;
        let agent_receiver = UdpReceiver::start(agent_port, "agent", agent_processor.clone(), Some(on_first_packet), Vec::new(), self.metrics.clone()).await?;

        self.metrics.calls_registered.fetch_add(1, Ordering::Relaxed);
        self.active.lock().await.insert(
            call_id.clone(),
            ActiveCall { session, customer_processor, agent_processor, customer_receiver, agent_receiver, start: Instant::now() },
        );

        Ok(CallHandles { call_id, customer_port, agent_port })
    }

    async fn new_processor(self: &Arc<Self>, speaker: &'static str, call_id: &str) -> Result<SpeakerProcessor, PipelineError> {
        if self.config.stt.streaming {
            Ok(SpeakerProcessor::new_streaming(speaker, call_id.to_string(), &self.config, self.stt_provider.clone(), self.metrics.clone(), self.event_tx.clone()).await?)
        } else {
            Ok(SpeakerProcessor::new_batch(speaker, call_id.to_string(), &self.config, self.stt_provider.clone(), self.metrics.clone(), self.event_tx.clone()))
        }
    }

    async fn send_metadata_start(&self, call_id: &str, customer_number: Option<String>, agent_id: Option<String>) {
        let event = TurnEvent::metadata_start(call_id.to_string(), customer_number.unwrap_or_default(), agent_id.unwrap_or_default());
        if self.event_tx.send(event).await.is_err() {
            tracing::warn!(call_id, "event channel closed while sending metadata_start");
        }
    }

    /// Ends a call: stops receivers, flushes pending turns, tears down
    /// STT sessions, emits `metadata_end` with aggregate stats, releases
    /// ports, and removes the session — in that order, per spec.md §4.13.
    pub async fn end_call(self: &Arc<Self>, call_id: &str) -> Result<(), PipelineError> {
        let call = self.active.lock().await.remove(call_id).ok_or_else(|| PipelineError::NotFound(call_id.to_string()))?;

        let ActiveCall { customer_processor, agent_processor, mut customer_receiver, mut agent_receiver, start, .. } = call;

        customer_receiver.stop().await;
        agent_receiver.stop().await;

        let customer_stats = customer_processor.stats();
        let agent_stats = agent_processor.stats();

        let customer_processor = Arc::try_unwrap(customer_processor).unwrap_or_else(|_| unreachable!("no other references remain after receivers stop"));
        let agent_processor = Arc::try_unwrap(agent_processor).unwrap_or_else(|_| unreachable!("no other references remain after receivers stop"));
        customer_processor.shutdown().await;
        agent_processor.shutdown().await;

        let total_duration = start.elapsed().as_secs_f64();
        let turn_count = customer_stats.turn_count + agent_stats.turn_count;
        let complete_turns = customer_stats.complete_turns + agent_stats.complete_turns;
        let incomplete_turns = customer_stats.incomplete_turns + agent_stats.incomplete_turns;
        let speech_time = (customer_stats.total_speech_time + agent_stats.total_speech_time) as f64;
        let speech_ratio = if total_duration > 0.0 { (speech_time / total_duration).min(1.0) } else { 0.0 };

        let event = TurnEvent::metadata_end(call_id.to_string(), total_duration, turn_count, speech_ratio, complete_turns, incomplete_turns);
        if self.event_tx.send(event).await.is_err() {
            tracing::warn!(call_id, "event channel closed while sending metadata_end");
        }

        self.port_pool.release(call_id);
        self.registry.remove(call_id);
        tracing::info!(call_id, turn_count, "call ended");
        Ok(())
    }

    /// Orderly shutdown: ends every active call, then tears down the
    /// WebSocket manager and background task registry, bounded by
    /// [`SHUTDOWN_TIMEOUT`].
    pub async fn shutdown(self: Arc<Self>) {
        let call_ids: Vec<String> = self.active.lock().await.keys().cloned().collect();
        for call_id in call_ids {
            if let Err(err) = self.end_call(&call_id).await {
                tracing::warn!(call_id, error = %err, "error ending call during shutdown");
            }
        }

        self.tasks.shutdown(SHUTDOWN_TIMEOUT).await;

        match Arc::try_unwrap(self) {
            Ok(inner) => inner.ws.stop().await,
            Err(shared) => tracing::warn!(refs = Arc::strong_count(&shared), "pipeline still referenced at shutdown, WebSocket manager left running"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SttConfig;
    use crate::error::SttError;
    use crate::stt::provider::ResultStream;
    use crate::stt::TranscriptResult;
    use async_trait::async_trait;

    struct EchoProvider;

    #[async_trait]
    impl SttProvider for EchoProvider {
        async fn recognize(&self, cfg: &SttConfig, _pcm: &[u8]) -> Result<TranscriptResult, SttError> {
            Ok(TranscriptResult { text: "네".to_string(), language: cfg.language.clone(), confidence: 0.9 })
        }

        async fn streaming_recognize(&self, _cfg: &SttConfig, _audio_rx: mpsc::Receiver<Vec<u8>>) -> Result<ResultStream, SttError> {
            Err(SttError::ProviderFailed("not used in this test".to_string()))
        }
    }

    fn test_config(streaming: bool, port_start: u16) -> Config {
        Config {
            customer_port: 12345,
            agent_port: 12346,
            port_range_start: port_start,
            port_range_end: port_start + 10,
            rest_host: "127.0.0.1".to_string(),
            rest_port: 0,
            vad_threshold: 0.45,
            min_speech_ms: 300,
            min_silence_ms: 800,
            turn_weights: crate::config::TurnWeights { morpheme: 0.6, duration: 0.2, silence: 0.2, complete_threshold: 0.65 },
            arbiter: crate::config::ArbiterConfig { min_silence_ms: 800, min_chars: 1, grace_period_ms: 1000 },
            ws: crate::config::WsConfig {
                urls: vec!["ws://127.0.0.1:1/".to_string()],
                queue_maxsize: 1000,
                reconnect_interval_secs: 5.0,
                auth_secret: None,
                auth_client_id: None,
                token_ttl_secs: 3600,
            },
            stt: SttConfig {
                language: "ko-KR".to_string(),
                phrases: vec![],
                phrase_boost: 10.0,
                rotation_secs: 270.0,
                audio_queue_maxsize: 300,
                credentials_path: None,
                endpoint: None,
                streaming,
            },
            log_level: "info".to_string(),
        }
    }

    #[tokio::test]
    async fn register_call_is_idempotent() {
        let config = test_config(false, 31000);
        let metrics = Arc::new(Metrics::new());
        let pipeline = Pipeline::new(config, metrics, Arc::new(EchoProvider));

        let first = pipeline.register_call("call-1".to_string(), None, None).await.unwrap();
        let second = pipeline.register_call("call-1".to_string(), None, None).await.unwrap();
        assert_eq!(first.customer_port, second.customer_port);
    }

    #[tokio::test]
    async fn end_call_releases_ports() {
        let config = test_config(false, 31100);
        let metrics = Arc::new(Metrics::new());
        let pipeline = Pipeline::new(config, metrics, Arc::new(EchoProvider));

        pipeline.register_call("call-1".to_string(), None, None).await.unwrap();
        assert_eq!(pipeline.registry().len(), 1);
        pipeline.end_call("call-1").await.unwrap();
        assert_eq!(pipeline.registry().len(), 0);
    }

    #[tokio::test]
    async fn end_call_on_unknown_call_errors() {
        let config = test_config(false, 31200);
        let metrics = Arc::new(Metrics::new());
        let pipeline = Pipeline::new(config, metrics, Arc::new(EchoProvider));
        assert!(matches!(pipeline.end_call("nope").await, Err(PipelineError::NotFound(_))));
    }
}
