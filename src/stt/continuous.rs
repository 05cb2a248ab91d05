//! Continuous STT session manager: 270 s rotation with warm standby.
//!
//! Ported from `aicc_pipeline/stt/continuous_session.py`'s
//! `ContinuousSTTSession`. Keeps one active streaming session plus one
//! warm-standby session so rotating off the provider's near-5-minute
//! streaming limit costs no audio gap; falls back to a synchronous
//! restart (absorbed by a capped rotation buffer) when standby prep fails.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use crate::config::SttConfig;
use crate::error::SttError;

use super::provider::SttProvider;
use super::streaming::{StreamingResult, StreamingSttSession};

const BUFFER_DURING_ROTATION_SECS: f32 = 2.0;
const STANDBY_RETRY_DELAY: Duration = Duration::from_secs(5);
const MAX_STANDBY_RETRIES: u32 = 3;

fn max_buffer_bytes() -> usize {
    (BUFFER_DURING_ROTATION_SECS * 16000.0 * 2.0) as usize
}

struct Inner {
    provider: Arc<dyn SttProvider>,
    config: SttConfig,
    call_id: String,
    speaker: String,
    active: AsyncMutex<Option<StreamingSttSession>>,
    standby: AsyncMutex<Option<StreamingSttSession>>,
    internal_tx: mpsc::Sender<StreamingResult>,
    rotation_buffer: SyncMutex<VecDeque<u8>>,
    accumulated_transcript: SyncMutex<String>,
    is_rotating: AtomicBool,
    standby_failed: AtomicBool,
    running: AtomicBool,
}

pub struct ContinuousSttSession {
    inner: Arc<Inner>,
    rotation_task: JoinHandle<()>,
    forwarder_task: JoinHandle<()>,
}

impl Inner {
    fn buffer_audio(&self, pcm_bytes: &[u8]) {
        let mut buf = self.rotation_buffer.lock();
        buf.extend(pcm_bytes.iter().copied());
        let cap = max_buffer_bytes();
        while buf.len() > cap {
            buf.pop_front();
        }
    }

    fn drain_buffer(&self) -> Vec<u8> {
        let mut buf = self.rotation_buffer.lock();
        let drained: Vec<u8> = buf.drain(..).collect();
        drained
    }

    async fn prepare_standby(self: &Arc<Self>) {
        for attempt in 1..=MAX_STANDBY_RETRIES {
            match StreamingSttSession::start(self.provider.clone(), self.config.clone(), self.internal_tx.clone()).await {
                Ok(session) => {
                    *self.standby.lock().await = Some(session);
                    self.standby_failed.store(false, Ordering::Relaxed);
                    tracing::info!(call_id = %self.call_id, speaker = %self.speaker, attempt, "standby STT session ready");
                    return;
                }
                Err(err) => {
                    tracing::warn!(call_id = %self.call_id, speaker = %self.speaker, attempt, error = %err, "standby STT session creation failed");
                    if attempt < MAX_STANDBY_RETRIES {
                        tokio::time::sleep(STANDBY_RETRY_DELAY).await;
                    }
                }
            }
        }
        tracing::error!(call_id = %self.call_id, speaker = %self.speaker, "all standby attempts failed, entering fallback mode");
        self.standby_failed.store(true, Ordering::Relaxed);
    }

    async fn rotate(self: &Arc<Self>) {
        self.is_rotating.store(true, Ordering::Relaxed);

        let has_standby = self.standby.lock().await.is_some();
        if self.standby_failed.load(Ordering::Relaxed) || !has_standby {
            self.rotate_fallback().await;
        } else {
            self.rotate_normal().await;
        }

        self.is_rotating.store(false, Ordering::Relaxed);
    }

    async fn rotate_normal(self: &Arc<Self>) {
        tracing::info!(call_id = %self.call_id, speaker = %self.speaker, "rotating STT session (warm standby)");

        let new_active = self.standby.lock().await.take();
        let old_active = {
            let mut active = self.active.lock().await;
            std::mem::replace(&mut *active, new_active)
        };

        if let Some(active) = self.active.lock().await.as_ref() {
            for chunk in self.drain_buffer().chunks(3200).map(|c| c.to_vec()).collect::<Vec<_>>() {
                active.feed_audio(chunk).await;
            }
        }

        if let Some(old) = old_active {
            tokio::spawn(async move { old.stop().await });
        }

        let inner = self.clone();
        tokio::spawn(async move { inner.prepare_standby().await });
    }

    async fn rotate_fallback(self: &Arc<Self>) {
        tracing::warn!(call_id = %self.call_id, speaker = %self.speaker, "fallback rotation: synchronous session switch");

        let old = self.active.lock().await.take();
        if let Some(old) = old {
            old.stop().await;
        }

        match StreamingSttSession::start(self.provider.clone(), self.config.clone(), self.internal_tx.clone()).await {
            Ok(new_session) => {
                for chunk in self.drain_buffer().chunks(3200).map(|c| c.to_vec()).collect::<Vec<_>>() {
                    new_session.feed_audio(chunk).await;
                }
                *self.active.lock().await = Some(new_session);
            }
            Err(err) => {
                tracing::error!(call_id = %self.call_id, speaker = %self.speaker, error = %err, "fallback rotation failed to start new session");
                self.running.store(false, Ordering::Relaxed);
            }
        }

        self.standby_failed.store(false, Ordering::Relaxed);
        let inner = self.clone();
        tokio::spawn(async move { inner.prepare_standby().await });
    }
}

impl ContinuousSttSession {
    pub async fn start(
        provider: Arc<dyn SttProvider>,
        config: SttConfig,
        call_id: String,
        speaker: String,
        result_tx: mpsc::Sender<StreamingResult>,
    ) -> Result<Self, SttError> {
        let (internal_tx, mut internal_rx) = mpsc::channel(128);
        let accumulated_transcript = SyncMutex::new(String::new());

        let active = StreamingSttSession::start(provider.clone(), config.clone(), internal_tx.clone()).await?;

        let inner = Arc::new(Inner {
            provider,
            config: config.clone(),
            call_id,
            speaker,
            active: AsyncMutex::new(Some(active)),
            standby: AsyncMutex::new(None),
            internal_tx,
            rotation_buffer: SyncMutex::new(VecDeque::new()),
            accumulated_transcript,
            is_rotating: AtomicBool::new(false),
            standby_failed: AtomicBool::new(false),
            running: AtomicBool::new(true),
        });

        // Forward every result from either active or standby into the
        // accumulated transcript and the caller's channel.
        let forward_inner = inner.clone();
        let forwarder_task = tokio::spawn(async move {
            while let Some(result) = internal_rx.recv().await {
                if result.is_final && !result.transcript.trim().is_empty() {
                    let mut acc = forward_inner.accumulated_transcript.lock();
                    if !acc.is_empty() {
                        acc.push(' ');
                    }
                    acc.push_str(result.transcript.trim());
                }
                if result_tx.send(result).await.is_err() {
                    break;
                }
            }
        });

        let rotation_inner = inner.clone();
        let rotation_secs = config.rotation_secs.max(1.0);
        let rotation_task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs_f32(rotation_secs));
            interval.tick().await; // consume the immediate first tick
            loop {
                interval.tick().await;
                if !rotation_inner.running.load(Ordering::Relaxed) {
                    break;
                }
                rotation_inner.rotate().await;
            }
        });

        let standby_inner = inner.clone();
        tokio::spawn(async move { standby_inner.prepare_standby().await });

        Ok(Self { inner, rotation_task, forwarder_task })
    }

    /// Feeds one frame of LINEAR16 PCM bytes. Buffered (capped at 2s) while
    /// a rotation is in progress; fed straight through otherwise.
    pub async fn feed_audio(&self, pcm_bytes: &[u8]) {
        if !self.inner.running.load(Ordering::Relaxed) {
            return;
        }
        if self.inner.is_rotating.load(Ordering::Relaxed) {
            self.inner.buffer_audio(pcm_bytes);
            return;
        }
        if let Some(active) = self.inner.active.lock().await.as_ref() {
            active.feed_audio(pcm_bytes.to_vec()).await;
        }
    }

    /// Returns the accumulated transcript and resets it, without stopping
    /// the session — used at turn boundaries.
    pub fn snapshot_transcript(&self) -> String {
        let mut acc = self.inner.accumulated_transcript.lock();
        std::mem::take(&mut *acc)
    }

    pub async fn stop(self) {
        self.inner.running.store(false, Ordering::Relaxed);
        self.rotation_task.abort();
        self.forwarder_task.abort();

        if let Some(active) = self.inner.active.lock().await.take() {
            active.stop().await;
        }
        if let Some(standby) = self.inner.standby.lock().await.take() {
            standby.stop().await;
        }
    }
}
