//! A single bidirectional streaming STT session.
//!
//! Grounded on `aicc_pipeline/stt/streaming_stt.py`'s `StreamingSTTSession`:
//! an audio-feed queue driving an outbound request stream, and a spawned
//! task forwarding inbound results to a callback channel. The feed queue's
//! drop-oldest-on-full policy and rate-limited drop logging mirror
//! `ws::manager::Queue::push` and `udp.rs`'s RTP parse-error counter.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use futures_util::StreamExt;
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use crate::config::SttConfig;
use crate::error::SttError;

use super::provider::SttProvider;

#[derive(Debug, Clone)]
pub struct StreamingResult {
    pub transcript: String,
    pub is_final: bool,
    pub confidence: f32,
    pub stability: f32,
}

/// Maximum consecutive drop-oldest logs per burst before going quiet,
/// matching `udp.rs`'s RTP parse-error cap.
const DROP_LOG_BURST: u32 = 5;

/// Bounded, drop-oldest-on-full queue feeding the outbound audio stream.
/// Capacity is `AICC_STT_AUDIO_QUEUE_MAXSIZE`; once full, the oldest
/// buffered frame is evicted so the most recent audio always reaches the
/// provider (spec.md §5, §4.9: "STT feed: bounded channel per speaker; on
/// full, drop oldest frame with rate-limited log").
struct FeedQueue {
    items: SyncMutex<VecDeque<Vec<u8>>>,
    notify: Notify,
    maxsize: usize,
    closed: AtomicBool,
    consecutive_drops: AtomicU32,
}

impl FeedQueue {
    fn new(maxsize: usize) -> Self {
        Self {
            items: SyncMutex::new(VecDeque::new()),
            notify: Notify::new(),
            maxsize,
            closed: AtomicBool::new(false),
            consecutive_drops: AtomicU32::new(0),
        }
    }

    fn push(&self, item: Vec<u8>) {
        let mut items = self.items.lock();
        if items.len() >= self.maxsize {
            items.pop_front();
            let n = self.consecutive_drops.fetch_add(1, Ordering::Relaxed) + 1;
            if n <= DROP_LOG_BURST {
                tracing::warn!("streaming STT feed queue full, dropping oldest frame");
            }
        } else {
            self.consecutive_drops.store(0, Ordering::Relaxed);
        }
        items.push_back(item);
        drop(items);
        self.notify.notify_one();
    }

    /// Pops the oldest frame, or `None` once the queue is closed and
    /// drained.
    async fn pop(&self) -> Option<Vec<u8>> {
        loop {
            if let Some(item) = self.items.lock().pop_front() {
                return Some(item);
            }
            if self.closed.load(Ordering::Relaxed) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.notify.notify_waiters();
    }
}

pub struct StreamingSttSession {
    feed: Arc<FeedQueue>,
    task: JoinHandle<()>,
    feeder_task: JoinHandle<()>,
}

impl StreamingSttSession {
    /// Starts a new session against `provider`, forwarding every result to
    /// `result_tx`. The feed channel is bounded by `AICC_STT_AUDIO_QUEUE_MAXSIZE`.
    pub async fn start(
        provider: Arc<dyn SttProvider>,
        config: SttConfig,
        result_tx: mpsc::Sender<StreamingResult>,
    ) -> Result<Self, SttError> {
        // The provider's outbound stream is driven by `audio_rx`; the feeder
        // task below is the queue's sole consumer, so this transport
        // channel never itself needs to apply backpressure — eviction
        // happens earlier, at `FeedQueue::push`, where the caller's most
        // recent frame is what's kept.
        let (audio_tx, audio_rx) = mpsc::channel(config.audio_queue_maxsize.max(1));

        let mut inbound = provider.streaming_recognize(&config, audio_rx).await?;

        let task = tokio::spawn(async move {
            while let Some(item) = inbound.next().await {
                match item {
                    Ok(response) => {
                        let result = StreamingResult {
                            transcript: response.transcript,
                            is_final: response.is_final,
                            confidence: response.confidence,
                            stability: response.stability,
                        };
                        if result_tx.send(result).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "streaming STT session error");
                        break;
                    }
                }
            }
        });

        let feed = Arc::new(FeedQueue::new(config.audio_queue_maxsize.max(1)));
        let feeder_feed = feed.clone();
        let feeder_task = tokio::spawn(async move {
            while let Some(frame) = feeder_feed.pop().await {
                if audio_tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        Ok(Self { feed, task, feeder_task })
    }

    /// Feeds one PCM frame to the active session. When the feed queue is
    /// full, evicts the oldest buffered frame (rate-limited log) so the
    /// provider always receives the most recent audio rather than the
    /// newest frame being rejected.
    pub async fn feed_audio(&self, pcm_bytes: Vec<u8>) {
        self.feed.push(pcm_bytes);
    }

    pub async fn stop(self) {
        self.feed.close();
        let _ = self.feeder_task.await;
        let _ = self.task.await;
    }
}
