//! Outbound WebSocket fan-out manager.
//!
//! Grounded on `aicc_pipeline/websocket/manager.py`'s `WebSocketManager`:
//! one bounded drop-oldest-on-full queue, one send loop that serializes
//! once and broadcasts to every live connection, and a per-URL
//! connect/reconnect task — the same connect-with-headers shape the
//! teacher's `openai_realtime.rs` uses for its own outbound WebSocket.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::http::Request;
use tokio_tungstenite::tungstenite::Message;

use crate::config::WsConfig;
use crate::event::TurnEvent;
use crate::metrics::Metrics;
use crate::ws::auth::WsAuth;

struct Queue {
    items: Mutex<VecDeque<String>>,
    notify: Notify,
    maxsize: usize,
}

impl Queue {
    fn new(maxsize: usize) -> Self {
        Self { items: Mutex::new(VecDeque::new()), notify: Notify::new(), maxsize }
    }

    /// Enqueues one serialized event, dropping the oldest queued item when
    /// full (spec.md §4.11).
    fn push(&self, item: String, metrics: &Metrics) {
        let mut items = self.items.lock();
        if items.len() >= self.maxsize {
            items.pop_front();
            metrics.ws_events_dropped.fetch_add(1, Ordering::Relaxed);
        }
        items.push_back(item);
        drop(items);
        metrics.ws_events_enqueued.fetch_add(1, Ordering::Relaxed);
        self.notify.notify_one();
    }

    async fn pop(&self) -> String {
        loop {
            if let Some(item) = self.items.lock().pop_front() {
                return item;
            }
            self.notify.notified().await;
        }
    }

    fn len(&self) -> usize {
        self.items.lock().len()
    }
}

/// Fans one outbound event stream out to a set of WebSocket consumers,
/// reconnecting any endpoint that drops.
pub struct WsManager {
    queue: Arc<Queue>,
    running: Arc<AtomicBool>,
    sent_count: Arc<AtomicU64>,
    urls: Vec<String>,
    send_task: Option<JoinHandle<()>>,
    reconnect_tasks: Vec<JoinHandle<()>>,
}

impl WsManager {
    pub fn start(config: WsConfig, metrics: Arc<Metrics>) -> Self {
        let auth = WsAuth::from_config(config.auth_secret.as_deref(), config.auth_client_id.as_deref(), config.token_ttl_secs).map(Arc::new);

        let queue = Arc::new(Queue::new(config.queue_maxsize));
        let running = Arc::new(AtomicBool::new(true));
        let sent_count = Arc::new(AtomicU64::new(0));
        let connections: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Message>>>> = Arc::new(Mutex::new(HashMap::new()));

        let mut reconnect_tasks = Vec::new();
        for url in &config.urls {
            let task = spawn_connection_supervisor(url.clone(), auth.clone(), connections.clone(), running.clone(), config.reconnect_interval_secs, metrics.clone());
            reconnect_tasks.push(task);
        }

        let send_task = {
            let queue = queue.clone();
            let running = running.clone();
            let sent_count = sent_count.clone();
            let connections = connections.clone();
            let metrics = metrics.clone();
            tokio::spawn(async move {
                while running.load(Ordering::Relaxed) {
                    let payload = queue.pop().await;
                    let live: Vec<(String, mpsc::UnboundedSender<Message>)> = connections.lock().iter().map(|(u, tx)| (u.clone(), tx.clone())).collect();
                    for (url, tx) in live {
                        if tx.send(Message::Text(payload.clone())).is_err() {
                            tracing::warn!(url, "WebSocket send channel closed, connection will be reaped by its supervisor");
                            metrics.ws_send_failures.fetch_add(1, Ordering::Relaxed);
                            continue;
                        }
                        sent_count.fetch_add(1, Ordering::Relaxed);
                        metrics.ws_events_sent.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        };

        Self { queue, running, sent_count, urls: config.urls, send_task: Some(send_task), reconnect_tasks }
    }

    /// Enqueues one event. `turn_complete` events with an empty transcript
    /// are dropped before enqueue (spec.md §4.11).
    pub fn send(&self, event: TurnEvent, metrics: &Metrics) {
        if event.is_empty_turn() {
            tracing::debug!("filtered out turn_complete with empty transcript");
            return;
        }
        match serde_json::to_string(&event) {
            Ok(payload) => self.queue.push(payload, metrics),
            Err(err) => tracing::error!(error = %err, "failed to serialize TurnEvent"),
        }
    }

    pub fn stats(&self) -> WsManagerStats {
        WsManagerStats { queue_size: self.queue.len(), queue_maxsize: self.queue.maxsize, sent_count: self.sent_count.load(Ordering::Relaxed), total_urls: self.urls.len() }
    }

    pub async fn stop(mut self) {
        self.running.store(false, Ordering::Relaxed);
        self.queue.notify.notify_waiters();
        for task in self.reconnect_tasks.drain(..) {
            task.abort();
        }
        if let Some(task) = self.send_task.take() {
            task.abort();
        }
        tracing::info!(sent = self.sent_count.load(Ordering::Relaxed), "WebSocket manager stopped");
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct WsManagerStats {
    pub queue_size: usize,
    pub queue_maxsize: usize,
    pub sent_count: u64,
    pub total_urls: usize,
}

fn spawn_connection_supervisor(
    url: String,
    auth: Option<Arc<WsAuth>>,
    connections: Arc<Mutex<HashMap<String, mpsc::UnboundedSender<Message>>>>,
    running: Arc<AtomicBool>,
    reconnect_interval_secs: f32,
    metrics: Arc<Metrics>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while running.load(Ordering::Relaxed) {
            match connect_one(&url, auth.as_deref()).await {
                Ok(stream) => {
                    tracing::info!(url, "connected");
                    let (mut write, mut read) = stream.split();
                    let (tx, mut rx) = mpsc::unbounded_channel();
                    connections.lock().insert(url.clone(), tx);

                    loop {
                        tokio::select! {
                            outgoing = rx.recv() => {
                                match outgoing {
                                    Some(msg) => {
                                        if let Err(err) = write.send(msg).await {
                                            tracing::error!(url, error = %err, "send error");
                                            metrics.ws_send_failures.fetch_add(1, Ordering::Relaxed);
                                            break;
                                        }
                                    }
                                    None => break,
                                }
                            }
                            incoming = read.next() => {
                                match incoming {
                                    Some(Ok(_)) => {}
                                    _ => break,
                                }
                            }
                        }
                    }

                    connections.lock().remove(&url);
                    tracing::warn!(url, "connection closed, scheduling reconnect");
                }
                Err(err) => {
                    tracing::warn!(url, error = %err, "connection failed");
                }
            }

            if !running.load(Ordering::Relaxed) {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_secs_f32(reconnect_interval_secs)).await;
        }
    })
}

async fn connect_one(
    url: &str,
    auth: Option<&WsAuth>,
) -> Result<tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>, tokio_tungstenite::tungstenite::Error> {
    let mut builder = Request::builder().uri(url);
    if let Some(auth) = auth {
        builder = builder.header("Authorization", auth.bearer_header());
    }
    let request = builder.body(()).expect("URL and header-only request always builds");

    let (stream, _response) = tokio_tungstenite::connect_async(request).await?;
    Ok(stream)
}
