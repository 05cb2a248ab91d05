//! WebSocket fan-out queue overflow (spec.md §8 scenario 5): with no
//! live consumer connected, the bounded outbound queue must drop the
//! oldest item rather than grow unbounded or block the caller.

use std::sync::Arc;
use std::time::Duration;

use aicc_pipeline::config::WsConfig;
use aicc_pipeline::event::TurnEvent;
use aicc_pipeline::metrics::Metrics;
use aicc_pipeline::ws::manager::WsManager;

fn no_consumer_config(queue_maxsize: usize) -> WsConfig {
    WsConfig { urls: vec![], queue_maxsize, reconnect_interval_secs: 5.0, auth_secret: None, auth_client_id: None, token_ttl_secs: 3600 }
}

#[tokio::test]
async fn queue_drops_oldest_event_once_full() {
    let metrics = Arc::new(Metrics::new());
    let manager = WsManager::start(no_consumer_config(5), metrics.clone());

    for i in 0..20 {
        manager.send(TurnEvent::turn_complete("call-1", "customer", i as f64, i as f64 + 1.0, format!("turn {i}"), "complete", 0.8), &metrics);
    }

    // Let the send loop drain what it can; with zero connected consumers
    // the queue still bounds itself at `queue_maxsize`.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let stats = manager.stats();
    assert!(stats.queue_size <= 5, "queue grew past its bound: {}", stats.queue_size);

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.ws_events_enqueued, 20);
    assert!(snapshot.ws_events_dropped >= 15, "expected at least 15 drops, got {}", snapshot.ws_events_dropped);

    manager.stop().await;
}

#[tokio::test]
async fn empty_transcript_turns_never_reach_the_queue() {
    let metrics = Arc::new(Metrics::new());
    let manager = WsManager::start(no_consumer_config(10), metrics.clone());

    manager.send(TurnEvent::turn_complete("call-1", "customer", 0.0, 1.0, "   ", "incomplete", 0.1), &metrics);
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(manager.stats().queue_size, 0);
    assert_eq!(metrics.snapshot().ws_events_enqueued, 0);

    manager.stop().await;
}
