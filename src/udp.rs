//! Per-port UDP/RTP receiver.
//!
//! Grounded on `aicc_pipeline/core/udp_receiver.py`'s `UDPReceiver`: one
//! non-blocking receive loop per port, decode-and-resample on the hot path,
//! first-packet and audio callbacks. Ported from Python's raw-socket +
//! `BlockingIOError` polling to a `tokio::net::UdpSocket` receive loop
//! selecting against a shutdown signal, the way the teacher's
//! `call_server.rs` accept loop selects against its own shutdown channel.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::oneshot;

use crate::codec;
use crate::metrics::Metrics;
use crate::rtp;
use crate::speaker::SpeakerProcessor;

const RECV_BUFFER_SIZE: usize = 2048;

#[derive(Debug, Default)]
pub struct UdpReceiverStats {
    pub packets_received: u64,
    pub parse_errors: u64,
    pub dropped_whitelist: u64,
}

/// Binds one UDP port and feeds decoded 16kHz PCM to a [`SpeakerProcessor`].
pub struct UdpReceiver {
    port: u16,
    speaker: &'static str,
    packet_count: Arc<AtomicU64>,
    error_count: Arc<AtomicU64>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl UdpReceiver {
    /// Binds and starts the receive loop. `source_whitelist`, when non-empty,
    /// restricts accepted datagrams to the given source IPs.
    pub async fn start(
        port: u16,
        speaker: &'static str,
        processor: Arc<SpeakerProcessor>,
        on_first_packet: Option<Arc<dyn Fn(&'static str) + Send + Sync>>,
        source_whitelist: Vec<std::net::IpAddr>,
        metrics: Arc<Metrics>,
    ) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
        tracing::info!(port, speaker, "listening for RTP");

        let packet_count = Arc::new(AtomicU64::new(0));
        let error_count = Arc::new(AtomicU64::new(0));
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let loop_packet_count = packet_count.clone();
        let loop_error_count = error_count.clone();
        let task = tokio::spawn(async move {
            let mut buf = [0u8; RECV_BUFFER_SIZE];
            let mut first_packet_seen = false;

            loop {
                let recv = tokio::select! {
                    recv = socket.recv_from(&mut buf) => recv,
                    _ = &mut shutdown_rx => break,
                };

                let (len, from) = match recv {
                    Ok(v) => v,
                    Err(err) => {
                        tracing::error!(port, speaker, error = %err, "UDP recv error");
                        continue;
                    }
                };

                if !source_whitelist.is_empty() && !is_allowed(&from, &source_whitelist) {
                    metrics.rtp_packets_dropped_whitelist.fetch_add(1, Ordering::Relaxed);
                    continue;
                }

                if !first_packet_seen {
                    first_packet_seen = true;
                    if let Some(cb) = &on_first_packet {
                        cb(speaker);
                    }
                }

                metrics.rtp_packets_received.fetch_add(1, Ordering::Relaxed);
                metrics.rtp_bytes_received.fetch_add(len as u64, Ordering::Relaxed);

                let packet = match rtp::parse(&buf[..len]) {
                    Ok(p) => p,
                    Err(err) => {
                        let n = loop_error_count.fetch_add(1, Ordering::Relaxed) + 1;
                        metrics.rtp_parse_errors.fetch_add(1, Ordering::Relaxed);
                        if n <= 5 {
                            tracing::warn!(port, speaker, error = %err, "RTP parse error");
                        }
                        continue;
                    }
                };
                loop_packet_count.fetch_add(1, Ordering::Relaxed);

                let pcm_8k = if packet.is_alaw() { codec::decode_alaw(&packet.payload) } else { codec::decode_ulaw(&packet.payload) };
                let pcm_16k = codec::resample(&pcm_8k, 8000, 16000);
                let pcm_bytes: Vec<u8> = pcm_16k.iter().flat_map(|s| s.to_le_bytes()).collect();

                processor.process_audio(&pcm_bytes).await;
            }

            tracing::info!(port, speaker, "UDP receiver stopped");
        });

        Ok(Self { port, speaker, packet_count, error_count, shutdown_tx: Some(shutdown_tx), task: Some(task) })
    }

    pub fn stats(&self) -> UdpReceiverStats {
        UdpReceiverStats {
            packets_received: self.packet_count.load(Ordering::Relaxed),
            parse_errors: self.error_count.load(Ordering::Relaxed),
            dropped_whitelist: 0,
        }
    }

    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

fn is_allowed(from: &SocketAddr, whitelist: &[std::net::IpAddr]) -> bool {
    whitelist.contains(&from.ip())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitelist_allows_listed_ip_only() {
        let whitelist = vec!["127.0.0.1".parse().unwrap()];
        let allowed: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let denied: SocketAddr = "10.0.0.5:5000".parse().unwrap();
        assert!(is_allowed(&allowed, &whitelist));
        assert!(!is_allowed(&denied, &whitelist));
    }
}
