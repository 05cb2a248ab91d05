//! Process configuration, loaded once from the environment at startup.
//!
//! Per REDESIGN FLAGS §9 (module-level singletons for config), this is not a
//! global — `Config` is built once in `main.rs` and threaded explicitly into
//! every component that needs it, the way the teacher's `PipelineBuilder`
//! takes an explicit `EventBus` handle rather than reaching for a static.

use crate::error::ConfigError;
use std::env;

/// Filters comment and blank lines out of a newline-separated list, the way
/// the WebSocket manager's URL list is described in spec.md §4.11.
fn non_blank_lines(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

fn env_f32(key: &str, default: f32) -> Result<f32, ConfigError> {
    match env::var(key) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: v,
        }),
        Err(_) => Ok(default),
    }
}

fn env_u32(key: &str, default: u32) -> Result<u32, ConfigError> {
    match env::var(key) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: v,
        }),
        Err(_) => Ok(default),
    }
}

fn env_u16(key: &str, default: u16) -> Result<u16, ConfigError> {
    match env::var(key) {
        Ok(v) => v.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: v,
        }),
        Err(_) => Ok(default),
    }
}

/// Collects `AICC_WS_URL`, `AICC_WS_URL_1`, `AICC_WS_URL_2`, ... into an
/// ordered list, stopping at the first unset index.
fn collect_ws_urls() -> Vec<String> {
    let mut urls = Vec::new();

    if let Ok(main) = env::var("AICC_WS_URL") {
        if !main.trim().is_empty() {
            urls.push(main);
        }
    }

    let mut i = 1u32;
    loop {
        match env::var(format!("AICC_WS_URL_{i}")) {
            Ok(url) if !url.trim().is_empty() => {
                urls.push(url);
                i += 1;
            }
            _ => break,
        }
    }

    urls
}

fn collect_stt_phrases() -> Vec<String> {
    let mut phrases = Vec::new();

    if let Ok(raw) = env::var("AICC_STT_PHRASES") {
        phrases.extend(raw.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from));
    }

    if let Ok(path) = env::var("AICC_STT_PHRASES_PATH") {
        if let Ok(contents) = std::fs::read_to_string(&path) {
            phrases.extend(non_blank_lines(&contents));
        }
    }

    let mut seen = std::collections::HashSet::new();
    phrases.retain(|p| seen.insert(p.clone()));
    phrases
}

/// Turn-detector fusion weights, §4.5.
#[derive(Debug, Clone, Copy)]
pub struct TurnWeights {
    pub morpheme: f32,
    pub duration: f32,
    pub silence: f32,
    pub complete_threshold: f32,
}

/// Outbound WebSocket fan-out settings, §4.11.
#[derive(Debug, Clone)]
pub struct WsConfig {
    pub urls: Vec<String>,
    pub queue_maxsize: usize,
    pub reconnect_interval_secs: f32,
    pub auth_secret: Option<String>,
    pub auth_client_id: Option<String>,
    pub token_ttl_secs: u64,
}

/// STT adapter settings, §4.6 and §6.
#[derive(Debug, Clone)]
pub struct SttConfig {
    pub language: String,
    pub phrases: Vec<String>,
    pub phrase_boost: f32,
    pub rotation_secs: f32,
    pub audio_queue_maxsize: usize,
    pub credentials_path: Option<String>,
    pub endpoint: Option<String>,
    /// Streaming (continuous-session + arbiter) vs batch (accumulate then
    /// transcribe on silence) mode, §4.6. Streaming is the primary mode per
    /// §4.13 ("start their STT sessions (streaming mode) before the UDP
    /// receivers begin delivering audio"); see DESIGN.md Open Questions.
    pub streaming: bool,
}

/// Turn-boundary arbiter settings, §4.7 (streaming mode only).
#[derive(Debug, Clone, Copy)]
pub struct ArbiterConfig {
    pub min_silence_ms: u32,
    pub min_chars: usize,
    pub grace_period_ms: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub customer_port: u16,
    pub agent_port: u16,
    pub port_range_start: u16,
    pub port_range_end: u16,
    pub rest_host: String,
    pub rest_port: u16,

    pub vad_threshold: f32,
    pub min_speech_ms: u32,
    pub min_silence_ms: u32,

    pub turn_weights: TurnWeights,
    pub arbiter: ArbiterConfig,
    pub ws: WsConfig,
    pub stt: SttConfig,

    pub log_level: String,
}

impl Config {
    /// Loads configuration from the environment, applying spec.md §6 defaults.
    ///
    /// Returns `ConfigError::NoWebSocketUrl` when no outbound consumer is
    /// configured — this is the one fatal configuration error spec.md §7
    /// calls out ("no WebSocket URL... non-zero exit with actionable message").
    pub fn from_env() -> Result<Self, ConfigError> {
        let ws_urls = collect_ws_urls();
        if ws_urls.is_empty() {
            return Err(ConfigError::NoWebSocketUrl);
        }

        let port_range_start = env_u16("AICC_PORT_RANGE_START", 30000)?;
        let port_range_end = env_u16("AICC_PORT_RANGE_END", 40000)?;

        Ok(Self {
            customer_port: env_u16("AICC_CUSTOMER_PORT", 12345)?,
            agent_port: env_u16("AICC_AGENT_PORT", 12346)?,
            port_range_start,
            port_range_end,
            rest_host: env::var("AICC_REST_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            rest_port: env_u16("AICC_REST_PORT", 8081)?,

            vad_threshold: env_f32("AICC_VAD_THRESHOLD", 0.45)?,
            min_speech_ms: env_u32("AICC_MIN_SPEECH_MS", 300)?,
            min_silence_ms: env_u32("AICC_MIN_SILENCE_MS", 800)?,

            turn_weights: TurnWeights {
                morpheme: env_f32("AICC_TURN_MORPHEME_WEIGHT", 0.6)?,
                duration: env_f32("AICC_TURN_DURATION_WEIGHT", 0.2)?,
                silence: env_f32("AICC_TURN_SILENCE_WEIGHT", 0.2)?,
                complete_threshold: env_f32("AICC_TURN_COMPLETE_THRESHOLD", 0.65)?,
            },

            arbiter: ArbiterConfig {
                min_silence_ms: env_u32("AICC_TURN_MIN_SILENCE_MS", 800)?,
                min_chars: env_u32("AICC_TURN_MIN_CHARS", 1)? as usize,
                grace_period_ms: 1000,
            },

            ws: WsConfig {
                urls: ws_urls,
                queue_maxsize: env_u32("AICC_WS_QUEUE_MAXSIZE", 1000)? as usize,
                reconnect_interval_secs: env_f32("AICC_WS_RECONNECT_INTERVAL", 5.0)?,
                auth_secret: env::var("AICC_WS_AUTH_SECRET").ok(),
                auth_client_id: env::var("AICC_WS_AUTH_CLIENT_ID").ok(),
                token_ttl_secs: env_u32("AICC_WS_AUTH_TOKEN_TTL_SEC", 3600)? as u64,
            },

            stt: SttConfig {
                language: env::var("AICC_STT_LANGUAGE").unwrap_or_else(|_| "ko-KR".to_string()),
                phrases: collect_stt_phrases(),
                phrase_boost: env_f32("AICC_STT_PHRASE_BOOST", 10.0)?,
                rotation_secs: env_f32("AICC_STT_ROTATION_SEC", 270.0)?,
                audio_queue_maxsize: env_u32("AICC_STT_AUDIO_QUEUE_MAXSIZE", 300)? as usize,
                credentials_path: env::var("AICC_STT_CREDENTIALS_PATH").ok(),
                endpoint: env::var("AICC_STT_ENDPOINT").ok(),
                streaming: env::var("AICC_STT_STREAMING_MODE").map(|v| v != "0" && v.to_lowercase() != "false").unwrap_or(true),
            },

            log_level: env::var("AICC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_blank_lines_filters_comments_and_blanks() {
        let raw = "ws://a\n# comment\n\nws://b\n";
        assert_eq!(non_blank_lines(raw), vec!["ws://a", "ws://b"]);
    }

    #[test]
    fn collect_stt_phrases_dedupes() {
        std::env::set_var("AICC_STT_PHRASES", "네, 감사합니다, 네");
        let phrases = collect_stt_phrases();
        assert_eq!(phrases, vec!["네", "감사합니다"]);
        std::env::remove_var("AICC_STT_PHRASES");
    }
}
