//! Real-time telephony audio analysis pipeline: per-call RTP ingestion,
//! voice-activity detection, Korean speech-to-text, turn-boundary
//! detection, and WebSocket/REST fan-out.
//!
//! Module layout and the re-export surface below follow `streaming-core`'s
//! `lib.rs` (small independently testable modules, `pub use` flattening the
//! public API one level).

pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod morpheme;
pub mod pipeline;
pub mod proto;
pub mod rest;
pub mod rtp;
pub mod session;
pub mod speaker;
pub mod stt;
pub mod task_registry;
pub mod turn;
pub mod udp;
pub mod vad;
pub mod ws;

pub use config::Config;
pub use error::{ConfigError, PortPoolError, RtpError, SttError, VadError, WsManagerError};
pub use event::TurnEvent;
pub use metrics::Metrics;
pub use pipeline::{Pipeline, PipelineError};
pub use session::{CallSession, CallSessionSnapshot, PortPool, SessionRegistry};
pub use speaker::SpeakerProcessor;
pub use task_registry::TaskRegistry;
