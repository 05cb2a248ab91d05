//! Generated gRPC client code.
//!
//! `build.rs` compiles `proto/stt.proto` into `src/proto/stt.rs` via
//! `tonic-build`, the same checked-source-tree layout the teacher uses for
//! its own `voice_service.rs` (`include!("proto/voice.rs")`).

pub mod stt_proto {
    include!("proto/stt.rs");
}
