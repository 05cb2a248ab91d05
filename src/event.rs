//! `TurnEvent` wire schema, fanned out to WebSocket consumers.
//!
//! Grounded on `aicc_pipeline/core/pipeline.py`'s `TurnEvent.to_dict()`:
//! one tagged enum instead of a flat dataclass with type-conditional
//! fields, since Rust's `serde(tag = "type")` expresses the same
//! discriminated union without the `Optional[...]` soup.

use chrono::Utc;
use serde::Serialize;

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum TurnEvent {
    #[serde(rename = "metadata_start")]
    MetadataStart {
        call_id: String,
        timestamp: String,
        customer_number: String,
        agent_id: String,
    },
    #[serde(rename = "turn_complete")]
    TurnComplete {
        call_id: String,
        timestamp: String,
        speaker: String,
        start_time: f64,
        end_time: f64,
        transcript: String,
        decision: String,
        fusion_score: f64,
    },
    #[serde(rename = "metadata_end")]
    MetadataEnd {
        call_id: String,
        timestamp: String,
        total_duration: f64,
        turn_count: u64,
        speech_ratio: f64,
        complete_turns: u64,
        incomplete_turns: u64,
    },
}

impl TurnEvent {
    fn now_iso8601() -> String {
        Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
    }

    pub fn metadata_start(call_id: impl Into<String>, customer_number: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self::MetadataStart {
            call_id: call_id.into(),
            timestamp: Self::now_iso8601(),
            customer_number: customer_number.into(),
            agent_id: agent_id.into(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn turn_complete(
        call_id: impl Into<String>,
        speaker: impl Into<String>,
        start_time: f64,
        end_time: f64,
        transcript: impl Into<String>,
        decision: impl Into<String>,
        fusion_score: f64,
    ) -> Self {
        Self::TurnComplete {
            call_id: call_id.into(),
            timestamp: Self::now_iso8601(),
            speaker: speaker.into(),
            start_time: round3(start_time),
            end_time: round3(end_time),
            transcript: transcript.into(),
            decision: decision.into(),
            fusion_score: round3(fusion_score),
        }
    }

    pub fn metadata_end(
        call_id: impl Into<String>,
        total_duration: f64,
        turn_count: u64,
        speech_ratio: f64,
        complete_turns: u64,
        incomplete_turns: u64,
    ) -> Self {
        Self::MetadataEnd {
            call_id: call_id.into(),
            timestamp: Self::now_iso8601(),
            total_duration: round3(total_duration),
            turn_count,
            speech_ratio: round3(speech_ratio),
            complete_turns,
            incomplete_turns,
        }
    }

    /// `turn_complete` events with an empty transcript are dropped before
    /// enqueue to the WebSocket fan-out manager, per spec.md §4.11.
    pub fn is_empty_turn(&self) -> bool {
        matches!(self, Self::TurnComplete { transcript, .. } if transcript.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_start_serializes_with_type_tag() {
        let event = TurnEvent::metadata_start("call-1", "0101234", "agent-9");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "metadata_start");
        assert_eq!(json["customer_number"], "0101234");
        assert!(json["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn turn_complete_rounds_to_three_decimals() {
        let event = TurnEvent::turn_complete("call-1", "customer", 1.23456, 2.98765, "네 알겠습니다", "complete", 0.837123);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["start_time"], 1.235);
        assert_eq!(json["end_time"], 2.988);
        assert_eq!(json["fusion_score"], 0.837);
    }

    #[test]
    fn empty_transcript_turn_is_flagged_for_drop() {
        let event = TurnEvent::turn_complete("call-1", "agent", 0.0, 1.0, "   ", "incomplete", 0.2);
        assert!(event.is_empty_turn());
    }

    #[test]
    fn non_empty_transcript_turn_is_not_flagged() {
        let event = TurnEvent::turn_complete("call-1", "agent", 0.0, 1.0, "네", "incomplete", 0.2);
        assert!(!event.is_empty_turn());
    }
}
