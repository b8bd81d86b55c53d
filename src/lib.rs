//! Cadenza - voice session engine for a calendar assistant
//!
//! Captures spoken input, segments it into turns, hands transcripts to an
//! external intent processor, and speaks back generated natural-language
//! responses, optionally reopening the microphone for a follow-up.
//!
//! The crate has four working parts:
//! - [`capture::CaptureSession`]: turn state machine around a streaming
//!   speech-to-text port, with silence-based end-of-turn detection
//! - [`speech::SpeechOutputSession`]: sentence-paced speech output with
//!   pause/resume/cancel
//! - [`orchestrator::TurnOrchestrator`]: sequences capture, intent
//!   processing, confirmation and speech across a turn, and owns
//!   continuous-mode semantics
//! - [`narrative::NarrativeGenerator`]: deterministic schedule-to-prose
//!   rendering (conflicts, busy periods, gaps, time-relative phrasing)
//!
//! The speech engines, calendar store and intent backend are injected
//! through the port traits in [`transcription`], [`synthesis`],
//! [`calendar`] and [`intent`]; nothing in the crate is a global.

pub mod calendar;
pub mod capture;
pub mod config;
pub mod error;
pub mod intent;
pub mod narrative;
pub mod orchestrator;
pub mod speech;
pub mod synthesis;
pub mod transcription;

// Re-export main types for convenience
pub use calendar::{CalendarEvent, CalendarEventSupplier, EventSource, TimeRange};
pub use capture::{CaptureHandlers, CaptureSession, CaptureState};
pub use config::{EngineConfig, RecoveryAction, RecoveryPolicy, SpeechConfig};
pub use error::VoiceError;
pub use intent::{
    AssistantResponse, CalendarCommand, ConversationRole, ConversationTurn, IntentProcessor,
    IntentRequest,
};
pub use narrative::{
    NarrativeGenerator, NarrativeParts, NarrativeRequest, ScheduleAnalysis, ScheduleCharacter,
};
pub use orchestrator::{Turn, TurnOrchestrator};
pub use speech::SpeechOutputSession;
pub use synthesis::{SpeechSynthesisPort, SynthesisOutcome, Utterance};
pub use transcription::{AudioTranscriptionPort, TranscriptionErrorKind, TranscriptionEvent};
