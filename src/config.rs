// Engine configuration
//
// All numeric knobs for the capture and speech sessions live here, read at
// session-start time. Runtime updates go through validated setters so a bad
// settings value can never wedge the silence detector or the pacing loop.

use serde::{Deserialize, Serialize};

use crate::error::VoiceError;
use crate::transcription::TranscriptionErrorKind;

// Capture timing defaults
const DEFAULT_SILENCE_THRESHOLD_MS: u64 = 1500; // End-of-turn silence window
const DEFAULT_RESTART_GRACE_MS: u64 = 150; // Teardown settle time before a restart
const DEFAULT_STOP_GRACE_MS: u64 = 400; // Window for a late error callback to recover the transcript
const DEFAULT_ERROR_RETRY_DELAY_MS: u64 = 300; // Delay before best-effort finalize on a recoverable error
const DEFAULT_RESTART_DEBOUNCE_MS: u64 = 600; // Keeps the mic from catching the assistant's own speech tail

// Conversation defaults
const DEFAULT_CONTEXT_WINDOW_DAYS: i64 = 7;
const DEFAULT_MAX_HISTORY_TURNS: usize = 20;

/// What the capture session does when the transcription backend reports an
/// error mid-stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoveryAction {
    /// Finalize immediately with the best transcript accumulated so far
    FinalizeNow,
    /// Wait a short delay, then finalize with the best transcript
    FinalizeAfterDelay,
    /// Abandon the turn silently (no `on_final`)
    Drop,
}

/// Policy mapping transcription error kinds to recovery actions.
///
/// The concrete error taxonomy is a property of whichever backend is plugged
/// in, so the "cancellation-class errors are safe to recover" heuristic is a
/// policy point here rather than a hardcoded error code in the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryPolicy {
    pub on_cancelled: RecoveryAction,
    pub on_network: RecoveryAction,
    pub on_engine: RecoveryAction,
    pub on_other: RecoveryAction,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        RecoveryPolicy {
            on_cancelled: RecoveryAction::FinalizeNow,
            on_network: RecoveryAction::FinalizeAfterDelay,
            on_engine: RecoveryAction::FinalizeAfterDelay,
            on_other: RecoveryAction::FinalizeAfterDelay,
        }
    }
}

impl RecoveryPolicy {
    /// Classify a backend error kind into a recovery action
    pub fn classify(&self, kind: &TranscriptionErrorKind) -> RecoveryAction {
        match kind {
            TranscriptionErrorKind::Cancelled => self.on_cancelled,
            TranscriptionErrorKind::Network => self.on_network,
            TranscriptionErrorKind::Engine => self.on_engine,
            TranscriptionErrorKind::Other(_) => self.on_other,
        }
    }
}

/// Capture session and orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Recognition locale passed to the transcription backend
    pub locale: String,
    /// Silence window before a non-empty partial is finalized (ms)
    pub silence_threshold_ms: u64,
    /// Settle time between stopping a live capture and restarting it (ms)
    pub restart_grace_ms: u64,
    /// How long the latest-transcript buffer survives an explicit stop (ms)
    pub stop_grace_ms: u64,
    /// Delay before best-effort finalize on a recoverable backend error (ms)
    pub error_retry_delay_ms: u64,
    /// Debounce between speech completion and continuous-mode recapture (ms)
    pub restart_debounce_ms: u64,
    /// How far ahead the orchestrator fetches calendar context (days)
    pub context_window_days: i64,
    /// Bounded conversation history handed to the intent processor
    pub max_history_turns: usize,
    /// Error-kind to recovery-action mapping
    pub recovery: RecoveryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            locale: "en-US".to_string(),
            silence_threshold_ms: DEFAULT_SILENCE_THRESHOLD_MS,
            restart_grace_ms: DEFAULT_RESTART_GRACE_MS,
            stop_grace_ms: DEFAULT_STOP_GRACE_MS,
            error_retry_delay_ms: DEFAULT_ERROR_RETRY_DELAY_MS,
            restart_debounce_ms: DEFAULT_RESTART_DEBOUNCE_MS,
            context_window_days: DEFAULT_CONTEXT_WINDOW_DAYS,
            max_history_turns: DEFAULT_MAX_HISTORY_TURNS,
            recovery: RecoveryPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Update the silence window, validating the range.
    ///
    /// This lets the user tune end-of-turn detection without restarting the
    /// application.
    pub fn set_silence_threshold_ms(&mut self, threshold_ms: u64) -> Result<(), VoiceError> {
        if !(100..=10_000).contains(&threshold_ms) {
            return Err(VoiceError::Config(format!(
                "invalid silence threshold: {}ms. Must be between 100ms and 10000ms",
                threshold_ms
            )));
        }
        log::info!("Silence threshold updated: {}ms", threshold_ms);
        self.silence_threshold_ms = threshold_ms;
        Ok(())
    }
}

/// Speech output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    /// Synthesis rate multiplier (1.0 = natural)
    pub rate: f32,
    /// Synthesis pitch multiplier (1.0 = natural)
    pub pitch: f32,
    /// Pause inserted between sentence fragments; 0 disables splitting (secs)
    pub sentence_pause_secs: f32,
    /// Backend voice identifier, if the caller wants a specific voice
    pub voice_id: Option<String>,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        SpeechConfig {
            rate: 1.0,
            pitch: 1.0,
            sentence_pause_secs: 0.4,
            voice_id: None,
        }
    }
}

impl SpeechConfig {
    /// Update rate and pitch, validating the ranges
    pub fn set_voice_shape(&mut self, rate: f32, pitch: f32) -> Result<(), VoiceError> {
        if !(0.25..=4.0).contains(&rate) {
            return Err(VoiceError::Config(format!(
                "invalid speech rate: {}. Must be between 0.25 and 4.0",
                rate
            )));
        }
        if !(0.5..=2.0).contains(&pitch) {
            return Err(VoiceError::Config(format!(
                "invalid speech pitch: {}. Must be between 0.5 and 2.0",
                pitch
            )));
        }
        self.rate = rate;
        self.pitch = pitch;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_recovery_policy() {
        let policy = RecoveryPolicy::default();
        assert_eq!(
            policy.classify(&TranscriptionErrorKind::Cancelled),
            RecoveryAction::FinalizeNow
        );
        assert_eq!(
            policy.classify(&TranscriptionErrorKind::Network),
            RecoveryAction::FinalizeAfterDelay
        );
        assert_eq!(
            policy.classify(&TranscriptionErrorKind::Other("kAFAssistantErrorDomain".into())),
            RecoveryAction::FinalizeAfterDelay
        );
    }

    #[test]
    fn test_silence_threshold_validation() {
        let mut config = EngineConfig::default();
        assert!(config.set_silence_threshold_ms(50).is_err());
        assert!(config.set_silence_threshold_ms(20_000).is_err());
        assert!(config.set_silence_threshold_ms(800).is_ok());
        assert_eq!(config.silence_threshold_ms, 800);
    }

    #[test]
    fn test_voice_shape_validation() {
        let mut config = SpeechConfig::default();
        assert!(config.set_voice_shape(0.0, 1.0).is_err());
        assert!(config.set_voice_shape(1.0, 3.0).is_err());
        assert!(config.set_voice_shape(1.2, 0.9).is_ok());
        assert_eq!(config.rate, 1.2);
    }
}
