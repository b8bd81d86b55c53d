//! Unified error handling for the Cadenza voice engine
//!
//! This module provides a centralized error type covering the capture,
//! synthesis and orchestration paths. Using `thiserror`, we derive the
//! Error trait and provide clean, descriptive error messages.
//!
//! Propagation policy: capture and synthesis failures never cross the
//! session boundary as panics. Fatal variants (`PermissionDenied`,
//! `EngineUnavailable`) are surfaced to the caller of `start()`; everything
//! else resolves inside the session to a best-effort result or a silent
//! no-op, because a voice UI must never hang on a flaky backend.

use thiserror::Error;

/// Main error type for all voice engine operations
#[derive(Error, Debug)]
pub enum VoiceError {
    /// Microphone or speech-recognition permission was not granted
    #[error("permission denied for microphone or speech recognition")]
    PermissionDenied,

    /// The transcription or synthesis backend is not available
    #[error("speech engine unavailable: {0}")]
    EngineUnavailable(String),

    /// The recognition stream was cancelled by the backend
    #[error("recognition cancelled")]
    RecognitionCancelled,

    /// Recognition errors other than cancellation (network, engine)
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Speech synthesis errors (engine failure, device unavailable)
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Intent processor errors (backend failure, malformed response)
    #[error("intent processing error: {0}")]
    Intent(String),

    /// Calendar supplier errors (store unavailable, access denied)
    #[error("calendar error: {0}")]
    Calendar(String),

    /// Configuration errors (invalid knob values)
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic errors for edge cases
    #[error("internal error: {0}")]
    Internal(String),
}

impl VoiceError {
    /// Whether the error is fatal to the call that produced it.
    ///
    /// Fatal errors produce no transcript and are reported to the caller;
    /// everything else is recovered inside the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            VoiceError::PermissionDenied | VoiceError::EngineUnavailable(_)
        )
    }
}

/// Implement Serialize for VoiceError so a front-end can consume it
impl serde::Serialize for VoiceError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VoiceError::Recognition("stream reset".to_string());
        assert_eq!(err.to_string(), "recognition error: stream reset");
    }

    #[test]
    fn test_fatal_classification() {
        assert!(VoiceError::PermissionDenied.is_fatal());
        assert!(VoiceError::EngineUnavailable("offline".into()).is_fatal());
        assert!(!VoiceError::RecognitionCancelled.is_fatal());
        assert!(!VoiceError::Synthesis("device busy".into()).is_fatal());
    }

    #[test]
    fn test_error_serializes_as_string() {
        let err = VoiceError::PermissionDenied;
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(
            json,
            "\"permission denied for microphone or speech recognition\""
        );
    }
}
