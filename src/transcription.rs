// Audio transcription port
//
// The capture session treats the speech-to-text engine as a black box behind
// this trait: start a streaming recognition job, optionally feed it audio,
// receive partial/final text or an error over a channel, cancel. A concrete
// backend (Whisper, Apple Speech, a network recognizer) implements it; the
// session never sees engine internals.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::VoiceError;

/// One event from a streaming recognition job
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptionEvent {
    /// In-progress recognition; the latest text replaces any prior partial
    Partial { text: String },
    /// The backend committed a final transcript; the stream is done
    Final { text: String },
    /// The stream failed; the kind drives the session's recovery policy
    Error { kind: TranscriptionErrorKind },
}

/// Backend error classification.
///
/// `Cancelled` is the class the default policy recovers immediately from,
/// using the best transcript accumulated so far. The exact mapping lives in
/// `RecoveryPolicy` because the taxonomy depends on the plugged-in backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranscriptionErrorKind {
    /// The job was cancelled (by us or by the engine tearing down)
    Cancelled,
    /// Transport-level failure for network recognizers
    Network,
    /// The engine itself failed mid-stream
    Engine,
    /// Backend-specific code the session does not interpret
    Other(String),
}

/// Streaming speech-to-text capability.
///
/// `start` returns promptly with the event channel; results arrive
/// asynchronously. Implementations own their audio threads; at most one
/// recognition job is live per port (the session enforces this by fully
/// cancelling the old job before starting a new one).
#[async_trait]
pub trait AudioTranscriptionPort: Send + Sync {
    /// Start a streaming recognition job for the given locale.
    ///
    /// Fails with `PermissionDenied` if microphone/recognition permission was
    /// not granted, or `EngineUnavailable` if the backend is down.
    async fn start(&self, locale: &str)
        -> Result<mpsc::Receiver<TranscriptionEvent>, VoiceError>;

    /// Feed captured audio to the job.
    ///
    /// Backends that tap the microphone themselves may ignore this.
    fn feed(&self, _buffer: &[f32]) {}

    /// Cancel the in-flight job. Idempotent; a cancelled job reports
    /// `Error { kind: Cancelled }` on its stream.
    fn cancel(&self);
}
