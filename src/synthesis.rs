// Speech synthesis port
//
// The speech output session drives the text-to-speech engine through this
// trait, one utterance at a time. A concrete backend (Piper, AVSpeech, a
// cloud voice) implements it and owns the audio device; the session only
// sequences utterances and transport controls.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::VoiceError;

/// One unit of synthesized speech
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    pub text: String,
    /// Backend voice identifier; `None` means the backend default
    pub voice_id: Option<String>,
    /// Rate multiplier (1.0 = natural)
    pub rate: f32,
    /// Pitch multiplier (1.0 = natural)
    pub pitch: f32,
    /// Pause the backend holds after the utterance finishes (secs)
    pub post_delay_secs: f32,
}

/// How an utterance ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthesisOutcome {
    /// Playback ran to the end of the utterance
    Finished,
    /// `cancel()` interrupted playback
    Cancelled,
}

/// One-utterance-at-a-time synthesis capability.
///
/// `speak` resolves when the utterance finishes or is cancelled; transport
/// controls are fire-and-forget and must be safe to call in any state.
/// `cancel` always returns the output device to its pre-speech state.
#[async_trait]
pub trait SpeechSynthesisPort: Send + Sync {
    async fn speak(&self, utterance: Utterance) -> Result<SynthesisOutcome, VoiceError>;

    /// Pause mid-utterance. No-op if nothing is playing.
    fn pause(&self);

    /// Resume a paused utterance. No-op if nothing is paused.
    fn resume(&self);

    /// Cancel the current utterance. Idempotent.
    fn cancel(&self);
}
