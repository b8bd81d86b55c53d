//! Speech output session
//!
//! Speaks a possibly multi-sentence message through the synthesis port,
//! pacing sentence boundaries with a configurable pause, and exposes
//! transport controls. One utterance is in flight at a time; `speak` on a
//! busy session cancels the prior message first. The caller's completion
//! fires exactly once, after the last queued fragment, however many
//! fragments the message split into.

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::AbortHandle;

use crate::config::SpeechConfig;
use crate::synthesis::{SpeechSynthesisPort, SynthesisOutcome, Utterance};

/// A run of text up to and including its sentence terminator(s)
static RE_SENTENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^.!?]+[.!?]+").unwrap());

type CompletionHandler = Box<dyn FnOnce() + Send>;

struct SpeakInner {
    generation: u64,
    task: Option<AbortHandle>,
    on_complete: Option<CompletionHandler>,
}

/// Turn-level speech session around a [`SpeechSynthesisPort`].
pub struct SpeechOutputSession {
    port: Arc<dyn SpeechSynthesisPort>,
    config: SpeechConfig,
    is_speaking: Arc<AtomicBool>,
    is_paused: Arc<AtomicBool>,
    inner: Arc<Mutex<SpeakInner>>,
}

impl SpeechOutputSession {
    pub fn new(port: Arc<dyn SpeechSynthesisPort>, config: SpeechConfig) -> Self {
        SpeechOutputSession {
            port,
            config,
            is_speaking: Arc::new(AtomicBool::new(false)),
            is_paused: Arc::new(AtomicBool::new(false)),
            inner: Arc::new(Mutex::new(SpeakInner {
                generation: 0,
                task: None,
                on_complete: None,
            })),
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.is_speaking.load(Ordering::Relaxed)
    }

    pub fn is_paused(&self) -> bool {
        self.is_paused.load(Ordering::Relaxed)
    }

    /// Speak a message, firing `on_complete` exactly once after the last
    /// fragment finishes. A message already in progress is cancelled first.
    ///
    /// With `sentence_pause_secs > 0` the text is split on sentence-ending
    /// punctuation, whitespace-only fragments discarded, and each fragment
    /// spoken with a trailing pause on all but the last; otherwise the whole
    /// text goes out as one utterance.
    pub fn speak(&self, text: &str, on_complete: impl FnOnce() + Send + 'static) {
        if self.is_speaking() {
            debug!("speak() while busy - cancelling prior utterance");
            self.stop();
        }

        let text = text.trim();
        if text.is_empty() {
            debug!("Nothing to speak - completing immediately");
            on_complete();
            return;
        }

        let fragments = split_sentences(text, self.config.sentence_pause_secs);
        info!(
            "Speaking message ({} chars, {} fragment{})",
            text.len(),
            fragments.len(),
            if fragments.len() == 1 { "" } else { "s" }
        );

        let generation = {
            let mut guard = self.inner.lock().unwrap();
            guard.generation += 1;
            guard.on_complete = Some(Box::new(on_complete));
            guard.generation
        };

        self.is_speaking.store(true, Ordering::Relaxed);
        self.is_paused.store(false, Ordering::Relaxed);

        let port = self.port.clone();
        let config = self.config.clone();
        let inner = self.inner.clone();
        let is_speaking = self.is_speaking.clone();
        let is_paused = self.is_paused.clone();
        let handle = tokio::spawn(async move {
            let pause = Duration::from_secs_f32(config.sentence_pause_secs.max(0.0));
            let last = fragments.len() - 1;
            for (index, fragment) in fragments.iter().enumerate() {
                let utterance = Utterance {
                    text: fragment.clone(),
                    voice_id: config.voice_id.clone(),
                    rate: config.rate,
                    pitch: config.pitch,
                    post_delay_secs: if index == last {
                        0.0
                    } else {
                        config.sentence_pause_secs
                    },
                };
                match port.speak(utterance).await {
                    Ok(SynthesisOutcome::Finished) => {
                        if index != last {
                            tokio::time::sleep(pause).await;
                        }
                    }
                    Ok(SynthesisOutcome::Cancelled) => {
                        debug!("Utterance cancelled mid-message");
                        break;
                    }
                    Err(e) => {
                        warn!("Synthesis failed on fragment {}: {}", index, e);
                        break;
                    }
                }
            }

            is_speaking.store(false, Ordering::Relaxed);
            is_paused.store(false, Ordering::Relaxed);

            // stop() clears the handler, so a cancelled message completes
            // into a no-op here
            let callback = {
                let mut guard = inner.lock().unwrap();
                if guard.generation != generation {
                    None
                } else {
                    guard.task = None;
                    guard.on_complete.take()
                }
            };
            if let Some(callback) = callback {
                callback();
            }
        })
        .abort_handle();

        let mut guard = self.inner.lock().unwrap();
        if guard.generation == generation {
            if let Some(previous) = guard.task.replace(handle) {
                previous.abort();
            }
        } else {
            handle.abort();
        }
    }

    /// Pause mid-message. No-op unless actually speaking and not paused.
    pub fn pause(&self) {
        if self.is_speaking() && !self.is_paused() {
            info!("Pausing speech");
            self.port.pause();
            self.is_paused.store(true, Ordering::Relaxed);
        }
    }

    /// Resume a paused message. No-op unless actually paused.
    pub fn resume(&self) {
        if self.is_paused() {
            info!("Resuming speech");
            self.port.resume();
            self.is_paused.store(false, Ordering::Relaxed);
        }
    }

    /// Cancel immediately. Clears the pending completion (it will never fire
    /// after an explicit stop) and always returns the output device to its
    /// pre-speech state.
    pub fn stop(&self) {
        let (task, dropped_completion) = {
            let mut guard = self.inner.lock().unwrap();
            guard.generation += 1;
            (guard.task.take(), guard.on_complete.take())
        };
        if let Some(task) = task {
            task.abort();
        }
        if dropped_completion.is_some() {
            debug!("Dropped pending speech completion on stop");
        }
        self.port.cancel();
        self.is_speaking.store(false, Ordering::Relaxed);
        self.is_paused.store(false, Ordering::Relaxed);
    }
}

/// Split a message into sentence-paced fragments.
///
/// With a zero pause the whole message is one fragment. Fragments keep their
/// terminators; whitespace-only pieces are discarded, so "Hi. Bye!" yields
/// two fragments, not three.
fn split_sentences(text: &str, sentence_pause_secs: f32) -> Vec<String> {
    if sentence_pause_secs <= 0.0 {
        return vec![text.to_string()];
    }

    let mut fragments: Vec<String> = Vec::new();
    let mut consumed = 0;
    for found in RE_SENTENCE.find_iter(text) {
        let fragment = found.as_str().trim();
        if !fragment.is_empty() {
            fragments.push(fragment.to_string());
        }
        consumed = found.end();
    }
    // Trailing text without a terminator still gets spoken
    let tail = text[consumed..].trim();
    if !tail.is_empty() {
        fragments.push(tail.to_string());
    }
    if fragments.is_empty() {
        fragments.push(text.trim().to_string());
    }
    fragments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VoiceError;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    /// Synthesis port that records utterances and finishes after a fixed
    /// simulated playback time, or when cancelled
    struct FakeSynthesizer {
        spoken: Mutex<Vec<Utterance>>,
        playback: Duration,
        cancelled: Arc<Notify>,
        pause_count: AtomicUsize,
        resume_count: AtomicUsize,
    }

    impl FakeSynthesizer {
        fn new(playback: Duration) -> Self {
            FakeSynthesizer {
                spoken: Mutex::new(Vec::new()),
                playback,
                cancelled: Arc::new(Notify::new()),
                pause_count: AtomicUsize::new(0),
                resume_count: AtomicUsize::new(0),
            }
        }

        fn texts(&self) -> Vec<String> {
            self.spoken.lock().unwrap().iter().map(|u| u.text.clone()).collect()
        }
    }

    #[async_trait]
    impl SpeechSynthesisPort for FakeSynthesizer {
        async fn speak(&self, utterance: Utterance) -> Result<SynthesisOutcome, VoiceError> {
            self.spoken.lock().unwrap().push(utterance);
            tokio::select! {
                _ = tokio::time::sleep(self.playback) => Ok(SynthesisOutcome::Finished),
                _ = self.cancelled.notified() => Ok(SynthesisOutcome::Cancelled),
            }
        }

        fn pause(&self) {
            self.pause_count.fetch_add(1, Ordering::Relaxed);
        }

        fn resume(&self) {
            self.resume_count.fetch_add(1, Ordering::Relaxed);
        }

        fn cancel(&self) {
            self.cancelled.notify_waiters();
        }
    }

    fn paced_config() -> SpeechConfig {
        SpeechConfig {
            sentence_pause_secs: 0.4,
            ..SpeechConfig::default()
        }
    }

    #[test]
    fn split_counts_sentence_terminators() {
        let fragments = split_sentences("Hi. Bye!", 0.4);
        assert_eq!(fragments, ["Hi.", "Bye!"]);
    }

    #[test]
    fn split_keeps_stacked_terminators_together() {
        let fragments = split_sentences("Really?! Yes.", 0.4);
        assert_eq!(fragments, ["Really?!", "Yes."]);
    }

    #[test]
    fn split_keeps_unterminated_tail() {
        let fragments = split_sentences("First sentence. second without period", 0.4);
        assert_eq!(fragments, ["First sentence.", "second without period"]);
    }

    #[test]
    fn zero_pause_disables_splitting() {
        let fragments = split_sentences("One. Two. Three.", 0.0);
        assert_eq!(fragments, ["One. Two. Three."]);
    }

    #[tokio::test(start_paused = true)]
    async fn completion_fires_once_after_last_fragment() {
        let port = Arc::new(FakeSynthesizer::new(Duration::from_millis(500)));
        let session = SpeechOutputSession::new(port.clone(), paced_config());
        let completions = Arc::new(AtomicUsize::new(0));

        let counter = completions.clone();
        session.speak("You have two events. First is at nine!", move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(port.texts(), ["You have two events.", "First is at nine!"]);
        assert_eq!(completions.load(Ordering::Relaxed), 1);
        assert!(!session.is_speaking());
    }

    #[tokio::test(start_paused = true)]
    async fn inter_sentence_pause_applies_to_all_but_last() {
        let port = Arc::new(FakeSynthesizer::new(Duration::from_millis(100)));
        let session = SpeechOutputSession::new(port.clone(), paced_config());

        session.speak("One. Two. Three.", || {});
        tokio::time::sleep(Duration::from_secs(5)).await;

        let spoken = port.spoken.lock().unwrap();
        assert_eq!(spoken.len(), 3);
        assert!(spoken[0].post_delay_secs > 0.0);
        assert!(spoken[1].post_delay_secs > 0.0);
        assert_eq!(spoken[2].post_delay_secs, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_suppresses_pending_completion() {
        let port = Arc::new(FakeSynthesizer::new(Duration::from_secs(2)));
        let session = SpeechOutputSession::new(port.clone(), paced_config());
        let completions = Arc::new(AtomicUsize::new(0));

        let counter = completions.clone();
        session.speak("A long sentence. And another one.", move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(session.is_speaking());
        session.stop();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(completions.load(Ordering::Relaxed), 0);
        assert!(!session.is_speaking());
        assert!(!session.is_paused());
    }

    #[tokio::test(start_paused = true)]
    async fn speak_while_busy_cancels_prior_message() {
        let port = Arc::new(FakeSynthesizer::new(Duration::from_secs(2)));
        let session = SpeechOutputSession::new(port.clone(), paced_config());
        let first_completions = Arc::new(AtomicUsize::new(0));
        let second_completions = Arc::new(AtomicUsize::new(0));

        let counter = first_completions.clone();
        session.speak("Original message.", move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        tokio::time::sleep(Duration::from_millis(100)).await;

        let counter = second_completions.clone();
        session.speak("Replacement message.", move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(first_completions.load(Ordering::Relaxed), 0);
        assert_eq!(second_completions.load(Ordering::Relaxed), 1);
        let texts = port.texts();
        assert_eq!(texts.last().unwrap(), "Replacement message.");
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume_only_apply_in_valid_states() {
        let port = Arc::new(FakeSynthesizer::new(Duration::from_secs(2)));
        let session = SpeechOutputSession::new(port.clone(), paced_config());

        // Not speaking: both are no-ops, never errors
        session.pause();
        session.resume();
        assert_eq!(port.pause_count.load(Ordering::Relaxed), 0);
        assert_eq!(port.resume_count.load(Ordering::Relaxed), 0);

        session.speak("Something to pause.", || {});
        tokio::time::sleep(Duration::from_millis(100)).await;

        session.pause();
        assert!(session.is_paused());
        // Double pause does not reach the port twice
        session.pause();
        assert_eq!(port.pause_count.load(Ordering::Relaxed), 1);

        session.resume();
        assert!(!session.is_paused());
        session.resume();
        assert_eq!(port.resume_count.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_message_completes_immediately() {
        let port = Arc::new(FakeSynthesizer::new(Duration::from_millis(100)));
        let session = SpeechOutputSession::new(port.clone(), paced_config());
        let completions = Arc::new(AtomicUsize::new(0));

        let counter = completions.clone();
        session.speak("   ", move || {
            counter.fetch_add(1, Ordering::Relaxed);
        });

        assert_eq!(completions.load(Ordering::Relaxed), 1);
        assert!(port.texts().is_empty());
    }
}
