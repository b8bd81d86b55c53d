//! Capture session
//!
//! Turn-level state machine around the transcription port. One session turns
//! raw microphone audio into exactly one finalized transcript per turn, with
//! live partial updates, and stays safe under restart/cancel/error pressure.
//!
//! Architecture:
//! 1. `start` opens a streaming recognition job on the port
//! 2. Each non-empty partial replaces the transcript buffer and re-arms the
//!    single-shot silence timer
//! 3. Finalization has three racing triggers (backend final, recoverable
//!    backend error, silence timer); an idempotency guard lets exactly one win
//! 4. In continuous mode the engine stops after finalization but the handlers
//!    survive, so the orchestrator can restart without re-supplying them

use log::{debug, info, warn};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::config::{EngineConfig, RecoveryAction};
use crate::error::VoiceError;
use crate::transcription::{AudioTranscriptionPort, TranscriptionEvent};

/// Capture session state machine.
///
/// Transitions are explicit and logged; exactly one live capture exists at a
/// time, and starting a new one while `Listening` runs stop-then-restart so
/// two audio taps can never coexist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum CaptureState {
    /// No capture in progress
    Idle,
    /// Waiting on the port to grant permission and open the stream
    RequestingPermission,
    /// Stream open, partials arriving
    Listening,
    /// A finalization trigger won; committing the transcript
    Finalizing,
    /// Turn complete (or stopped); engine resources released
    Stopped,
}

/// Callbacks for one turn. Cloned into the session so continuous mode can
/// reuse them across restarts without the caller re-supplying them.
#[derive(Clone)]
pub struct CaptureHandlers {
    pub on_partial: Arc<dyn Fn(String) + Send + Sync>,
    pub on_final: Arc<dyn Fn(String) + Send + Sync>,
    /// Fired once per turn on the empty-to-non-empty transcript transition,
    /// e.g. to suppress a prompt announcement
    pub on_speech_detected: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl CaptureHandlers {
    pub fn new(
        on_partial: impl Fn(String) + Send + Sync + 'static,
        on_final: impl Fn(String) + Send + Sync + 'static,
    ) -> Self {
        CaptureHandlers {
            on_partial: Arc::new(on_partial),
            on_final: Arc::new(on_final),
            on_speech_detected: None,
        }
    }

    pub fn with_speech_detected(mut self, handler: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_speech_detected = Some(Arc::new(handler));
        self
    }
}

/// Session state behind one mutex; every transition funnels through here.
/// The generation counter invalidates timer and event-loop callbacks that
/// outlive a restart.
struct Inner {
    state: CaptureState,
    /// Live partial for the in-flight turn; cleared immediately on stop
    partial: String,
    /// Best transcript accumulated so far; survives an explicit stop briefly
    /// so a late cancellation error can still recover it
    latest: String,
    /// Idempotency guard: set by whichever finalization trigger wins
    has_processed: bool,
    continuous: bool,
    handlers: Option<CaptureHandlers>,
    silence_timer: Option<AbortHandle>,
    generation: u64,
}

/// Turn-level capture session around an [`AudioTranscriptionPort`].
pub struct CaptureSession {
    port: Arc<dyn AudioTranscriptionPort>,
    config: EngineConfig,
    inner: Arc<Mutex<Inner>>,
}

impl CaptureSession {
    pub fn new(port: Arc<dyn AudioTranscriptionPort>, config: EngineConfig) -> Self {
        CaptureSession {
            port,
            config,
            inner: Arc::new(Mutex::new(Inner {
                state: CaptureState::Idle,
                partial: String::new(),
                latest: String::new(),
                has_processed: false,
                continuous: false,
                handlers: None,
                silence_timer: None,
                generation: 0,
            })),
        }
    }

    pub fn state(&self) -> CaptureState {
        self.inner.lock().unwrap().state
    }

    /// Whether a capture is currently live (stream open or being opened)
    pub fn is_active(&self) -> bool {
        matches!(
            self.state(),
            CaptureState::RequestingPermission | CaptureState::Listening | CaptureState::Finalizing
        )
    }

    pub fn continuous_mode_enabled(&self) -> bool {
        self.inner.lock().unwrap().continuous
    }

    /// Latest partial transcript for the in-flight turn
    pub fn current_partial(&self) -> String {
        self.inner.lock().unwrap().partial.clone()
    }

    /// Start a capture turn.
    ///
    /// If a capture is already live, the old one is fully stopped (tap
    /// removed, stream cancelled) and a short grace period elapses before the
    /// new one starts. Fails with `PermissionDenied` or `EngineUnavailable`
    /// from the port; no transcript is produced in either case.
    pub async fn start(
        &self,
        continuous: bool,
        handlers: CaptureHandlers,
    ) -> Result<(), VoiceError> {
        if self.is_active() {
            info!("Capture already live - stopping before restart");
            self.stop();
            tokio::time::sleep(Duration::from_millis(self.config.restart_grace_ms)).await;
        }

        {
            let mut guard = self.inner.lock().unwrap();
            guard.handlers = Some(handlers);
            guard.continuous = continuous;
        }

        self.begin().await
    }

    /// Restart capture reusing the handlers and continuous flag from the
    /// previous `start`. This is the continuous-mode path: the session never
    /// restarts itself after finalization; the orchestrator calls this once
    /// it has processed the response.
    pub async fn restart(&self) -> Result<(), VoiceError> {
        if self.inner.lock().unwrap().handlers.is_none() {
            return Err(VoiceError::Internal(
                "no capture handlers installed - call start first".to_string(),
            ));
        }
        info!("Restarting capture with retained handlers");
        self.begin().await
    }

    async fn begin(&self) -> Result<(), VoiceError> {
        let generation = {
            let mut guard = self.inner.lock().unwrap();
            guard.generation += 1;
            guard.has_processed = false;
            guard.partial.clear();
            guard.latest.clear();
            if let Some(timer) = guard.silence_timer.take() {
                timer.abort();
            }
            guard.state = CaptureState::RequestingPermission;
            guard.generation
        };
        info!("Capture state: -> RequestingPermission");

        let events = match self.port.start(&self.config.locale).await {
            Ok(events) => events,
            Err(e) => {
                warn!("Capture start failed: {}", e);
                let mut guard = self.inner.lock().unwrap();
                if guard.generation == generation {
                    guard.state = CaptureState::Idle;
                }
                return Err(e);
            }
        };

        {
            let mut guard = self.inner.lock().unwrap();
            if guard.generation != generation {
                // A newer start superseded us while the port was opening
                return Ok(());
            }
            guard.state = CaptureState::Listening;
        }
        info!("Capture state: RequestingPermission -> Listening");

        let inner = self.inner.clone();
        let port = self.port.clone();
        let config = self.config.clone();
        tokio::spawn(run_capture_events(inner, port, config, events, generation));
        Ok(())
    }

    /// Stop the capture immediately.
    ///
    /// Tears down the stream, cancels the silence timer and clears the live
    /// partial right away. The latest-transcript buffer survives for a short
    /// grace period: the port teardown surfaces a cancellation-class error on
    /// the stream, and the recovery path can still turn that buffer into one
    /// final delivery.
    pub fn stop(&self) {
        info!("Stopping capture session");
        let generation = {
            let mut guard = self.inner.lock().unwrap();
            if let Some(timer) = guard.silence_timer.take() {
                timer.abort();
            }
            guard.partial.clear();
            guard.continuous = false;
            guard.state = CaptureState::Stopped;
            guard.generation
        };
        self.port.cancel();

        let inner = self.inner.clone();
        let grace = Duration::from_millis(self.config.stop_grace_ms);
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let mut guard = inner.lock().unwrap();
            if guard.generation == generation && !guard.has_processed {
                debug!("Stop grace elapsed - clearing transcript buffer");
                guard.latest.clear();
                guard.handlers = None;
                guard.has_processed = true;
            }
        });
    }
}

/// Drain recognition events for one turn. Exits after the first terminal
/// event; a generation mismatch means a newer session owns the state.
async fn run_capture_events(
    inner: Arc<Mutex<Inner>>,
    port: Arc<dyn AudioTranscriptionPort>,
    config: EngineConfig,
    mut events: mpsc::Receiver<TranscriptionEvent>,
    generation: u64,
) {
    while let Some(event) = events.recv().await {
        if inner.lock().unwrap().generation != generation {
            break;
        }
        match event {
            TranscriptionEvent::Partial { text } => {
                handle_partial(&inner, &port, &config, generation, text);
            }
            TranscriptionEvent::Final { text } => {
                debug!("Backend reported final result");
                finalize(&inner, &port, generation, Some(text));
                break;
            }
            TranscriptionEvent::Error { kind } => {
                match config.recovery.classify(&kind) {
                    RecoveryAction::FinalizeNow => {
                        info!(
                            "Recoverable backend error ({:?}) - finalizing with best transcript",
                            kind
                        );
                        finalize(&inner, &port, generation, None);
                    }
                    RecoveryAction::FinalizeAfterDelay => {
                        warn!(
                            "Backend error ({:?}) - retrying best-effort finalize after {}ms",
                            kind, config.error_retry_delay_ms
                        );
                        tokio::time::sleep(Duration::from_millis(config.error_retry_delay_ms))
                            .await;
                        finalize(&inner, &port, generation, None);
                    }
                    RecoveryAction::Drop => {
                        warn!("Backend error ({:?}) - dropping turn", kind);
                        abandon(&inner, &port, generation);
                    }
                }
                break;
            }
        }
    }
}

/// Last-write-wins partial handling plus silence-timer re-arm. Callbacks are
/// invoked outside the state lock.
fn handle_partial(
    inner: &Arc<Mutex<Inner>>,
    port: &Arc<dyn AudioTranscriptionPort>,
    config: &EngineConfig,
    generation: u64,
    text: String,
) {
    let (on_partial, on_speech_detected) = {
        let mut guard = inner.lock().unwrap();
        if guard.generation != generation || guard.has_processed {
            return;
        }
        // An empty partial never supersedes accumulated text
        if text.trim().is_empty() && !guard.latest.trim().is_empty() {
            return;
        }
        let had_text = !guard.latest.trim().is_empty();
        guard.partial = text.clone();
        guard.latest = text.clone();
        let Some(handlers) = guard.handlers.clone() else {
            return;
        };
        let speech_started = !had_text && !text.trim().is_empty();
        (
            handlers.on_partial,
            if speech_started {
                handlers.on_speech_detected
            } else {
                None
            },
        )
    };

    if let Some(callback) = on_speech_detected {
        debug!("Speech detected");
        callback();
    }
    on_partial(text.clone());

    if !text.trim().is_empty() {
        arm_silence_timer(inner, port, config, generation);
    }
}

/// Arm the single-shot silence timer, cancelling any prior one. At most one
/// timer is alive per session; the generation check keeps a stale timer from
/// finalizing a newer turn.
fn arm_silence_timer(
    inner: &Arc<Mutex<Inner>>,
    port: &Arc<dyn AudioTranscriptionPort>,
    config: &EngineConfig,
    generation: u64,
) {
    let threshold = Duration::from_millis(config.silence_threshold_ms);
    let timer_inner = inner.clone();
    let timer_port = port.clone();
    let handle = tokio::spawn(async move {
        tokio::time::sleep(threshold).await;
        let has_text = {
            let guard = timer_inner.lock().unwrap();
            guard.generation == generation
                && !guard.has_processed
                && !guard.latest.trim().is_empty()
        };
        if has_text {
            debug!("Silence window elapsed - finalizing turn");
            finalize(&timer_inner, &timer_port, generation, None);
        }
    })
    .abort_handle();

    let mut guard = inner.lock().unwrap();
    if guard.generation != generation || guard.has_processed {
        handle.abort();
        return;
    }
    if let Some(previous) = guard.silence_timer.replace(handle) {
        previous.abort();
    }
}

/// Commit exactly one transcript for the turn. Whichever trigger gets here
/// first wins; everyone else sees `has_processed` and returns. An empty
/// transcript ends the turn without invoking `on_final`.
fn finalize(
    inner: &Arc<Mutex<Inner>>,
    port: &Arc<dyn AudioTranscriptionPort>,
    generation: u64,
    backend_text: Option<String>,
) {
    let (on_final, transcript, continuous) = {
        let mut guard = inner.lock().unwrap();
        if guard.generation != generation || guard.has_processed {
            return;
        }
        guard.has_processed = true;
        guard.state = CaptureState::Finalizing;
        debug!("Capture state: Listening -> Finalizing");
        if let Some(timer) = guard.silence_timer.take() {
            timer.abort();
        }
        let transcript = backend_text
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| guard.latest.clone())
            .trim()
            .to_string();
        guard.partial.clear();
        guard.latest.clear();
        let continuous = guard.continuous;
        let on_final = guard.handlers.as_ref().map(|h| h.on_final.clone());
        if !continuous {
            guard.handlers = None;
        }
        guard.state = CaptureState::Stopped;
        (on_final, transcript, continuous)
    };
    info!("Capture state: Finalizing -> Stopped (continuous={})", continuous);

    // Release engine resources; in continuous mode the orchestrator decides
    // when to restart, never the session itself
    port.cancel();

    if transcript.is_empty() {
        debug!("Turn finalized with empty transcript - no delivery");
        return;
    }
    info!("Turn finalized: '{}'", transcript);
    if let Some(callback) = on_final {
        callback(transcript);
    }
}

/// End the turn without any delivery (unrecoverable backend error)
fn abandon(inner: &Arc<Mutex<Inner>>, port: &Arc<dyn AudioTranscriptionPort>, generation: u64) {
    {
        let mut guard = inner.lock().unwrap();
        if guard.generation != generation || guard.has_processed {
            return;
        }
        guard.has_processed = true;
        if let Some(timer) = guard.silence_timer.take() {
            timer.abort();
        }
        guard.partial.clear();
        guard.latest.clear();
        if !guard.continuous {
            guard.handlers = None;
        }
        guard.state = CaptureState::Stopped;
    }
    info!("Capture state: -> Stopped (turn dropped)");
    port.cancel();
}
