//! Turn orchestrator
//!
//! Sequences one full conversational turn: capture a transcript, hand it to
//! the intent processor with conversation context, optionally gate the
//! resulting command behind explicit confirmation, speak the response, and
//! when the response asks to keep listening, reopen the microphone after a
//! short debounce so the tail of the assistant's own speech is never
//! captured.
//!
//! The orchestrator owns the turn for its lifetime and is the only caller of
//! the capture session's restart path; the session never restarts itself.

use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::AbortHandle;

use crate::calendar::{CalendarEventSupplier, TimeRange};
use crate::capture::{CaptureHandlers, CaptureSession};
use crate::config::EngineConfig;
use crate::error::VoiceError;
use crate::intent::{
    AssistantResponse, CalendarCommand, ConversationRole, ConversationTurn, IntentProcessor,
    IntentRequest,
};
use crate::speech::SpeechOutputSession;

/// One complete listen-transcribe-respond-speak cycle
#[derive(Debug, Clone, serde::Serialize)]
pub struct Turn {
    pub transcript: String,
    pub is_final: bool,
    pub started_at: DateTime<Local>,
}

/// A command parked behind the confirmation gate
#[derive(Debug, Clone)]
pub struct PendingConfirmation {
    pub command: CalendarCommand,
    pub message: String,
}

struct OrchestratorInner {
    history: Vec<ConversationTurn>,
    active_turn: Option<Turn>,
    pending_restart: Option<AbortHandle>,
    pending_confirmation: Option<PendingConfirmation>,
    partial_command: Option<CalendarCommand>,
}

/// Coordinates the capture session, intent processor and speech session for
/// one conversational surface. All collaborators are injected; the
/// orchestrator holds no globals.
pub struct TurnOrchestrator {
    capture: Arc<CaptureSession>,
    speech: Arc<SpeechOutputSession>,
    processor: Arc<dyn IntentProcessor>,
    supplier: Arc<dyn CalendarEventSupplier>,
    config: EngineConfig,
    /// Receives commands once cleared for execution; the orchestrator never
    /// mutates calendar state itself
    on_command: Arc<dyn Fn(CalendarCommand) + Send + Sync>,
    inner: Arc<Mutex<OrchestratorInner>>,
    /// Handed to session callbacks so they never keep the orchestrator alive
    weak_self: Weak<TurnOrchestrator>,
}

impl TurnOrchestrator {
    pub fn new(
        capture: Arc<CaptureSession>,
        speech: Arc<SpeechOutputSession>,
        processor: Arc<dyn IntentProcessor>,
        supplier: Arc<dyn CalendarEventSupplier>,
        config: EngineConfig,
        on_command: impl Fn(CalendarCommand) + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| TurnOrchestrator {
            capture,
            speech,
            processor,
            supplier,
            config,
            on_command: Arc::new(on_command),
            inner: Arc::new(Mutex::new(OrchestratorInner {
                history: Vec::new(),
                active_turn: None,
                pending_restart: None,
                pending_confirmation: None,
                partial_command: None,
            })),
            weak_self: weak.clone(),
        })
    }

    /// Start listening for one turn. In continuous mode the microphone
    /// reopens after each spoken response until `stop()`.
    pub async fn begin_turn(&self, continuous: bool) -> Result<(), VoiceError> {
        info!("Beginning conversational turn (continuous={})", continuous);
        {
            let mut guard = self.inner.lock().unwrap();
            guard.active_turn = Some(Turn {
                transcript: String::new(),
                is_final: false,
                started_at: Local::now(),
            });
        }

        self.capture.start(continuous, self.capture_handlers()).await
    }

    /// Handlers wiring capture callbacks back into the orchestrator. Built
    /// fresh for every capture start so a session that dropped its retained
    /// handlers at finalization can always be reopened.
    fn capture_handlers(&self) -> CaptureHandlers {
        let partial_self = self.weak_self.clone();
        let final_self = self.weak_self.clone();
        CaptureHandlers::new(
            move |partial| {
                if let Some(orchestrator) = partial_self.upgrade() {
                    let mut guard = orchestrator.inner.lock().unwrap();
                    if let Some(turn) = guard.active_turn.as_mut() {
                        turn.transcript = partial;
                    }
                }
            },
            move |transcript| {
                if let Some(orchestrator) = final_self.upgrade() {
                    tokio::spawn(async move {
                        orchestrator.handle_transcript(transcript).await;
                    });
                }
            },
        )
    }

    /// Current turn snapshot, if one is in flight
    pub fn current_turn(&self) -> Option<Turn> {
        self.inner.lock().unwrap().active_turn.clone()
    }

    /// Message awaiting explicit confirmation, if any
    pub fn pending_confirmation_message(&self) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .pending_confirmation
            .as_ref()
            .map(|p| p.message.clone())
    }

    /// Resolve the confirmation gate. Accepting forwards the parked command;
    /// declining drops it. No-op when nothing is pending.
    pub fn resolve_confirmation(&self, accepted: bool) {
        let pending = self.inner.lock().unwrap().pending_confirmation.take();
        match pending {
            Some(pending) if accepted => {
                info!("Confirmation accepted - forwarding command");
                (self.on_command)(pending.command);
            }
            Some(_) => info!("Confirmation declined - command dropped"),
            None => debug!("resolve_confirmation with nothing pending"),
        }
    }

    /// Stop whichever of capture/speech is active and clear any pending
    /// restart, so a completed speak can no longer reopen the microphone.
    pub fn stop(&self) {
        info!("Stopping orchestrator");
        {
            let mut guard = self.inner.lock().unwrap();
            if let Some(restart) = guard.pending_restart.take() {
                restart.abort();
            }
            guard.pending_confirmation = None;
            guard.active_turn = None;
        }
        // Capture stop also clears the continuous flag
        self.capture.stop();
        self.speech.stop();
    }

    pub fn history(&self) -> Vec<ConversationTurn> {
        self.inner.lock().unwrap().history.clone()
    }

    async fn handle_transcript(self: Arc<Self>, transcript: String) {
        info!("Turn transcript finalized ({} chars)", transcript.len());

        let now = Local::now();
        let range = TimeRange::new(now, now + chrono::Duration::days(self.config.context_window_days));
        let events = match self.supplier.events_between(&range).await {
            Ok(events) => events,
            Err(e) => {
                warn!("Calendar supplier failed, continuing without events: {}", e);
                Vec::new()
            }
        };

        let (history, partial_command) = {
            let mut guard = self.inner.lock().unwrap();
            if let Some(turn) = guard.active_turn.as_mut() {
                turn.transcript = transcript.clone();
                turn.is_final = true;
            }
            push_bounded(
                &mut guard.history,
                ConversationRole::User,
                &transcript,
                self.config.max_history_turns,
            );
            (guard.history.clone(), guard.partial_command.take())
        };

        let request = IntentRequest {
            transcript,
            history,
            events,
            partial_command,
        };
        let response = match self.processor.process(request).await {
            Ok(response) => response,
            Err(e) => {
                // A failed turn produces no speech; the surface simply
                // returns to listening-ready state
                error!("Intent processing failed: {}", e);
                self.inner.lock().unwrap().active_turn = None;
                return;
            }
        };
        self.deliver(response);
    }

    fn deliver(&self, response: AssistantResponse) {
        let (message, cleared_command) = {
            let mut guard = self.inner.lock().unwrap();
            push_bounded(
                &mut guard.history,
                ConversationRole::Assistant,
                &response.message,
                self.config.max_history_turns,
            );
            if response.needs_more_info {
                guard.partial_command = response.partial_command.clone();
            }

            match (&response.command, response.requires_confirmation) {
                (Some(command), true) => {
                    let message = response
                        .confirmation_message
                        .clone()
                        .unwrap_or_else(|| response.message.clone());
                    info!("Command requires confirmation - parking it");
                    guard.pending_confirmation = Some(PendingConfirmation {
                        command: command.clone(),
                        message: message.clone(),
                    });
                    (message, None)
                }
                (Some(command), false) => (response.message.clone(), Some(command.clone())),
                (None, _) => (response.message.clone(), None),
            }
        };
        if let Some(command) = cleared_command {
            (self.on_command)(command);
        }

        let should_continue = response.should_continue_listening;
        let weak = self.weak_self.clone();
        self.speech.speak(&message, move || {
            let Some(orchestrator) = weak.upgrade() else {
                return;
            };
            if should_continue {
                orchestrator.schedule_recapture();
            } else {
                debug!("Turn complete");
                orchestrator.inner.lock().unwrap().active_turn = None;
            }
        });
    }

    /// Reopen the microphone after the debounce, unless a capture became
    /// active in the meantime or `stop()` cleared the restart.
    fn schedule_recapture(&self) {
        if self.capture.is_active() {
            debug!("Capture already active - skipping scheduled restart");
            return;
        }
        let debounce = Duration::from_millis(self.config.restart_debounce_ms);
        let weak = self.weak_self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let Some(orchestrator) = weak.upgrade() else {
                return;
            };
            orchestrator.inner.lock().unwrap().pending_restart = None;
            if orchestrator.capture.is_active() {
                return;
            }
            {
                let mut guard = orchestrator.inner.lock().unwrap();
                guard.active_turn = Some(Turn {
                    transcript: String::new(),
                    is_final: false,
                    started_at: Local::now(),
                });
            }
            info!("Reopening capture for follow-up");
            // A continuous-mode session retained its handlers through
            // finalization; a single-turn session dropped them, so it gets
            // fresh ones
            let result = if orchestrator.capture.continuous_mode_enabled() {
                orchestrator.capture.restart().await
            } else {
                orchestrator
                    .capture
                    .start(false, orchestrator.capture_handlers())
                    .await
            };
            if let Err(e) = result {
                warn!("Follow-up capture restart failed: {}", e);
                orchestrator.inner.lock().unwrap().active_turn = None;
            }
        })
        .abort_handle();

        let mut guard = self.inner.lock().unwrap();
        if let Some(previous) = guard.pending_restart.replace(handle) {
            previous.abort();
        }
    }
}

fn push_bounded(
    history: &mut Vec<ConversationTurn>,
    role: ConversationRole,
    content: &str,
    max_turns: usize,
) {
    history.push(ConversationTurn {
        role,
        content: content.to_string(),
        timestamp: Local::now(),
    });
    if history.len() > max_turns {
        let excess = history.len() - max_turns;
        history.drain(..excess);
    }
}
