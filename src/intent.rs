// Intent processor interface
//
// The orchestrator hands a finalized transcript, the running conversation
// history and the current calendar window to an external processor (an LLM
// backend, a rule engine) and gets back a structured assistant response.
// This module owns the shapes of that exchange, not the processing itself.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::calendar::CalendarEvent;
use crate::error::VoiceError;

/// Who said what, for conversation context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConversationRole {
    User,
    Assistant,
}

/// One entry of the bounded in-memory conversation history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: ConversationRole,
    pub content: String,
    pub timestamp: DateTime<Local>,
}

/// A structured calendar mutation the processor wants executed.
///
/// The orchestrator never executes these itself; it either forwards them to
/// the embedding application or parks them behind the confirmation gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CalendarCommand {
    Create {
        title: String,
        start: DateTime<Local>,
        end: DateTime<Local>,
        location: Option<String>,
    },
    Delete {
        event_id: String,
        title: String,
    },
    Search {
        query: String,
    },
}

/// Everything the processor needs for one turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentRequest {
    pub transcript: String,
    pub history: Vec<ConversationTurn>,
    pub events: Vec<CalendarEvent>,
    /// Command under construction from an earlier needs-more-info turn
    pub partial_command: Option<CalendarCommand>,
}

/// The processor's answer for one turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantResponse {
    /// Natural-language message to speak
    pub message: String,
    /// Structured command, if the transcript resolved to one
    pub command: Option<CalendarCommand>,
    /// Gate the command behind explicit user confirmation
    pub requires_confirmation: bool,
    /// Message to speak while waiting for confirmation, if different
    pub confirmation_message: Option<String>,
    /// Events the processor wants surfaced alongside the message
    pub event_results: Vec<CalendarEvent>,
    /// Reopen the microphone after speaking
    pub should_continue_listening: bool,
    /// The command is incomplete; keep `partial_command` for the next turn
    pub needs_more_info: bool,
    pub partial_command: Option<CalendarCommand>,
}

impl AssistantResponse {
    /// A plain spoken reply with no command attached
    pub fn message_only(message: impl Into<String>) -> Self {
        AssistantResponse {
            message: message.into(),
            command: None,
            requires_confirmation: false,
            confirmation_message: None,
            event_results: Vec::new(),
            should_continue_listening: false,
            needs_more_info: false,
            partial_command: None,
        }
    }
}

/// External intent-processing capability (LLM backend, rule engine, ...)
#[async_trait]
pub trait IntentProcessor: Send + Sync {
    async fn process(&self, request: IntentRequest) -> Result<AssistantResponse, VoiceError>;
}
