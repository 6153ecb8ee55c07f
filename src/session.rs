//! Chat transcript and per-message orchestration.
//!
//! A [`ChatSession`] is what the interactive surface drives: every submitted
//! message passes the safety gate first, then goes to the responder in the
//! session's current mode. Failures become visible transcript entries so the
//! session stays usable.

use std::fmt;
use std::str::FromStr;

use crate::models::ChatMessage;
use crate::responder::{AdvisorContext, Mode, Responder};
use crate::safety;

/// Which responder mode new messages are routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModeKind {
    #[default]
    Tutor,
    Advisor,
}

impl ModeKind {
    pub fn label(&self) -> &'static str {
        match self {
            ModeKind::Tutor => "tutor",
            ModeKind::Advisor => "advisor",
        }
    }
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ModeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tutor" => Ok(ModeKind::Tutor),
            "advisor" => Ok(ModeKind::Advisor),
            other => Err(format!("unknown mode '{}', expected tutor or advisor", other)),
        }
    }
}

#[derive(Debug, Default)]
pub struct ChatSession {
    transcript: Vec<ChatMessage>,
    mode: ModeKind,
}

impl ChatSession {
    pub fn new(mode: ModeKind) -> Self {
        Self {
            transcript: Vec::new(),
            mode,
        }
    }

    pub fn mode(&self) -> ModeKind {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ModeKind) {
        self.mode = mode;
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn clear(&mut self) {
        self.transcript.clear();
    }

    /// Record `input`, answer it and return the assistant's reply.
    ///
    /// `advisor` is only consulted in advisor mode.
    pub async fn submit(
        &mut self,
        responder: &Responder,
        input: &str,
        advisor: &AdvisorContext,
    ) -> &ChatMessage {
        self.transcript.push(ChatMessage::user(input));

        let reply = match safety::check(input) {
            Some(message) => {
                tracing::info!("safety referral triggered");
                message.to_string()
            }
            None => {
                let mode = match self.mode {
                    ModeKind::Tutor => Mode::Tutor,
                    ModeKind::Advisor => Mode::Advisor(advisor.clone()),
                };
                match responder.answer(&mode, input).await {
                    Ok(answer) => answer,
                    Err(e) => {
                        tracing::warn!(mode = %self.mode, error = %e, "request failed");
                        format!("Error: {}", e)
                    }
                }
            }
        };

        self.transcript.push(ChatMessage::assistant(reply));
        &self.transcript[self.transcript.len() - 1]
    }
}
