use halal_contracts::i18n::Language;

use crate::oracle::{Oracle, OracleError, OracleRequest};

pub const SERVICE_ERROR_TEXT: &str = "Service error. Please try later.";
pub const EMPTY_REPLY_TEXT: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantMessage {
    pub role: Role,
    pub text: String,
}

impl AssistantMessage {
    fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// What goes to the oracle for one turn. Earlier turns are never resent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantTurn {
    pub text: String,
    pub system_instruction: String,
}

impl AssistantTurn {
    pub fn into_request(self, model: impl Into<String>) -> OracleRequest {
        let mut request = OracleRequest::text(model, self.text);
        request.system_instruction = Some(self.system_instruction);
        request
    }
}

pub fn system_instruction(language: Language) -> String {
    format!(
        "You are a polite expert Islamic nutritional assistant. Current language: {}. \
         Start with Assalamu Alaikum. Provide concise and verified information about Halal, \
         Haram, and E-numbers. Maintain an oriental, respectful tone. Support RU, EN, KY, KK, AR.",
        language.code()
    )
}

#[derive(Debug, Clone)]
pub struct AssistantSession {
    language: Language,
    transcript: Vec<AssistantMessage>,
    awaiting: bool,
}

impl AssistantSession {
    pub fn new(language: Language) -> Self {
        Self {
            language,
            transcript: vec![AssistantMessage::assistant(language.assistant_greeting())],
            awaiting: false,
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn transcript(&self) -> &[AssistantMessage] {
        &self.transcript
    }

    pub fn is_awaiting(&self) -> bool {
        self.awaiting
    }

    pub fn thinking_label(&self) -> &'static str {
        self.language.thinking_label()
    }

    pub fn begin_turn(&mut self, text: &str) -> Option<AssistantTurn> {
        let trimmed = text.trim();
        if trimmed.is_empty() || self.awaiting {
            return None;
        }
        self.transcript.push(AssistantMessage {
            role: Role::User,
            text: trimmed.to_string(),
        });
        self.awaiting = true;
        Some(AssistantTurn {
            text: trimmed.to_string(),
            system_instruction: system_instruction(self.language),
        })
    }

    /// Appends exactly one assistant message and clears the awaiting flag.
    pub fn complete_turn(&mut self, reply: Result<String, OracleError>) -> &AssistantMessage {
        let text = match reply {
            Ok(text) if text.trim().is_empty() => EMPTY_REPLY_TEXT.to_string(),
            Ok(text) => text,
            Err(_) => SERVICE_ERROR_TEXT.to_string(),
        };
        self.awaiting = false;
        self.transcript.push(AssistantMessage::assistant(text));
        &self.transcript[self.transcript.len() - 1]
    }

    /// Returns `None` when the turn was rejected.
    pub fn send(
        &mut self,
        oracle: &dyn Oracle,
        model: &str,
        text: &str,
    ) -> Option<&AssistantMessage> {
        let turn = self.begin_turn(text)?;
        let reply = oracle
            .generate(&turn.into_request(model))
            .map(|reply| reply.text);
        Some(self.complete_turn(reply))
    }

    /// Resets the transcript to the new greeting when the language differs.
    pub fn switch_language(&mut self, language: Language) -> bool {
        if language == self.language {
            return false;
        }
        *self = Self::new(language);
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::oracle::{DryrunOracle, OracleReply};

    struct RecordingOracle {
        reply: Option<String>,
        seen: Mutex<Vec<OracleRequest>>,
    }

    impl RecordingOracle {
        fn new(reply: Option<&str>) -> Self {
            Self {
                reply: reply.map(str::to_string),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl Oracle for RecordingOracle {
        fn name(&self) -> &str {
            "recording"
        }

        fn generate(&self, request: &OracleRequest) -> Result<OracleReply, OracleError> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(request.clone());
            }
            match &self.reply {
                Some(text) => Ok(OracleReply {
                    text: text.clone(),
                    warnings: Vec::new(),
                }),
                None => Err(OracleError::Transport {
                    provider: "recording".to_string(),
                    message: "connection reset".to_string(),
                }),
            }
        }
    }

    #[test]
    fn new_session_starts_with_greeting() {
        let session = AssistantSession::new(Language::Ky);
        assert_eq!(session.transcript().len(), 1);
        assert_eq!(session.transcript()[0].role, Role::Assistant);
        assert_eq!(session.transcript()[0].text, Language::Ky.assistant_greeting());
    }

    #[test]
    fn turn_sends_only_current_message_with_language_instruction() {
        let oracle = RecordingOracle::new(Some("E120 is derived from insects."));
        let mut session = AssistantSession::new(Language::En);
        session.send(&oracle, "gemini-3-flash-preview", "hello");
        session.send(&oracle, "gemini-3-flash-preview", "  Is E120 halal? ");

        let seen = oracle.seen.lock().map(|seen| seen.clone()).unwrap_or_default();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].prompt_text(), "Is E120 halal?");
        assert!(seen[1]
            .system_instruction
            .as_deref()
            .unwrap_or_default()
            .contains("Current language: en"));
        assert!(seen[1].response_schema.is_none());
        assert_eq!(session.transcript().len(), 5);
        assert!(!session.is_awaiting());
    }

    #[test]
    fn failures_and_empty_replies_have_fixed_text() {
        let mut session = AssistantSession::new(Language::Ru);
        let failing = RecordingOracle::new(None);
        let reply = session.send(&failing, "m", "salam").map(|m| m.text.clone());
        assert_eq!(reply.as_deref(), Some(SERVICE_ERROR_TEXT));

        let empty = RecordingOracle::new(Some("  "));
        let reply = session.send(&empty, "m", "again").map(|m| m.text.clone());
        assert_eq!(reply.as_deref(), Some(EMPTY_REPLY_TEXT));
    }

    #[test]
    fn blank_or_overlapping_turns_are_rejected() {
        let mut session = AssistantSession::new(Language::En);
        assert!(session.begin_turn("   ").is_none());
        assert!(session.begin_turn("first").is_some());
        assert!(session.begin_turn("second").is_none());
        assert_eq!(session.transcript().len(), 2);

        session.complete_turn(Ok("answer".to_string()));
        assert!(session.begin_turn("second").is_some());
    }

    #[test]
    fn switching_language_resets_transcript() {
        let mut session = AssistantSession::new(Language::Ru);
        session.send(&DryrunOracle, "dryrun-oracle-1", "hi");
        assert_eq!(session.transcript().len(), 3);

        assert!(!session.switch_language(Language::Ru));
        assert_eq!(session.transcript().len(), 3);

        assert!(session.switch_language(Language::Ar));
        assert_eq!(
            session.transcript(),
            &[AssistantMessage {
                role: Role::Assistant,
                text: Language::Ar.assistant_greeting().to_string(),
            }]
        );
        assert_eq!(session.thinking_label(), "Thinking...");
    }
}
