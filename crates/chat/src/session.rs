use std::sync::Arc;

use aura_llm::{
    DEFAULT_GEMINI_MODEL, LlmProvider, Part, ProviderMessage, ProviderResult,
    ProviderStreamHandle, StreamRequest, StreamTarget, create_provider,
};
use snafu::ResultExt;

use crate::config::AppConfig;
use crate::error::{ChatResult, CreateProviderSnafu};

pub const DEFAULT_TEMPERATURE: f64 = 0.8;
pub const DEFAULT_TOP_P: f64 = 0.9;

pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are AURA AI, a highly intelligent, \
emotionally aware and context-sensitive assistant. Help the user with general questions, design \
and technical problems, and with files they upload (PDFs, spreadsheets, slides, images): \
summarize them, extract from them and reason about them. Keep continuity with earlier messages. \
Be warm, supportive and a little playful, detailed without sounding robotic, and match the \
user's tone. Do not add disclaimers or generic \"I'm an AI\" lines unless asked.";

/// Fixed per-session request settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub model_id: String,
    pub system_instruction: String,
    pub temperature: f64,
    pub top_p: f64,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_GEMINI_MODEL.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
        }
    }
}

/// The one remote conversation of a running app.
///
/// Owns the provider and the committed history. Every request resends the full
/// history followed by the new user turn.
pub struct ChatSession {
    provider: Arc<dyn LlmProvider>,
    options: SessionOptions,
    history: Vec<ProviderMessage>,
}

impl ChatSession {
    pub fn create(provider: Arc<dyn LlmProvider>, options: SessionOptions) -> Self {
        tracing::info!(
            provider = provider.id(),
            model = %options.model_id,
            "chat session created"
        );
        Self {
            provider,
            options,
            history: Vec::new(),
        }
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn provider_id(&self) -> &str {
        self.provider.id()
    }

    pub fn history(&self) -> &[ProviderMessage] {
        &self.history
    }

    /// Starts streaming the reply to `parts`. History is left untouched until
    /// [`ChatSession::commit_turn`].
    pub fn send_stream(
        &self,
        target: StreamTarget,
        parts: &[Part],
    ) -> ProviderResult<ProviderStreamHandle> {
        let mut messages = self.history.clone();
        messages.push(ProviderMessage::user(parts.to_vec()));

        let request = StreamRequest::new(target, self.options.model_id.clone(), messages)
            .with_system_instruction(self.options.system_instruction.clone())
            .with_temperature(self.options.temperature)
            .with_top_p(self.options.top_p);

        tracing::debug!(
            target = ?target,
            history_len = self.history.len(),
            part_count = parts.len(),
            "sending chat turn"
        );
        self.provider.stream_chat(request)
    }

    /// Records a completed exchange so later turns carry it as context.
    ///
    /// An empty reply (a blocked or finish-only response) drops the whole
    /// exchange; the remote rejects model turns without text. Returns whether
    /// the exchange was kept.
    pub fn commit_turn(&mut self, parts: Vec<Part>, reply: impl Into<String>) -> bool {
        let reply = reply.into();
        if reply.trim().is_empty() {
            tracing::warn!(
                history_len = self.history.len(),
                "empty reply left out of session history"
            );
            return false;
        }

        self.history.push(ProviderMessage::user(parts));
        self.history.push(ProviderMessage::assistant(reply));
        true
    }
}

/// Builds the session once at startup from the loaded configuration.
pub fn start_session(config: &AppConfig) -> ChatResult<ChatSession> {
    let provider_config = config.provider_config()?;
    let provider = create_provider(provider_config).context(CreateProviderSnafu {
        stage: "start-session",
    })?;

    Ok(ChatSession::create(provider, config.session_options()))
}
