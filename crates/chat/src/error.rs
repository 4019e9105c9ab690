use aura_llm::ProviderError;
use snafu::Snafu;

use crate::attachment::AttachmentError;

pub type ChatResult<T> = Result<T, ChatError>;

/// Coarse error classes that decide how a failure is recovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Fatal for the whole app; reported once, never retried.
    Initialization,
    /// Recovered locally by annotating the in-flight reply.
    Send,
    /// Attachment read failure; same recovery as `Send`.
    Io,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ChatError {
    #[snafu(display("API_KEY environment variable not set."))]
    MissingCredential { stage: &'static str },
    #[snafu(display("failed to load configuration: {source}"))]
    Config {
        stage: &'static str,
        #[snafu(source(from(figment::Error, Box::new)))]
        source: Box<figment::Error>,
    },
    #[snafu(display("failed to create chat session: {source}"))]
    CreateProvider {
        stage: &'static str,
        source: ProviderError,
    },
    #[snafu(display("Chat session not initialized."))]
    NoSession { stage: &'static str },
    #[snafu(display("{source}"))]
    Attachment {
        stage: &'static str,
        source: AttachmentError,
    },
    #[snafu(display("{source}"))]
    Send {
        stage: &'static str,
        source: ProviderError,
    },
    #[snafu(display("{message}"))]
    Stream {
        stage: &'static str,
        message: String,
    },
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingCredential { .. } | Self::Config { .. } | Self::CreateProvider { .. } => {
                ErrorKind::Initialization
            }
            Self::Attachment { .. } => ErrorKind::Io,
            Self::NoSession { .. } | Self::Send { .. } | Self::Stream { .. } => ErrorKind::Send,
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::MissingCredential { stage }
            | Self::Config { stage, .. }
            | Self::CreateProvider { stage, .. }
            | Self::NoSession { stage }
            | Self::Attachment { stage, .. }
            | Self::Send { stage, .. }
            | Self::Stream { stage, .. } => *stage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_recovery_policy() {
        assert_eq!(
            ChatError::MissingCredential { stage: "test" }.kind(),
            ErrorKind::Initialization
        );
        assert_eq!(
            ChatError::NoSession { stage: "test" }.kind(),
            ErrorKind::Send
        );
        assert_eq!(
            ChatError::Stream {
                stage: "test",
                message: "reset by peer".to_string(),
            }
            .kind(),
            ErrorKind::Send
        );
    }

    #[test]
    fn messages_are_user_facing() {
        assert_eq!(
            ChatError::MissingCredential { stage: "test" }.to_string(),
            "API_KEY environment variable not set."
        );
        assert_eq!(
            ChatError::NoSession { stage: "send" }.to_string(),
            "Chat session not initialized."
        );
        assert_eq!(ChatError::NoSession { stage: "send" }.stage(), "send");
    }
}
