//! Headless core of the AURA AI chat client: transcript, turn lifecycle,
//! attachments, markdown rendering and configuration.

pub mod attachment;
pub mod composer;
pub mod config;
pub mod controller;
pub mod error;
pub mod markdown;
pub mod message;
pub mod presenter;
pub mod session;
pub mod store;

pub use attachment::{
    ALLOWED_EXTENSIONS, Attachment, AttachmentError, format_size, is_allowed_extension,
};
pub use composer::{COMPOSER_PLACEHOLDER, InputComposer, KeyAction, Submission, key_action};
pub use config::{AppConfig, DEFAULT_GREETING};
pub use controller::{ChatController, PendingTurn, SendOutcome};
pub use error::{ChatError, ChatResult, ErrorKind};
pub use markdown::render_markdown;
pub use message::{
    AttachmentMeta, Message, MessageId, MessageStatus, Sender, TurnRejection, TurnState,
    TurnTransition,
};
pub use presenter::{MessageRow, TranscriptView};
pub use session::{ChatSession, SessionOptions, start_session};
pub use store::MessageStore;
