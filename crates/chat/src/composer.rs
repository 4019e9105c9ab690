use std::path::Path;

use crate::attachment::{Attachment, AttachmentError};

pub const COMPOSER_PLACEHOLDER: &str = "Message AURA AI...";

/// What a key press in the composer should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Submit,
    InsertNewline,
    Ignore,
}

/// Enter submits, Shift+Enter breaks the line, everything else is left to the
/// text input.
pub fn key_action(key: &str, shift: bool) -> KeyAction {
    match (key, shift) {
        ("enter", false) => KeyAction::Submit,
        ("enter", true) => KeyAction::InsertNewline,
        _ => KeyAction::Ignore,
    }
}

/// A submitted draft, handed to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub text: String,
    pub attachment: Option<Attachment>,
}

/// Draft text plus at most one pending attachment.
#[derive(Debug, Clone, Default)]
pub struct InputComposer {
    text: String,
    attachment: Option<Attachment>,
}

impl InputComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    /// Replaces any pending attachment.
    pub fn attach(&mut self, attachment: Attachment) {
        if let Some(previous) = self.attachment.replace(attachment) {
            tracing::debug!(replaced = %previous.name(), "replaced pending attachment");
        }
    }

    /// Validates and attaches a picked file. The previous attachment is kept
    /// when the new one is rejected.
    pub fn attach_path(&mut self, path: impl AsRef<Path>) -> Result<(), AttachmentError> {
        let attachment = Attachment::from_path(path)?;
        self.attach(attachment);
        Ok(())
    }

    pub fn remove_attachment(&mut self) -> Option<Attachment> {
        self.attachment.take()
    }

    pub fn can_submit(&self, busy: bool) -> bool {
        !busy && (!self.text.trim().is_empty() || self.attachment.is_some())
    }

    /// Takes the draft when it may be sent and clears both fields.
    pub fn submit(&mut self, busy: bool) -> Option<Submission> {
        if !self.can_submit(busy) {
            return None;
        }

        Some(Submission {
            text: std::mem::take(&mut self.text),
            attachment: self.attachment.take(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(name: &str) -> Attachment {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join(name);
        std::fs::write(&path, b"png").expect("write fixture");
        Attachment::from_path(&path).expect("png accepted")
    }

    #[test]
    fn blank_draft_cannot_be_submitted() {
        let mut composer = InputComposer::new();
        composer.set_text("  \n\t ");

        assert!(!composer.can_submit(false));
        assert_eq!(composer.submit(false), None);
        assert_eq!(composer.text(), "  \n\t ");
    }

    #[test]
    fn busy_blocks_submit_and_keeps_draft() {
        let mut composer = InputComposer::new();
        composer.set_text("hello");

        assert_eq!(composer.submit(true), None);
        assert_eq!(composer.text(), "hello");
    }

    #[test]
    fn submit_clears_text_and_attachment() {
        let mut composer = InputComposer::new();
        composer.set_text("look at this");
        composer.attach(image("cat.png"));

        let submission = composer.submit(false).expect("draft is sendable");

        assert_eq!(submission.text, "look at this");
        assert_eq!(
            submission.attachment.as_ref().map(Attachment::name),
            Some("cat.png")
        );
        assert_eq!(composer.text(), "");
        assert!(composer.attachment().is_none());
    }

    #[test]
    fn attachment_alone_is_sendable() {
        let mut composer = InputComposer::new();
        composer.attach(image("cat.png"));

        assert!(composer.can_submit(false));
        assert!(composer.submit(false).is_some());
    }

    #[test]
    fn only_one_attachment_is_kept() {
        let mut composer = InputComposer::new();
        composer.attach(image("cat.png"));
        composer.attach(image("b.png"));

        assert_eq!(composer.attachment().map(Attachment::name), Some("b.png"));
        assert!(composer.remove_attachment().is_some());
        assert!(composer.attachment().is_none());
    }

    #[test]
    fn rejected_pick_keeps_previous_attachment() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("script.sh");
        std::fs::write(&path, b"echo").expect("write fixture");

        let mut composer = InputComposer::new();
        composer.attach(image("cat.png"));

        assert!(composer.attach_path(&path).is_err());
        assert_eq!(composer.attachment().map(Attachment::name), Some("cat.png"));
    }

    #[test]
    fn enter_and_shift_enter() {
        assert_eq!(key_action("enter", false), KeyAction::Submit);
        assert_eq!(key_action("enter", true), KeyAction::InsertNewline);
        assert_eq!(key_action("a", false), KeyAction::Ignore);
    }
}
