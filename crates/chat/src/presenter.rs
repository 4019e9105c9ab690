use crate::attachment::format_size;
use crate::controller::ChatController;
use crate::markdown::render_markdown;
use crate::message::{Message, MessageId, MessageStatus, Sender};

pub const USER_MESSAGE_LABEL: &str = "Your message:";
pub const ASSISTANT_MESSAGE_LABEL: &str = "AURA AI message:";

/// One rendered transcript entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRow {
    /// Render key; stable while the reply streams in.
    pub id: MessageId,
    pub sender: Sender,
    pub screen_reader_label: &'static str,
    pub html: String,
    pub attachment_name: Option<String>,
    pub attachment_size: Option<String>,
    pub status: MessageStatus,
    /// Assistant reply that has not received any text yet.
    pub pending: bool,
}

impl MessageRow {
    fn from_message(message: &Message) -> Self {
        let screen_reader_label = match message.sender {
            Sender::User => USER_MESSAGE_LABEL,
            Sender::Assistant => ASSISTANT_MESSAGE_LABEL,
        };

        Self {
            id: message.id,
            sender: message.sender,
            screen_reader_label,
            html: render_markdown(&message.text),
            attachment_name: message.attachment.as_ref().map(|meta| meta.name.clone()),
            attachment_size: message
                .attachment
                .as_ref()
                .map(|meta| format_size(meta.size_bytes)),
            status: message.status.clone(),
            pending: message.is_streaming() && message.text.is_empty(),
        }
    }
}

/// Everything the transcript view draws for one frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TranscriptView {
    pub rows: Vec<MessageRow>,
    pub busy: bool,
    pub typing_indicator: bool,
    pub error_banner: Option<String>,
}

impl TranscriptView {
    pub fn build(controller: &ChatController) -> Self {
        Self::from_parts(
            controller.messages(),
            controller.is_busy(),
            controller.last_error(),
        )
    }

    pub fn from_parts(messages: &[Message], busy: bool, last_error: Option<&str>) -> Self {
        Self {
            rows: messages.iter().map(MessageRow::from_message).collect(),
            busy,
            typing_indicator: show_typing_indicator(messages, busy),
            error_banner: last_error.map(|error| format!("Error: {error}")),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// True only while a turn is in flight and its reply is still empty.
pub fn show_typing_indicator(messages: &[Message], busy: bool) -> bool {
    busy
        && messages
            .last()
            .is_some_and(|last| last.sender == Sender::Assistant && last.text.is_empty())
}

#[cfg(test)]
mod tests {
    use aura_llm::StreamTarget;

    use super::*;
    use crate::message::AttachmentMeta;

    fn transcript() -> Vec<Message> {
        vec![
            Message::assistant(MessageId::new(1), "Hey"),
            Message::user(
                MessageId::new(2),
                "**look**",
                Some(AttachmentMeta {
                    name: "deck.pptx".to_string(),
                    mime_type: "application/zip".to_string(),
                    size_bytes: 2048,
                }),
            ),
            Message::assistant_placeholder(MessageId::new(3), StreamTarget::new(1)),
        ]
    }

    #[test]
    fn rows_follow_store_order_with_labels_and_markup() {
        let view = TranscriptView::from_parts(&transcript(), true, None);

        let ids = view.rows.iter().map(|row| row.id.0).collect::<Vec<_>>();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(view.rows[0].screen_reader_label, "AURA AI message:");
        assert_eq!(view.rows[1].screen_reader_label, "Your message:");
        assert_eq!(view.rows[1].html, "<strong>look</strong>");
        assert_eq!(view.rows[1].attachment_name.as_deref(), Some("deck.pptx"));
        assert_eq!(view.rows[1].attachment_size.as_deref(), Some("2.0 KB"));
        assert!(view.rows[2].pending);
    }

    #[test]
    fn typing_indicator_needs_busy_and_empty_reply() {
        let mut messages = transcript();

        assert!(show_typing_indicator(&messages, true));
        assert!(!show_typing_indicator(&messages, false));

        messages[2].text = "Sure".to_string();
        assert!(!show_typing_indicator(&messages, true));

        messages.push(Message::user(MessageId::new(4), "", None));
        assert!(!show_typing_indicator(&messages, true));
        assert!(!show_typing_indicator(&[], true));
    }

    #[test]
    fn error_banner_is_prefixed() {
        let view = TranscriptView::from_parts(&[], false, Some("quota exceeded"));

        assert_eq!(view.error_banner.as_deref(), Some("Error: quota exceeded"));
        assert!(view.is_empty());
        assert!(!view.typing_indicator);
    }
}
