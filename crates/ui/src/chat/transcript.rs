use gpui::prelude::FluentBuilder as _;
use gpui::*;
use gpui_component::{
    ActiveTheme, Icon, IconName, Sizable, h_flex, label::Label, text::TextView, v_flex,
};

use aura_chat::{MessageRow, MessageStatus, Sender, TranscriptView};

use crate::chat::scroll_manager::ScrollManager;

const USER_BUBBLE_MAX_WIDTH: Pixels = px(540.);
const USER_BUBBLE_PADDING_X: Pixels = px(14.);
const USER_BUBBLE_PADDING_Y: Pixels = px(10.);
const AVATAR_SIZE: Pixels = px(32.);
const TYPING_DOT_SIZE: Pixels = px(8.);

/// Scrollable list of transcript rows that follows new messages.
pub struct TranscriptList {
    view: TranscriptView,
    scroll_manager: ScrollManager,
}

impl TranscriptList {
    pub fn new(_cx: &mut Context<Self>) -> Self {
        Self {
            view: TranscriptView::default(),
            scroll_manager: ScrollManager::new(),
        }
    }

    pub fn view(&self) -> &TranscriptView {
        &self.view
    }

    /// Replaces the rendered snapshot and keeps the tail in view when it grows.
    pub fn set_view(&mut self, view: TranscriptView, cx: &mut Context<Self>) {
        if should_follow(&self.view, &view) {
            self.scroll_manager.request_scroll_to_bottom_if_following();
        }

        self.view = view;
        cx.notify();
    }

    pub fn scroll_to_bottom(&mut self, cx: &mut Context<Self>) {
        self.scroll_manager.request_scroll_to_bottom();
        cx.notify();
    }

    fn render_row(&self, row: &MessageRow, cx: &Context<Self>) -> AnyElement {
        match row.sender {
            Sender::User => self.render_user_row(row, cx),
            Sender::Assistant => self.render_assistant_row(row, cx),
        }
    }

    fn render_user_row(&self, row: &MessageRow, cx: &Context<Self>) -> AnyElement {
        let theme = cx.theme();

        v_flex()
            .id(("user-row", row.id.0))
            .w_full()
            .items_end()
            .gap_1()
            .child(
                Label::new(row.screen_reader_label)
                    .text_xs()
                    .text_color(theme.muted_foreground),
            )
            .child(
                v_flex()
                    .max_w(USER_BUBBLE_MAX_WIDTH)
                    .px(USER_BUBBLE_PADDING_X)
                    .py(USER_BUBBLE_PADDING_Y)
                    .gap_2()
                    .rounded_lg()
                    .bg(theme.primary)
                    .text_color(theme.primary_foreground)
                    .when_some(row.attachment_name.clone(), |bubble, name| {
                        bubble.child(render_attachment_chip(
                            name,
                            row.attachment_size.clone(),
                            theme.primary_foreground.opacity(0.15),
                        ))
                    })
                    .when(!row.html.is_empty(), |bubble| {
                        bubble.child(
                            TextView::html(("user-html", row.id.0), row.html.clone())
                                .selectable(true),
                        )
                    }),
            )
            .into_any_element()
    }

    fn render_assistant_row(&self, row: &MessageRow, cx: &Context<Self>) -> AnyElement {
        let theme = cx.theme();
        let show_typing = row.pending && self.view.typing_indicator;
        let failed = is_failed_row(row);

        h_flex()
            .id(("assistant-row", row.id.0))
            .w_full()
            .items_start()
            .gap_3()
            .child(
                div()
                    .flex_shrink_0()
                    .size(AVATAR_SIZE)
                    .rounded_full()
                    .bg(theme.primary)
                    .flex()
                    .items_center()
                    .justify_center()
                    .child(
                        Icon::new(IconName::Bot)
                            .size(px(18.))
                            .text_color(theme.primary_foreground),
                    ),
            )
            .child(
                v_flex()
                    .flex_1()
                    .min_w_0()
                    .gap_1()
                    .child(
                        Label::new(row.screen_reader_label)
                            .text_xs()
                            .text_color(theme.muted_foreground),
                    )
                    .map(|column| {
                        if show_typing {
                            column.child(render_typing_indicator(theme.primary))
                        } else {
                            column.child(
                                div()
                                    .when(failed, |body| body.text_color(theme.danger))
                                    .child(
                                        TextView::html(
                                            ("assistant-html", row.id.0),
                                            row.html.clone(),
                                        )
                                        .selectable(true),
                                    ),
                            )
                        }
                    })
                    .when(row.status == MessageStatus::Cancelled, |column| {
                        column.child(
                            Label::new("Stopped")
                                .text_xs()
                                .text_color(theme.muted_foreground),
                        )
                    }),
            )
            .into_any_element()
    }
}

impl Render for TranscriptList {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        self.scroll_manager.update_follow_state();
        self.scroll_manager.apply_pending_scroll();

        let rows = self
            .view
            .rows
            .iter()
            .map(|row| self.render_row(row, cx))
            .collect::<Vec<_>>();

        v_flex().size_full().min_h_0().child(
            v_flex()
                .id("transcript")
                .size_full()
                .px_4()
                .py_3()
                .gap_6()
                .overflow_y_scroll()
                .track_scroll(self.scroll_manager.handle())
                .children(rows),
        )
    }
}

fn render_attachment_chip(name: String, size: Option<String>, background: Hsla) -> impl IntoElement {
    h_flex()
        .gap_2()
        .items_center()
        .px_2()
        .py_1()
        .rounded_md()
        .bg(background)
        .child(Icon::new(IconName::File).small())
        .child(Label::new(name).text_sm().font_weight(FontWeight::MEDIUM))
        .when_some(size, |chip, size| chip.child(Label::new(size).text_xs()))
}

fn render_typing_indicator(color: Hsla) -> impl IntoElement {
    h_flex()
        .id("typing-indicator")
        .gap_1()
        .py_2()
        .children((0..3).map(|index| {
            div()
                .id(("typing-dot", index as u64))
                .size(TYPING_DOT_SIZE)
                .rounded_full()
                .bg(color)
                .with_animation(
                    ("typing-dot-pulse", index as u64),
                    Animation::new(std::time::Duration::from_millis(900))
                        .repeat()
                        .with_easing(pulsating_between(0.3, 1.0)),
                    |dot, delta| dot.opacity(delta),
                )
        }))
}

/// Failed replies are tinted; the failure annotation is already part of the
/// reply text, so no separate caption is rendered.
fn is_failed_row(row: &MessageRow) -> bool {
    matches!(row.status, MessageStatus::Error(_))
}

/// The list follows when a row is added or the newest reply changed.
fn should_follow(previous: &TranscriptView, next: &TranscriptView) -> bool {
    if next.rows.len() != previous.rows.len() {
        return true;
    }

    match (previous.rows.last(), next.rows.last()) {
        (Some(before), Some(after)) => before.html != after.html || before.status != after.status,
        _ => next.typing_indicator != previous.typing_indicator,
    }
}

#[cfg(test)]
mod tests {
    use aura_chat::{Message, MessageId};
    use aura_llm::StreamTarget;

    use super::*;

    fn snapshot(messages: &[Message], busy: bool) -> TranscriptView {
        TranscriptView::from_parts(messages, busy, None)
    }

    #[test]
    fn follows_on_new_rows_and_streamed_text() {
        let mut messages = vec![Message::assistant(MessageId::new(1), "Hey")];
        let before = snapshot(&messages, false);

        messages.push(Message::user(MessageId::new(2), "hi", None));
        messages.push(Message::assistant_placeholder(
            MessageId::new(3),
            StreamTarget::new(1),
        ));
        let grown = snapshot(&messages, true);
        assert!(should_follow(&before, &grown));

        messages[2].text = "Sure".to_string();
        let streamed = snapshot(&messages, true);
        assert!(should_follow(&grown, &streamed));
        assert!(!should_follow(&streamed, &streamed.clone()));
    }

    #[test]
    fn failed_reply_carries_its_error_once() {
        let mut reply = Message::assistant(
            MessageId::new(2),
            "Sorry, something went wrong. model overloaded",
        );
        reply.status = MessageStatus::Error("model overloaded".to_string());
        let view = snapshot(&[reply], false);

        let row = &view.rows[0];
        assert!(is_failed_row(row));
        assert_eq!(row.html.matches("model overloaded").count(), 1);
    }
}
