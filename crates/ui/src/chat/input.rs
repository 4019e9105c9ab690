use std::path::PathBuf;

use gpui::prelude::FluentBuilder as _;
use gpui::*;
use gpui_component::{
    ActiveTheme, Icon, IconName, Sizable,
    button::{Button, ButtonVariants},
    h_flex,
    input::{Input, InputEvent, InputState},
    label::Label,
    v_flex,
};

use aura_chat::{COMPOSER_PLACEHOLDER, InputComposer, KeyAction, format_size, key_action};
use aura_llm::StreamTarget;

use crate::chat::events::{Stop, Submit};

/// Composer view: text box, attach button, pending attachment chip, send/stop.
pub struct MessageInput {
    input_state: Entity<InputState>,
    composer: InputComposer,
    active_target: Option<StreamTarget>,
    pending_newline: bool,
    attach_error: Option<String>,
}

impl EventEmitter<Submit> for MessageInput {}
impl EventEmitter<Stop> for MessageInput {}

impl MessageInput {
    pub fn new(window: &mut Window, cx: &mut Context<Self>) -> Self {
        let input_state = cx.new(|cx| {
            InputState::new(window, cx)
                .placeholder(COMPOSER_PLACEHOLDER)
                .auto_grow(1, 8)
        });

        cx.subscribe_in(
            &input_state,
            window,
            |this, _, event: &InputEvent, window, cx| {
                if let InputEvent::PressEnter { secondary } = event {
                    if *secondary {
                        this.pending_newline = false;
                        return;
                    }

                    if this.pending_newline {
                        // Shift+Enter already inserted the newline; swallow the enter it emits.
                        this.pending_newline = false;
                    } else {
                        this.trim_trailing_newline(window, cx);
                        this.handle_submit(window, cx);
                    }
                }
            },
        )
        .detach();

        Self {
            input_state,
            composer: InputComposer::new(),
            active_target: None,
            pending_newline: false,
            attach_error: None,
        }
    }

    fn is_busy(&self) -> bool {
        self.active_target.is_some()
    }

    /// Mirrors the controller's in-flight turn; `None` re-enables the composer.
    pub fn set_active_target(&mut self, target: Option<StreamTarget>, cx: &mut Context<Self>) {
        self.active_target = target;
        if target.is_none() {
            self.pending_newline = false;
        }
        cx.notify();
    }

    fn clear(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        self.input_state.update(cx, |state, cx| {
            state.set_value("", window, cx);
        });
        self.pending_newline = false;
    }

    fn handle_shift_enter(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        if self.is_busy() {
            return;
        }

        self.pending_newline = true;
        self.input_state.update(cx, |state, cx| {
            state.insert("\n", window, cx);
        });
        cx.notify();
    }

    fn trim_trailing_newline(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        self.input_state.update(cx, |state, cx| {
            let value = state.value().to_string();
            if let Some(trimmed) = value.strip_suffix('\n') {
                state.set_value(trimmed.to_string(), window, cx);
            }
        });
    }

    fn handle_submit(&mut self, window: &mut Window, cx: &mut Context<Self>) {
        let text = self.input_state.read(cx).value().to_string();
        self.composer.set_text(text);

        let Some(submission) = self.composer.submit(self.is_busy()) else {
            return;
        };

        self.attach_error = None;
        cx.emit(Submit { submission });
        self.clear(window, cx);
        cx.notify();
    }

    fn handle_stop(&mut self, cx: &mut Context<Self>) {
        let Some(target) = self.active_target else {
            return;
        };

        cx.emit(Stop { target });
    }

    fn pick_attachment(&mut self, cx: &mut Context<Self>) {
        if self.is_busy() {
            return;
        }

        let paths = cx.prompt_for_paths(PathPromptOptions {
            files: true,
            directories: false,
            multiple: false,
            prompt: None,
        });

        cx.spawn(async move |this, cx| {
            let path = match paths.await {
                Ok(Ok(Some(paths))) => paths.into_iter().next(),
                Ok(Ok(None)) | Err(_) => None,
                Ok(Err(error)) => {
                    tracing::warn!(error = %error, "file picker failed");
                    None
                }
            };

            if let Some(path) = path {
                let _ = this.update(cx, |this, cx| this.attach_path(path, cx));
            }
        })
        .detach();
    }

    fn attach_path(&mut self, path: PathBuf, cx: &mut Context<Self>) {
        match self.composer.attach_path(&path) {
            Ok(()) => self.attach_error = None,
            Err(error) => {
                tracing::info!(path = ?path, error = %error, "attachment rejected");
                self.attach_error = Some(error.to_string());
            }
        }
        cx.notify();
    }

    fn remove_attachment(&mut self, cx: &mut Context<Self>) {
        self.composer.remove_attachment();
        self.attach_error = None;
        cx.notify();
    }

    fn render_attachment_row(&self, cx: &Context<Self>) -> Option<AnyElement> {
        let theme = cx.theme();
        let attachment = self.composer.attachment()?;

        Some(
            h_flex()
                .id("pending-attachment")
                .gap_2()
                .items_center()
                .px_3()
                .py_1()
                .rounded_lg()
                .bg(theme.muted)
                .child(Icon::new(IconName::File).small())
                .child(Label::new(attachment.name().to_string()).text_sm())
                .child(
                    Label::new(format_size(attachment.size_bytes()))
                        .text_xs()
                        .text_color(theme.muted_foreground),
                )
                .child(
                    Button::new("remove-attachment")
                        .ghost()
                        .xsmall()
                        .icon(IconName::Close)
                        .on_click(cx.listener(|this, _, _window, cx| {
                            this.remove_attachment(cx);
                        })),
                )
                .into_any_element(),
        )
    }
}

impl Render for MessageInput {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();
        let busy = self.is_busy();
        let attachment_row = self.render_attachment_row(cx);

        let action = if busy {
            Button::new("stop")
                .small()
                .danger()
                .icon(IconName::CircleX)
                .child("Stop")
                .on_click(cx.listener(|this, _, _window, cx| {
                    this.handle_stop(cx);
                }))
                .into_any_element()
        } else {
            Button::new("send")
                .small()
                .primary()
                .icon(IconName::ArrowUp)
                .child("Send")
                .on_click(cx.listener(|this, _, window, cx| {
                    this.handle_submit(window, cx);
                }))
                .into_any_element()
        };

        v_flex()
            .bg(theme.background)
            .gap_2()
            .p_3()
            .when_some(attachment_row, |column, row| column.child(row))
            .when_some(self.attach_error.clone(), |column, error| {
                column.child(
                    Label::new(error)
                        .text_xs()
                        .text_color(theme.danger),
                )
            })
            .child(
                h_flex()
                    .w_full()
                    .items_end()
                    .gap_2()
                    .px_2()
                    .py_2()
                    .rounded_lg()
                    .border_1()
                    .border_color(theme.border)
                    .bg(theme.background)
                    .on_key_down(cx.listener(|this, event: &KeyDownEvent, window, cx| {
                        let keystroke = &event.keystroke;
                        if key_action(&keystroke.key, keystroke.modifiers.shift)
                            == KeyAction::InsertNewline
                        {
                            this.handle_shift_enter(window, cx);
                        }
                    }))
                    .child(
                        Button::new("attach")
                            .ghost()
                            .small()
                            .icon(IconName::Plus)
                            .disabled(busy)
                            .on_click(cx.listener(|this, _, _window, cx| {
                                this.pick_attachment(cx);
                            })),
                    )
                    .child(
                        div()
                            .flex_1()
                            .min_w_0()
                            .child(Input::new(&self.input_state).w_full().disabled(busy)),
                    )
                    .child(action),
            )
    }
}
