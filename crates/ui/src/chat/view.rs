use gpui::prelude::FluentBuilder as _;
use gpui::*;
use gpui_component::{ActiveTheme, h_flex, label::Label, v_flex};
use gpui_tokio_bridge::Tokio;

use aura_chat::{ChatController, ChatError, ChatResult, TranscriptView};
use aura_llm::{
    Part, ProviderEventStream, ProviderStreamHandle, ProviderWorker, StreamEventMapped,
    StreamTarget,
};

use crate::chat::events::{Stop, Submit};
use crate::chat::{MessageInput, TranscriptList};

type ComposeResult = Result<ChatResult<Vec<Part>>, gpui_tokio_bridge::JoinError>;

/// Drives the chat controller from UI events and provider streams.
///
/// The controller is only touched on the foreground thread. Attachment
/// encoding and the provider worker run on tokio and report back through
/// `this.update`.
pub struct ChatView {
    controller: ChatController,
    transcript: Entity<TranscriptList>,
    message_input: Entity<MessageInput>,
    compose_task: Option<Task<()>>,
    stream_worker_task: Option<Task<Result<(), gpui_tokio_bridge::JoinError>>>,
    stream_reader_task: Option<Task<()>>,
}

impl ChatView {
    pub fn new(controller: ChatController, window: &mut Window, cx: &mut Context<Self>) -> Self {
        let transcript = cx.new(TranscriptList::new);
        let message_input = cx.new(|cx| MessageInput::new(window, cx));

        cx.subscribe(&message_input, |this, _, event: &Submit, cx| {
            this.handle_submit(event.clone(), cx);
        })
        .detach();

        cx.subscribe(&message_input, |this, _, event: &Stop, cx| {
            this.handle_stop(*event, cx);
        })
        .detach();

        let mut this = Self {
            controller,
            transcript,
            message_input,
            compose_task: None,
            stream_worker_task: None,
            stream_reader_task: None,
        };
        this.sync_views(cx);
        this
    }

    pub fn is_busy(&self) -> bool {
        self.controller.is_busy()
    }

    fn handle_submit(&mut self, event: Submit, cx: &mut Context<Self>) {
        let Submit { submission } = event;
        let Some(turn) = self
            .controller
            .begin_turn(submission.text, submission.attachment)
        else {
            return;
        };
        let target = turn.target;
        self.sync_views(cx);
        self.transcript
            .update(cx, |transcript, cx| transcript.scroll_to_bottom(cx));

        // File reads happen on tokio; the controller is only resumed on this thread.
        let compose = Tokio::spawn(cx, async move { turn.compose().await });
        self.compose_task = Some(cx.spawn(async move |this, cx| {
            let result = compose.await;
            let _ = this.update(cx, |this, cx| {
                this.handle_composed(target, result, cx);
            });
        }));
    }

    fn handle_composed(&mut self, target: StreamTarget, result: ComposeResult, cx: &mut Context<Self>) {
        self.compose_task = None;

        let parts = match result {
            Ok(Ok(parts)) => parts,
            Ok(Err(error)) => {
                self.controller.fail_turn(target, error);
                self.sync_views(cx);
                return;
            }
            Err(error) => {
                self.controller.fail_turn(
                    target,
                    ChatError::Stream {
                        stage: "compose-join",
                        message: error.to_string(),
                    },
                );
                self.sync_views(cx);
                return;
            }
        };

        if let Some(handle) = self.controller.open_stream(target, parts) {
            self.spawn_stream_pipeline(handle, cx);
        }
        self.sync_views(cx);
    }

    fn spawn_stream_pipeline(&mut self, handle: ProviderStreamHandle, cx: &mut Context<Self>) {
        self.spawn_stream_worker(handle.worker, cx);
        self.spawn_stream_reader(handle.stream, cx);
    }

    fn spawn_stream_worker(&mut self, worker: ProviderWorker, cx: &mut Context<Self>) {
        self.stream_worker_task = Some(Tokio::spawn(cx, worker));
    }

    fn spawn_stream_reader(&mut self, mut stream: ProviderEventStream, cx: &mut Context<Self>) {
        let stream_target = stream.target();

        self.stream_reader_task = Some(cx.spawn(async move |this, cx| {
            while let Some(event) = stream.recv().await {
                let terminal = event.is_terminal();
                let _ = this.update(cx, |this, cx| {
                    this.handle_stream_event(event, cx);
                });
                if terminal {
                    return;
                }
            }

            let _ = this.update(cx, |this, cx| {
                this.handle_stream_reader_closed(stream_target, cx);
            });
        }));
    }

    fn handle_stream_event(&mut self, event: StreamEventMapped, cx: &mut Context<Self>) {
        let terminal = event.is_terminal();
        if !self.controller.apply_event(event) {
            return;
        }

        if terminal {
            self.stream_worker_task = None;
            self.stream_reader_task = None;
        }
        self.sync_views(cx);
    }

    fn handle_stream_reader_closed(&mut self, target: StreamTarget, cx: &mut Context<Self>) {
        self.stream_worker_task = None;
        self.stream_reader_task = None;

        if self.controller.handle_stream_closed(target) {
            self.sync_views(cx);
        }
    }

    fn handle_stop(&mut self, event: Stop, cx: &mut Context<Self>) {
        if self.controller.active_target() != Some(event.target) {
            return;
        }

        // Dropping the reader drops the event stream, which signals the worker to stop.
        self.compose_task = None;
        self.stream_reader_task = None;
        self.stream_worker_task = None;
        self.controller.cancel_turn();
        self.sync_views(cx);
    }

    fn sync_views(&mut self, cx: &mut Context<Self>) {
        let view = TranscriptView::build(&self.controller);
        let active_target = self.controller.active_target();

        self.transcript.update(cx, |transcript, cx| {
            transcript.set_view(view, cx);
        });
        self.message_input.update(cx, |input, cx| {
            input.set_active_target(active_target, cx);
        });
        cx.notify();
    }
}

impl Render for ChatView {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();
        let error_banner = self
            .transcript
            .read(cx)
            .view()
            .error_banner
            .clone();

        v_flex()
            .id("chat-view")
            .relative()
            .size_full()
            .min_h_0()
            .overflow_hidden()
            .bg(theme.background)
            .child(
                div()
                    .id("chat-view-transcript")
                    .flex_1()
                    .min_h_0()
                    .child(self.transcript.clone()),
            )
            .when_some(error_banner, |column, banner| {
                column.child(
                    h_flex()
                        .id("chat-view-error-banner")
                        .w_full()
                        .px_4()
                        .pb_2()
                        .child(Label::new(banner).text_sm().text_color(theme.danger)),
                )
            })
            .child(
                div()
                    .id("chat-view-message-input")
                    .flex_shrink_0()
                    .w_full()
                    .border_t_1()
                    .border_color(theme.border)
                    .child(self.message_input.clone()),
            )
    }
}
