use aura_llm::{
    Part, ProviderStreamHandle, StreamEventMapped, StreamEventPayload, StreamTarget,
};
use snafu::{ResultExt, ensure};

use crate::attachment::Attachment;
use crate::error::{AttachmentSnafu, ChatError, ChatResult, NoSessionSnafu};
use crate::message::{Message, MessageId, MessageStatus, TurnState, TurnTransition};
use crate::session::ChatSession;
use crate::store::MessageStore;

const ERROR_ANNOTATION_PREFIX: &str = "Sorry, something went wrong.";
const STREAM_CLOSED_MESSAGE: &str = "provider stream ended before a terminal event";

/// Result of one [`ChatController::send`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Busy, or nothing to send. The transcript is unchanged.
    Ignored,
    Completed,
    Failed,
    Cancelled,
}

/// An admitted turn whose request parts are not built yet.
///
/// Holds everything needed to encode the attachment so the controller does not
/// stay borrowed across the file read.
#[derive(Debug, Clone)]
pub struct PendingTurn {
    pub target: StreamTarget,
    pub assistant_message_id: MessageId,
    text: String,
    attachment: Option<Attachment>,
    session_ready: bool,
}

impl PendingTurn {
    /// Builds the request parts: the encoded attachment first, then the text.
    pub async fn compose(&self) -> ChatResult<Vec<Part>> {
        ensure!(
            self.session_ready,
            NoSessionSnafu {
                stage: "compose-turn"
            }
        );

        let mut parts = Vec::with_capacity(2);
        if let Some(attachment) = &self.attachment {
            let inline = attachment.encode().await.context(AttachmentSnafu {
                stage: "encode-attachment",
            })?;
            parts.push(Part::InlineData(inline));
        }

        // Blank text next to an attachment is left out: the remote rejects
        // empty text parts, so an attachment-only turn sends the file alone.
        if !self.text.trim().is_empty() || parts.is_empty() {
            parts.push(Part::text(self.text.clone()));
        }

        Ok(parts)
    }
}

#[derive(Debug)]
struct ActiveTurn {
    target: StreamTarget,
    assistant_message_id: MessageId,
    accumulated: String,
    parts: Vec<Part>,
}

/// Owns the transcript, the session and the lifecycle of the single outgoing turn.
///
/// All mutation goes through `&mut self`; callers that stream on another task
/// forward events back here through [`ChatController::apply_event`].
pub struct ChatController {
    store: MessageStore,
    session: Option<ChatSession>,
    state: TurnState,
    active_turn: Option<ActiveTurn>,
    next_turn_id: u64,
    last_error: Option<String>,
}

impl ChatController {
    /// Starts with a live session and the greeting as the first message.
    pub fn new(session: ChatSession, greeting: impl Into<String>) -> Self {
        let mut store = MessageStore::new();
        let greeting = greeting.into();
        if !greeting.trim().is_empty() {
            store.push_assistant(greeting);
        }

        Self {
            store,
            session: Some(session),
            state: TurnState::Idle,
            active_turn: None,
            next_turn_id: 1,
            last_error: None,
        }
    }

    /// Starts without a session. The transcript stays empty and the error is
    /// shown once; every later send fails with "no session".
    pub fn without_session(error: &ChatError) -> Self {
        tracing::error!(stage = error.stage(), error = %error, "chat initialization failed");

        Self {
            store: MessageStore::new(),
            session: None,
            state: TurnState::Idle,
            active_turn: None,
            next_turn_id: 1,
            last_error: Some(error.to_string()),
        }
    }

    pub fn from_startup(
        result: ChatResult<ChatSession>,
        greeting: impl Into<String>,
    ) -> Self {
        match result {
            Ok(session) => Self::new(session, greeting),
            Err(error) => Self::without_session(&error),
        }
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn messages(&self) -> &[Message] {
        self.store.messages()
    }

    pub fn state(&self) -> &TurnState {
        &self.state
    }

    pub fn is_busy(&self) -> bool {
        !self.state.is_idle()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&ChatSession> {
        self.session.as_ref()
    }

    pub fn active_target(&self) -> Option<StreamTarget> {
        self.state.active_target()
    }

    /// Admits a submit and appends the user message plus an empty reply.
    ///
    /// Returns `None` without touching anything when a turn is already in
    /// flight, or when there is neither text nor an attachment.
    pub fn begin_turn(
        &mut self,
        text: impl Into<String>,
        attachment: Option<Attachment>,
    ) -> Option<PendingTurn> {
        let text = text.into();
        if text.trim().is_empty() && attachment.is_none() {
            return None;
        }

        let target = StreamTarget::new(self.next_turn_id);
        self.state = match self.state.apply(TurnTransition::Begin(target)) {
            Ok(state) => state,
            Err(rejection) => {
                tracing::debug!(?rejection, "ignored submit while a turn is in flight");
                return None;
            }
        };
        self.next_turn_id = self.next_turn_id.saturating_add(1);
        self.last_error = None;

        self.store
            .push_user(text.clone(), attachment.as_ref().map(Attachment::meta));
        let assistant_message_id = self.store.push_assistant_placeholder(target);
        self.active_turn = Some(ActiveTurn {
            target,
            assistant_message_id,
            accumulated: String::new(),
            parts: Vec::new(),
        });

        tracing::info!(
            target = ?target,
            has_attachment = attachment.is_some(),
            "turn started"
        );

        Some(PendingTurn {
            target,
            assistant_message_id,
            text,
            attachment,
            session_ready: self.session.is_some(),
        })
    }

    /// Asks the session to start the remote call for a composed turn.
    ///
    /// On failure the turn is failed here and `None` is returned.
    pub fn open_stream(
        &mut self,
        target: StreamTarget,
        parts: Vec<Part>,
    ) -> Option<ProviderStreamHandle> {
        if self.state != TurnState::Sending(target) {
            tracing::debug!(target = ?target, state = ?self.state, "stale open request ignored");
            return None;
        }

        let Some(session) = self.session.as_ref() else {
            self.fail_turn(
                target,
                ChatError::NoSession {
                    stage: "open-stream",
                },
            );
            return None;
        };

        match session.send_stream(target, &parts) {
            Ok(handle) => {
                if let Ok(state) = self.state.apply(TurnTransition::StreamOpened(target)) {
                    self.state = state;
                }
                if let Some(turn) = self.active_turn.as_mut() {
                    turn.parts = parts;
                }
                Some(handle)
            }
            Err(source) => {
                self.fail_turn(
                    target,
                    ChatError::Send {
                        stage: "open-stream",
                        source,
                    },
                );
                None
            }
        }
    }

    /// Applies one stream event. Events for anything but the open stream are
    /// dropped. Returns whether the event changed state.
    pub fn apply_event(&mut self, event: StreamEventMapped) -> bool {
        if !self.state.accepts_stream_event(event.target) {
            tracing::debug!(target = ?event.target, "dropped event for inactive stream");
            return false;
        }

        match event.payload {
            StreamEventPayload::Delta(delta) => {
                let Some(turn) = self.active_turn.as_mut() else {
                    return false;
                };
                turn.accumulated.push_str(&delta);
                self.store
                    .set_text(turn.assistant_message_id, turn.accumulated.clone())
            }
            StreamEventPayload::Done => self.complete_turn(event.target),
            StreamEventPayload::Error(message) => self.fail_turn(
                event.target,
                ChatError::Stream {
                    stage: "stream-event",
                    message,
                },
            ),
        }
    }

    /// Fails the turn if the event channel closed without `Done` or `Error`.
    pub fn handle_stream_closed(&mut self, target: StreamTarget) -> bool {
        if self.state.active_target() != Some(target) {
            return false;
        }

        self.fail_turn(
            target,
            ChatError::Stream {
                stage: "stream-closed",
                message: STREAM_CLOSED_MESSAGE.to_string(),
            },
        )
    }

    /// Annotates the reply with the error, records it for the banner and
    /// returns to idle. Partial text already streamed is kept.
    pub fn fail_turn(&mut self, target: StreamTarget, error: ChatError) -> bool {
        let message = error.to_string();
        let failed = match self.state.apply(TurnTransition::Fail {
            target,
            message: message.clone(),
        }) {
            Ok(state) => state,
            Err(rejection) => {
                tracing::debug!(?rejection, error = %error, "failure for inactive turn ignored");
                return false;
            }
        };

        tracing::warn!(
            target = ?target,
            stage = error.stage(),
            kind = ?error.kind(),
            error = %error,
            "turn failed"
        );
        self.state = failed;

        if let Some(turn) = self.active_turn.take() {
            let annotated = annotate_failure(&turn.accumulated, &message);
            self.store.set_text(turn.assistant_message_id, annotated);
            self.store
                .set_status(turn.assistant_message_id, MessageStatus::Error(message.clone()));
        }
        self.last_error = Some(message);
        self.state = self
            .state
            .apply(TurnTransition::ResetToIdle)
            .unwrap_or(TurnState::Idle);
        true
    }

    /// Stops the in-flight turn, keeping any partial reply. The caller drops
    /// its event stream, which cancels the provider worker.
    pub fn cancel_turn(&mut self) -> Option<StreamTarget> {
        let target = self.state.active_target()?;
        self.state = self.state.apply(TurnTransition::Cancel(target)).ok()?;

        if let Some(turn) = self.active_turn.take() {
            self.store
                .set_status(turn.assistant_message_id, MessageStatus::Cancelled);
        }

        tracing::info!(target = ?target, "turn cancelled");
        Some(target)
    }

    /// Runs a whole turn on the current task: admit, compose, stream, finish.
    ///
    /// The provider worker is spawned on the tokio runtime.
    pub async fn send(
        &mut self,
        text: impl Into<String>,
        attachment: Option<Attachment>,
    ) -> SendOutcome {
        let Some(turn) = self.begin_turn(text, attachment) else {
            return SendOutcome::Ignored;
        };
        let target = turn.target;

        let parts = match turn.compose().await {
            Ok(parts) => parts,
            Err(error) => {
                self.fail_turn(target, error);
                return self.outcome_of(turn.assistant_message_id);
            }
        };

        let Some(ProviderStreamHandle { mut stream, worker }) = self.open_stream(target, parts)
        else {
            return self.outcome_of(turn.assistant_message_id);
        };
        tokio::spawn(worker);

        loop {
            match stream.recv().await {
                Some(event) => {
                    let terminal = event.is_terminal();
                    self.apply_event(event);
                    if terminal {
                        break;
                    }
                }
                None => {
                    self.handle_stream_closed(target);
                    break;
                }
            }
        }

        self.outcome_of(turn.assistant_message_id)
    }

    fn complete_turn(&mut self, target: StreamTarget) -> bool {
        self.state = match self.state.apply(TurnTransition::Complete(target)) {
            Ok(state) => state,
            Err(rejection) => {
                tracing::debug!(?rejection, "completion for inactive turn ignored");
                return false;
            }
        };

        if let Some(turn) = self.active_turn.take() {
            self.store
                .set_status(turn.assistant_message_id, MessageStatus::Done);
            tracing::info!(
                target = ?target,
                reply_len = turn.accumulated.len(),
                "turn completed"
            );
            if let Some(session) = self.session.as_mut() {
                session.commit_turn(turn.parts, turn.accumulated);
            }
        }
        true
    }

    fn outcome_of(&self, assistant_message_id: MessageId) -> SendOutcome {
        match self.store.get(assistant_message_id).map(|message| &message.status) {
            Some(MessageStatus::Done) => SendOutcome::Completed,
            Some(MessageStatus::Cancelled) => SendOutcome::Cancelled,
            Some(MessageStatus::Error(_)) | Some(MessageStatus::Streaming(_)) | None => {
                SendOutcome::Failed
            }
        }
    }
}

fn annotate_failure(partial: &str, message: &str) -> String {
    if partial.is_empty() {
        format!("{ERROR_ANNOTATION_PREFIX} {message}")
    } else {
        format!("{partial}\n\n{ERROR_ANNOTATION_PREFIX} {message}")
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use aura_llm::{
        LlmProvider, ProviderError, ProviderResult, StreamRequest, make_event_stream,
    };

    use super::*;
    use crate::message::Sender;
    use crate::session::SessionOptions;

    enum Reply {
        Chunks(Vec<&'static str>),
        ErrorAfter(Vec<&'static str>, &'static str),
        Refuse(&'static str),
        CloseAfter(Vec<&'static str>),
    }

    struct ScriptedProvider {
        replies: Mutex<VecDeque<Reply>>,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(replies: Vec<Reply>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl LlmProvider for ScriptedProvider {
        fn id(&self) -> &str {
            "scripted"
        }

        fn name(&self) -> &str {
            "Scripted"
        }

        fn default_model(&self) -> &str {
            "scripted-model"
        }

        fn stream_chat(&self, request: StreamRequest) -> ProviderResult<ProviderStreamHandle> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let target = request.target;
            let reply = self
                .replies
                .lock()
                .expect("replies lock")
                .pop_front()
                .unwrap_or(Reply::Chunks(Vec::new()));

            let (chunks, terminal) = match reply {
                Reply::Refuse(message) => {
                    return Err(ProviderError::Remote {
                        stage: "scripted",
                        message: message.to_string(),
                    });
                }
                Reply::Chunks(chunks) => (chunks, Some(StreamEventMapped::done(target))),
                Reply::ErrorAfter(chunks, message) => {
                    (chunks, Some(StreamEventMapped::error(target, message)))
                }
                Reply::CloseAfter(chunks) => (chunks, None),
            };

            let (event_tx, stream, _cancel_rx) = make_event_stream(target);
            Ok(ProviderStreamHandle {
                stream,
                worker: Box::pin(async move {
                    for chunk in chunks {
                        let _ = event_tx.send(StreamEventMapped::delta(target, chunk));
                    }
                    if let Some(terminal) = terminal {
                        let _ = event_tx.send(terminal);
                    }
                }),
            })
        }
    }

    fn controller_with(provider: Arc<ScriptedProvider>) -> ChatController {
        ChatController::new(
            ChatSession::create(provider, SessionOptions::default()),
            "hello",
        )
    }

    #[tokio::test]
    async fn streamed_reply_fills_the_placeholder() {
        let provider = ScriptedProvider::new(vec![Reply::Chunks(vec!["Sure", ", here", " it is."])]);
        let mut controller = controller_with(provider.clone());

        let outcome = controller.send("Summarize this", None).await;

        assert_eq!(outcome, SendOutcome::Completed);
        assert!(controller.state().is_idle());
        let messages = controller.messages();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1].sender, Sender::User);
        assert_eq!(messages[1].text, "Summarize this");
        assert_eq!(messages[2].sender, Sender::Assistant);
        assert_eq!(messages[2].text, "Sure, here it is.");
        assert_eq!(messages[2].status, MessageStatus::Done);
        assert_ne!(messages[1].id, messages[2].id);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn blank_submit_is_a_no_op() {
        let provider = ScriptedProvider::new(Vec::new());
        let mut controller = controller_with(provider.clone());

        assert_eq!(controller.send("   \n", None).await, SendOutcome::Ignored);
        assert_eq!(controller.messages().len(), 1);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn second_submit_while_in_flight_is_rejected() {
        let provider = ScriptedProvider::new(vec![Reply::Chunks(vec!["ok"])]);
        let mut controller = controller_with(provider.clone());

        let pending = controller.begin_turn("first", None).expect("idle admits");
        let len_before = controller.messages().len();

        assert!(controller.begin_turn("second", None).is_none());
        assert_eq!(controller.send("third", None).await, SendOutcome::Ignored);
        assert_eq!(controller.messages().len(), len_before);

        let parts = pending.compose().await.expect("text only");
        let handle = controller
            .open_stream(pending.target, parts)
            .expect("stream opens");
        assert!(controller.begin_turn("fourth", None).is_none());
        assert_eq!(provider.calls(), 1);
        drop(handle);
    }

    #[tokio::test]
    async fn mid_stream_error_keeps_partial_text_and_recovers() {
        let provider = ScriptedProvider::new(vec![
            Reply::ErrorAfter(vec!["Half"], "quota exceeded"),
            Reply::Chunks(vec!["fine"]),
        ]);
        let mut controller = controller_with(provider);

        assert_eq!(controller.send("go", None).await, SendOutcome::Failed);
        let reply = controller.messages().last().expect("reply present");
        assert_eq!(
            reply.text,
            "Half\n\nSorry, something went wrong. quota exceeded"
        );
        assert_eq!(reply.status, MessageStatus::Error("quota exceeded".to_string()));
        assert_eq!(controller.last_error(), Some("quota exceeded"));
        assert!(controller.state().is_idle());

        assert_eq!(controller.send("again", None).await, SendOutcome::Completed);
        assert_eq!(controller.last_error(), None);
        assert_eq!(controller.messages().len(), 5);
    }

    #[tokio::test]
    async fn refused_request_annotates_empty_placeholder() {
        let provider = ScriptedProvider::new(vec![Reply::Refuse("bad key")]);
        let mut controller = controller_with(provider);

        assert_eq!(controller.send("hi", None).await, SendOutcome::Failed);
        let reply = controller.messages().last().expect("reply present");
        assert!(reply.text.starts_with("Sorry, something went wrong. "));
        assert!(reply.text.contains("bad key"));
        assert!(controller.last_error().is_some_and(|error| error.contains("bad key")));
    }

    #[tokio::test]
    async fn closed_channel_without_terminal_fails_the_turn() {
        let provider = ScriptedProvider::new(vec![Reply::CloseAfter(vec!["part"])]);
        let mut controller = controller_with(provider);

        assert_eq!(controller.send("hi", None).await, SendOutcome::Failed);
        let reply = controller.messages().last().expect("reply present");
        assert!(reply.text.starts_with("part\n\n"));
        assert_eq!(controller.last_error(), Some(STREAM_CLOSED_MESSAGE));
    }

    #[tokio::test]
    async fn missing_session_fails_each_send_without_calling_out() {
        let mut controller = ChatController::without_session(&ChatError::MissingCredential {
            stage: "test",
        });
        assert!(controller.messages().is_empty());
        assert_eq!(
            controller.last_error(),
            Some("API_KEY environment variable not set.")
        );

        assert_eq!(controller.send("hi", None).await, SendOutcome::Failed);
        let reply = controller.messages().last().expect("reply present");
        assert_eq!(
            reply.text,
            "Sorry, something went wrong. Chat session not initialized."
        );
        assert_eq!(controller.last_error(), Some("Chat session not initialized."));
        assert!(controller.state().is_idle());
    }

    #[tokio::test]
    async fn cancel_keeps_partial_text_and_drops_late_events() {
        let provider = ScriptedProvider::new(vec![Reply::Chunks(vec!["one", " two"])]);
        let mut controller = controller_with(provider);

        let pending = controller.begin_turn("count", None).expect("idle admits");
        let parts = pending.compose().await.expect("text only");
        let ProviderStreamHandle { mut stream, worker } = controller
            .open_stream(pending.target, parts)
            .expect("stream opens");
        worker.await;

        let first = stream.recv().await.expect("first delta");
        assert!(controller.apply_event(first));
        assert_eq!(controller.cancel_turn(), Some(pending.target));

        let late = stream.recv().await.expect("second delta");
        assert!(!controller.apply_event(late));

        let reply = controller
            .store()
            .get(pending.assistant_message_id)
            .expect("reply present");
        assert_eq!(reply.text, "one");
        assert_eq!(reply.status, MessageStatus::Cancelled);
        assert!(controller.state().is_idle());
        assert!(controller.session().expect("session").history().is_empty());
        assert_eq!(controller.cancel_turn(), None);
    }

    #[tokio::test]
    async fn completed_turns_are_committed_to_history() {
        let provider = ScriptedProvider::new(vec![
            Reply::Chunks(vec!["first reply"]),
            Reply::ErrorAfter(Vec::new(), "nope"),
        ]);
        let mut controller = controller_with(provider);

        controller.send("one", None).await;
        controller.send("two", None).await;

        let history = controller.session().expect("session").history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].parts, vec![Part::text("first reply")]);
    }

    #[tokio::test]
    async fn attachment_only_submit_sends_a_single_inline_part() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("photo.png");
        std::fs::write(&path, b"png").expect("write fixture");
        let attachment = Attachment::from_path(&path).expect("png accepted");
        let provider = ScriptedProvider::new(Vec::new());
        let mut controller = controller_with(provider);

        let pending = controller
            .begin_turn(" \n ", Some(attachment))
            .expect("attachment alone is enough");
        let parts = pending.compose().await.expect("inline data");

        assert_eq!(parts.len(), 1);
        assert!(matches!(parts[0], Part::InlineData(_)));
        let user = &controller.messages()[1];
        assert_eq!(
            user.attachment.as_ref().map(|meta| meta.name.as_str()),
            Some("photo.png")
        );
    }

    #[test]
    fn failure_annotation_format() {
        assert_eq!(
            annotate_failure("", "boom"),
            "Sorry, something went wrong. boom"
        );
        assert_eq!(
            annotate_failure("partial", "boom"),
            "partial\n\nSorry, something went wrong. boom"
        );
    }
}
