use aura_llm::StreamTarget;

/// Stable identifier for one transcript entry.
///
/// Allocated from a counter that only grows, so ids double as insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub u64);

impl MessageId {
    /// Creates a typed message identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
}

/// Who authored a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sender {
    User,
    Assistant,
}

/// Display summary of the file sent with a user turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentMeta {
    pub name: String,
    pub mime_type: String,
    pub size_bytes: u64,
}

/// Lifecycle status for one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageStatus {
    Done,
    Streaming(StreamTarget),
    Error(String),
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub sender: Sender,
    pub text: String,
    pub attachment: Option<AttachmentMeta>,
    pub status: MessageStatus,
}

impl Message {
    /// Creates a finished user turn.
    pub fn user(
        id: MessageId,
        text: impl Into<String>,
        attachment: Option<AttachmentMeta>,
    ) -> Self {
        Self {
            id,
            sender: Sender::User,
            text: text.into(),
            attachment,
            status: MessageStatus::Done,
        }
    }

    /// Creates a finished assistant message, e.g. the greeting.
    pub fn assistant(id: MessageId, text: impl Into<String>) -> Self {
        Self {
            id,
            sender: Sender::Assistant,
            text: text.into(),
            attachment: None,
            status: MessageStatus::Done,
        }
    }

    /// Creates the empty assistant placeholder filled while a reply streams in.
    pub fn assistant_placeholder(id: MessageId, target: StreamTarget) -> Self {
        Self {
            id,
            sender: Sender::Assistant,
            text: String::new(),
            attachment: None,
            status: MessageStatus::Streaming(target),
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.status, MessageStatus::Streaming(_))
    }
}

/// Lifecycle of the single outgoing turn.
///
/// `Failed` is transient: the controller records the error and resets to
/// `Idle` in the same step, so callers only ever observe the first three.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    Sending(StreamTarget),
    Streaming(StreamTarget),
    Failed {
        target: StreamTarget,
        message: String,
    },
}

/// State transition input for the turn lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnTransition {
    Begin(StreamTarget),
    StreamOpened(StreamTarget),
    Complete(StreamTarget),
    Fail {
        target: StreamTarget,
        message: String,
    },
    Cancel(StreamTarget),
    ResetToIdle,
}

/// Rejection reason for illegal turn transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnRejection {
    Busy {
        active: StreamTarget,
        attempted: StreamTarget,
    },
    NoActiveTurn,
    TargetMismatch {
        active: StreamTarget,
        attempted: StreamTarget,
    },
    NotStreaming(StreamTarget),
    AlreadyStreaming(StreamTarget),
    /// Reset requested while a turn is still in flight.
    InFlight(StreamTarget),
}

pub type TurnTransitionResult = Result<TurnState, TurnRejection>;

impl TurnState {
    /// Returns the in-flight target for `Sending` and `Streaming`.
    pub fn active_target(&self) -> Option<StreamTarget> {
        match self {
            Self::Sending(target) | Self::Streaming(target) => Some(*target),
            Self::Idle | Self::Failed { .. } => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// True when incoming stream data belongs to the open stream.
    pub fn accepts_stream_event(&self, target: StreamTarget) -> bool {
        matches!(self, Self::Streaming(active) if *active == target)
    }

    /// Applies one transition deterministically.
    ///
    /// Only `Idle` may begin a turn. Every other transition must name the
    /// in-flight target exactly.
    pub fn apply(&self, transition: TurnTransition) -> TurnTransitionResult {
        match transition {
            TurnTransition::Begin(target) => self.apply_begin(target),
            TurnTransition::StreamOpened(target) => self.apply_stream_opened(target),
            TurnTransition::Complete(target) => self.apply_complete(target),
            TurnTransition::Fail { target, message } => self.apply_fail(target, message),
            TurnTransition::Cancel(target) => self.apply_cancel(target),
            TurnTransition::ResetToIdle => self.apply_reset(),
        }
    }

    fn apply_reset(&self) -> TurnTransitionResult {
        match self {
            Self::Idle | Self::Failed { .. } => Ok(Self::Idle),
            Self::Sending(active) | Self::Streaming(active) => {
                Err(TurnRejection::InFlight(*active))
            }
        }
    }

    fn apply_begin(&self, target: StreamTarget) -> TurnTransitionResult {
        match self {
            Self::Idle => Ok(Self::Sending(target)),
            Self::Sending(active) | Self::Streaming(active) => Err(TurnRejection::Busy {
                active: *active,
                attempted: target,
            }),
            Self::Failed { target: active, .. } => Err(TurnRejection::Busy {
                active: *active,
                attempted: target,
            }),
        }
    }

    fn apply_stream_opened(&self, target: StreamTarget) -> TurnTransitionResult {
        match self {
            Self::Sending(active) if *active == target => Ok(Self::Streaming(target)),
            Self::Streaming(active) if *active == target => {
                Err(TurnRejection::AlreadyStreaming(target))
            }
            Self::Sending(active) | Self::Streaming(active) => {
                Err(TurnRejection::TargetMismatch {
                    active: *active,
                    attempted: target,
                })
            }
            Self::Idle | Self::Failed { .. } => Err(TurnRejection::NoActiveTurn),
        }
    }

    fn apply_complete(&self, target: StreamTarget) -> TurnTransitionResult {
        match self {
            Self::Streaming(active) if *active == target => Ok(Self::Idle),
            Self::Sending(active) if *active == target => Err(TurnRejection::NotStreaming(target)),
            Self::Sending(active) | Self::Streaming(active) => {
                Err(TurnRejection::TargetMismatch {
                    active: *active,
                    attempted: target,
                })
            }
            Self::Idle | Self::Failed { .. } => Err(TurnRejection::NoActiveTurn),
        }
    }

    fn apply_fail(&self, target: StreamTarget, message: String) -> TurnTransitionResult {
        match self {
            Self::Sending(active) | Self::Streaming(active) if *active == target => {
                Ok(Self::Failed { target, message })
            }
            Self::Sending(active) | Self::Streaming(active) => {
                Err(TurnRejection::TargetMismatch {
                    active: *active,
                    attempted: target,
                })
            }
            Self::Idle | Self::Failed { .. } => Err(TurnRejection::NoActiveTurn),
        }
    }

    fn apply_cancel(&self, target: StreamTarget) -> TurnTransitionResult {
        match self {
            Self::Sending(active) | Self::Streaming(active) if *active == target => Ok(Self::Idle),
            Self::Sending(active) | Self::Streaming(active) => {
                Err(TurnRejection::TargetMismatch {
                    active: *active,
                    attempted: target,
                })
            }
            Self::Idle | Self::Failed { .. } => Err(TurnRejection::NoActiveTurn),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIRST: StreamTarget = StreamTarget::new(1);
    const SECOND: StreamTarget = StreamTarget::new(2);

    #[test]
    fn happy_path_returns_to_idle() {
        let sending = TurnState::Idle
            .apply(TurnTransition::Begin(FIRST))
            .expect("idle accepts begin");
        assert_eq!(sending, TurnState::Sending(FIRST));

        let streaming = sending
            .apply(TurnTransition::StreamOpened(FIRST))
            .expect("sending accepts stream open");
        assert!(streaming.accepts_stream_event(FIRST));
        assert!(!streaming.accepts_stream_event(SECOND));

        let done = streaming
            .apply(TurnTransition::Complete(FIRST))
            .expect("streaming accepts completion");
        assert!(done.is_idle());
    }

    #[test]
    fn second_begin_is_rejected_while_in_flight() {
        let sending = TurnState::Sending(FIRST);
        let streaming = TurnState::Streaming(FIRST);

        for state in [sending, streaming] {
            assert_eq!(
                state.apply(TurnTransition::Begin(SECOND)),
                Err(TurnRejection::Busy {
                    active: FIRST,
                    attempted: SECOND,
                })
            );
        }
    }

    #[test]
    fn failure_is_accepted_from_sending_and_streaming() {
        for state in [TurnState::Sending(FIRST), TurnState::Streaming(FIRST)] {
            let failed = state
                .apply(TurnTransition::Fail {
                    target: FIRST,
                    message: "boom".to_string(),
                })
                .expect("in-flight turn may fail");
            assert_eq!(failed.active_target(), None);
            assert_eq!(
                failed.apply(TurnTransition::ResetToIdle),
                Ok(TurnState::Idle)
            );
        }
    }

    #[test]
    fn reset_is_refused_while_in_flight() {
        assert_eq!(
            TurnState::Streaming(FIRST).apply(TurnTransition::ResetToIdle),
            Err(TurnRejection::InFlight(FIRST))
        );
        assert_eq!(
            TurnState::Idle.apply(TurnTransition::ResetToIdle),
            Ok(TurnState::Idle)
        );
    }

    #[test]
    fn terminal_transitions_require_matching_target() {
        let streaming = TurnState::Streaming(FIRST);

        assert_eq!(
            streaming.apply(TurnTransition::Complete(SECOND)),
            Err(TurnRejection::TargetMismatch {
                active: FIRST,
                attempted: SECOND,
            })
        );
        assert_eq!(
            streaming.apply(TurnTransition::Cancel(SECOND)),
            Err(TurnRejection::TargetMismatch {
                active: FIRST,
                attempted: SECOND,
            })
        );
        assert_eq!(
            TurnState::Idle.apply(TurnTransition::Complete(FIRST)),
            Err(TurnRejection::NoActiveTurn)
        );
    }

    #[test]
    fn completion_before_stream_opens_is_rejected() {
        assert_eq!(
            TurnState::Sending(FIRST).apply(TurnTransition::Complete(FIRST)),
            Err(TurnRejection::NotStreaming(FIRST))
        );
    }

    #[test]
    fn cancel_returns_straight_to_idle() {
        assert_eq!(
            TurnState::Sending(FIRST).apply(TurnTransition::Cancel(FIRST)),
            Ok(TurnState::Idle)
        );
        assert_eq!(
            TurnState::Streaming(FIRST).apply(TurnTransition::Cancel(FIRST)),
            Ok(TurnState::Idle)
        );
    }
}
