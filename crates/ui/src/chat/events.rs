use aura_chat::Submission;
use aura_llm::StreamTarget;

/// Emitted when the composer hands over a sendable draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submit {
    pub submission: Submission,
}

/// Emitted when the user stops the in-flight reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Stop {
    pub target: StreamTarget,
}
