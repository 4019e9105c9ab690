/// Events emitted by the composer view.
pub mod events;
pub mod input;
pub mod scroll_manager;
/// Transcript rows, typing indicator and tail-following scroll.
pub mod transcript;
pub mod view;

pub use events::{Stop, Submit};
pub use input::MessageInput;
pub use scroll_manager::ScrollManager;
pub use transcript::TranscriptList;
pub use view::ChatView;
