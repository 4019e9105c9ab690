#![deny(unsafe_code)]

/// Window shell: header, chat view, global actions.
pub mod app;
/// Transcript, composer and the view that drives the chat controller.
pub mod chat;
