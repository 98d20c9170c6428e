//! Conversation history domain module.
//!
//! - `naming`: partition directory and record file naming
//! - `repository`: the `HistoryRepository` persistence contract
//! - `window`: cursor/window queries over a repository
//! - `sink`: sender decoration and render notification seams

pub mod naming;
mod repository;
mod sink;
mod window;

pub use repository::HistoryRepository;
pub use sink::{
    NoopResolver, RenderSink, SenderDisplay, SenderMetadataResolver, decorate_contents,
    decorate_message,
};
pub use window::{HistoryWindow, WindowIndex};
