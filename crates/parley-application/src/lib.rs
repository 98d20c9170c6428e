//! Application layer of the parley history engine.
//!
//! Wires the file-backed store and the window index into per-project
//! histories, keeps an explicit registry of open histories, and drives the
//! live path that batches render notifications while content streams in.

pub mod history_usecase;
pub mod live;
pub mod registry;

pub use history_usecase::{ConversationHistory, MessageWindow};
pub use live::{LiveConversation, UpdateBatcher};
pub use registry::{HistoryKey, HistoryRegistry};
