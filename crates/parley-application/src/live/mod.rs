//! Live (still streaming) conversation state and render batching.

mod batcher;
mod conversation;

pub use batcher::{FlushCallback, UpdateBatcher};
pub use conversation::LiveConversation;
