//! Message grouping: collapsing streamed fragments into logical messages.

mod grouper;

pub use grouper::{GroupedMessage, MessageGroup, build_messages, group_records};
