//! Message domain module.
//!
//! - `envelope`: identity and provenance of one logical message (`MessageEnvelope`)
//! - `record`: one persisted fragment and its on-disk handle (`MessageRecord`, `RecordHandle`)

mod envelope;
mod record;

pub use envelope::{EVENT_TYPE_KEY, MessageEnvelope, USER_SENDER_ID};
pub use record::{MessageRecord, RecordHandle, RecordInfo};
