//! File and directory naming for the day-partitioned store.
//!
//! Record files are named `<epoch>_<messageKey>_<senderKey>.<ext>` and live
//! under `YYYYMMDD` partition directories. `senderKey` never contains `_`, so
//! a name splits unambiguously on the first and last underscore.
//!
//! Sanitizing is lossy (`a/b` and `a-b` share the key `a-b`). When a file name
//! is already taken by a different message, the key gets a `~<digest>` suffix
//! derived from the raw id; `~` never survives sanitizing, so suffixed keys
//! cannot collide with plain ones.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

const PARTITION_FORMAT: &str = "%Y%m%d";
const DIGEST_SEPARATOR: char = '~';

pub fn partition_name(date: NaiveDate) -> String {
    date.format(PARTITION_FORMAT).to_string()
}

pub fn parse_partition_name(name: &str) -> Option<NaiveDate> {
    if name.len() != 8 || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(name, PARTITION_FORMAT).ok()
}

/// File-name form of a message id.
pub fn message_key(message_id: &str) -> String {
    let key = sanitize(message_id, |c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if key.is_empty() { "message".to_string() } else { key }
}

/// Message key carrying a short digest of the raw id.
pub fn disambiguated_message_key(message_id: &str) -> String {
    let digest = Sha256::digest(message_id.as_bytes());
    let short: String = digest[..4].iter().map(|b| format!("{:02x}", b)).collect();
    format!("{}{}{}", message_key(message_id), DIGEST_SEPARATOR, short)
}

/// Whether a key parsed from a file name may belong to `message_id`.
pub fn matches_message_key(candidate: &str, message_id: &str) -> bool {
    let key = message_key(message_id);
    candidate == key
        || candidate
            .strip_prefix(key.as_str())
            .is_some_and(|rest| rest.starts_with(DIGEST_SEPARATOR))
}

/// The key without any digest suffix.
pub fn base_message_key(key: &str) -> &str {
    key.split_once(DIGEST_SEPARATOR).map_or(key, |(base, _)| base)
}

/// File-name form of a sender id.
pub fn sender_key(sender_id: &str) -> String {
    let key = sanitize(sender_id, |c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-'));
    if key.is_empty() { "unknown".to_string() } else { key }
}

fn sanitize(raw: &str, keep: impl Fn(char) -> bool) -> String {
    raw.chars().map(|c| if keep(c) { c } else { '-' }).collect()
}

pub fn record_file_name(epoch: i64, message_id: &str, sender_id: &str, extension: &str) -> String {
    file_name(epoch, &message_key(message_id), sender_id, extension)
}

/// Record file name using [`disambiguated_message_key`].
pub fn disambiguated_record_file_name(
    epoch: i64,
    message_id: &str,
    sender_id: &str,
    extension: &str,
) -> String {
    file_name(epoch, &disambiguated_message_key(message_id), sender_id, extension)
}

fn file_name(epoch: i64, key: &str, sender_id: &str, extension: &str) -> String {
    format!("{}_{}_{}.{}", epoch, key, sender_key(sender_id), extension)
}

/// Fields embedded in a record file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFileName {
    pub epoch: i64,
    pub message_key: String,
    pub sender_key: String,
}

/// Parses a record file name. Returns `None` for anything that is not a record
/// (temp files, lock files, foreign files).
pub fn parse_record_file_name(file_name: &str, extension: &str) -> Option<ParsedFileName> {
    let stem = file_name.strip_suffix(extension)?.strip_suffix('.')?;
    let (epoch, rest) = stem.split_once('_')?;
    let (message_key, sender_key) = rest.rsplit_once('_')?;
    if message_key.is_empty() || sender_key.is_empty() {
        return None;
    }
    Some(ParsedFileName {
        epoch: epoch.parse().ok()?,
        message_key: message_key.to_string(),
        sender_key: sender_key.to_string(),
    })
}
