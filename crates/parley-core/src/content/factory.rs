//! Construction of content payloads from a type tag and raw fields.
//!
//! Loading must never drop an item: unknown tags and fields that do not fit
//! the tagged variant fall back to a text payload carrying whatever readable
//! text the fields hold.

use super::model::{ContentPayload, ContentType};
use crate::error::Result;
use serde_json::{Value, json};
use std::str::FromStr;

/// Builds the payload for a known content type, failing on malformed fields.
pub fn make_content_typed(content_type: ContentType, fields: Value) -> Result<ContentPayload> {
    let fields = match fields {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    let tagged = json!({ "content_type": content_type.as_ref(), "data": fields });
    Ok(serde_json::from_value(tagged)?)
}

/// Builds the payload for a persisted `content_type` tag.
///
/// Never fails: an unknown tag or unparseable fields yield a text payload.
pub fn make_content(tag: &str, fields: Value) -> ContentPayload {
    let Ok(content_type) = ContentType::from_str(tag) else {
        tracing::warn!(
            "[ContentFactory] Unknown content type '{}', falling back to text",
            tag
        );
        return text_fallback(&fields);
    };

    match make_content_typed(content_type, fields.clone()) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(
                "[ContentFactory] Malformed '{}' fields ({}), falling back to text",
                tag,
                e
            );
            text_fallback(&fields)
        }
    }
}

/// Best readable text for a set of fields of unknown shape.
fn text_fallback(fields: &Value) -> ContentPayload {
    let text = match fields {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Object(map) => match map
            .get("text")
            .or_else(|| map.get("content"))
            .or_else(|| map.get("message"))
        {
            Some(Value::String(s)) => s.clone(),
            _ => fields.to_string(),
        },
        other => other.to_string(),
    };
    ContentPayload::text(text)
}
