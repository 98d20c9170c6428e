//! Presentation seams: sender decoration and change notification.

use crate::content::ContentItem;
use crate::grouping::GroupedMessage;
use serde::{Deserialize, Serialize};

/// Display hints for a sender or a skill.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderDisplay {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_title: Option<String>,
}

/// Looks up display hints by sender or skill name.
///
/// Decoration is applied after merging and never affects merge results.
pub trait SenderMetadataResolver: Send + Sync {
    fn resolve_sender_metadata(&self, name: &str) -> Option<SenderDisplay>;
}

/// Resolver that decorates nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopResolver;

impl SenderMetadataResolver for NoopResolver {
    fn resolve_sender_metadata(&self, _name: &str) -> Option<SenderDisplay> {
        None
    }
}

/// Receives merged content whenever a message changes.
pub trait RenderSink: Send + Sync {
    fn on_items_changed(&self, message_id: &str, contents: &[ContentItem]);
}

/// Attaches display hints to a message (by sender name) and to every skill
/// aggregate in it (by skill name), recursively.
pub fn decorate_message(message: &mut GroupedMessage, resolver: &dyn SenderMetadataResolver) {
    message.display = resolver.resolve_sender_metadata(&message.envelope.sender_name);
    decorate_contents(&mut message.contents, resolver);
}

pub fn decorate_contents(contents: &mut [ContentItem], resolver: &dyn SenderMetadataResolver) {
    for item in contents {
        if let Some(skill) = item.as_skill_mut() {
            skill.display = resolver.resolve_sender_metadata(&skill.skill_name);
            decorate_contents(&mut skill.child_contents, resolver);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ContentPayload;
    use crate::message::MessageEnvelope;
    use crate::skill::SkillAggregate;
    use std::collections::HashMap;

    struct MapResolver(HashMap<&'static str, &'static str>);

    impl SenderMetadataResolver for MapResolver {
        fn resolve_sender_metadata(&self, name: &str) -> Option<SenderDisplay> {
            self.0.get(name).map(|color| SenderDisplay {
                color: Some(color.to_string()),
                ..Default::default()
            })
        }
    }

    #[test]
    fn test_decorates_sender_and_nested_skills() {
        let mut inner = SkillAggregate::new(Some("r2".into()), "fetch");
        inner.child_contents.push(ContentItem::text("t", "x"));
        let mut outer = SkillAggregate::new(Some("r1".into()), "research");
        outer
            .child_contents
            .push(ContentItem::new("inner", ContentPayload::Skill(inner)));

        let mut message = GroupedMessage {
            envelope: MessageEnvelope::new("m1", "agent-1", "Planner"),
            contents: vec![ContentItem::new("outer", ContentPayload::Skill(outer))],
            display: None,
        };
        let resolver = MapResolver(HashMap::from([
            ("Planner", "#112233"),
            ("fetch", "#445566"),
        ]));

        decorate_message(&mut message, &resolver);

        assert_eq!(message.display.unwrap().color.as_deref(), Some("#112233"));
        let outer = message.contents[0].as_skill().unwrap();
        assert!(outer.display.is_none());
        let inner = outer.child_contents[0].as_skill().unwrap();
        assert_eq!(
            inner.display.as_ref().unwrap().color.as_deref(),
            Some("#445566")
        );
    }

    #[test]
    fn test_noop_resolver() {
        assert!(NoopResolver.resolve_sender_metadata("anyone").is_none());
    }
}
