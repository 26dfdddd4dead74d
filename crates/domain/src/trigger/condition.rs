//! Trigger condition — which mutation events activate a trigger.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::mutation::{EventKind, MutationEvent};
use crate::node::{validate_form, validate_prop_path};
use crate::tag::TagPattern;

/// The condition kind together with its target object.
///
/// Each variant carries exactly the target fields its kind requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cond", rename_all = "snake_case")]
pub enum TriggerCondition {
    /// A node of `form` was created.
    NodeAdd { form: String },
    /// A node of `form` was deleted.
    NodeDel { form: String },
    /// The property at the full path `prop` was set or overwritten.
    PropSet { prop: String },
    /// A tag matching `tag` was added, optionally only on nodes of `form`.
    TagAdd {
        tag: TagPattern,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        form: Option<String>,
    },
    /// A tag matching `tag` was removed, optionally only on nodes of `form`.
    TagDel {
        tag: TagPattern,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        form: Option<String>,
    },
}

impl TriggerCondition {
    /// The event kind this condition listens for.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::NodeAdd { .. } => EventKind::NodeAdd,
            Self::NodeDel { .. } => EventKind::NodeDel,
            Self::PropSet { .. } => EventKind::PropSet,
            Self::TagAdd { .. } => EventKind::TagAdd,
            Self::TagDel { .. } => EventKind::TagDel,
        }
    }

    /// Check that the target object is well formed.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for a malformed form or property path.
    /// Tag patterns are validated when they are parsed.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::NodeAdd { form } | Self::NodeDel { form } => validate_form(form),
            Self::PropSet { prop } => validate_prop_path(prop),
            Self::TagAdd { form, .. } | Self::TagDel { form, .. } => {
                form.as_deref().map_or(Ok(()), validate_form)
            }
        }
    }

    /// Check whether this condition matches a canonical event.
    ///
    /// An event whose target field is missing never matches; that is a
    /// no-op rather than an error.
    #[must_use]
    pub fn matches(&self, event: &MutationEvent) -> bool {
        if self.kind() != event.kind {
            return false;
        }
        match self {
            Self::NodeAdd { form } | Self::NodeDel { form } => *form == event.form,
            Self::PropSet { prop } => event.prop.as_deref() == Some(prop.as_str()),
            Self::TagAdd { tag, form } | Self::TagDel { tag, form } => {
                if form.as_ref().is_some_and(|f| *f != event.form) {
                    return false;
                }
                event.tag.as_deref().is_some_and(|t| tag.matches(t))
            }
        }
    }
}

impl std::fmt::Display for TriggerCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NodeAdd { form } | Self::NodeDel { form } => write!(f, "{}({form})", self.kind()),
            Self::PropSet { prop } => write!(f, "{}({prop})", self.kind()),
            Self::TagAdd { tag, form } | Self::TagDel { tag, form } => match form {
                Some(form) => write!(f, "{}({form}#{tag})", self.kind()),
                None => write!(f, "{}(#{tag})", self.kind()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ViewId;
    use crate::mutation::{RawMutation, TxnId};
    use crate::node::NodeRef;

    fn event(raw: RawMutation) -> MutationEvent {
        MutationEvent::normalize(ViewId::new(), TxnId(1), raw).unwrap()
    }

    fn tag_added(form: &str, tag: &str) -> MutationEvent {
        event(RawMutation::TagAdded {
            node: NodeRef::new(form, "x"),
            tag: tag.to_string(),
            interval: None,
        })
    }

    #[test]
    fn should_match_node_add_on_same_form_only() {
        let cond = TriggerCondition::NodeAdd {
            form: "inet:ipv4".to_string(),
        };
        let hit = event(RawMutation::NodeAdded {
            node: NodeRef::new("inet:ipv4", "1.2.3.4"),
        });
        let miss = event(RawMutation::NodeAdded {
            node: NodeRef::new("inet:fqdn", "vertex.link"),
        });
        assert!(cond.matches(&hit));
        assert!(!cond.matches(&miss));
    }

    #[test]
    fn should_not_match_node_del_event_with_node_add_condition() {
        let cond = TriggerCondition::NodeAdd {
            form: "inet:ipv4".to_string(),
        };
        let ev = event(RawMutation::NodeDeleted {
            node: NodeRef::new("inet:ipv4", "1.2.3.4"),
        });
        assert!(!cond.matches(&ev));
    }

    #[test]
    fn should_match_prop_set_on_full_path() {
        let cond = TriggerCondition::PropSet {
            prop: "inet:ipv4:asn".to_string(),
        };
        let ev = event(RawMutation::PropSet {
            node: NodeRef::new("inet:ipv4", "1.2.3.4"),
            prop: "asn".to_string(),
            old: None,
            new: serde_json::json!(10),
        });
        assert!(cond.matches(&ev));
    }

    #[test]
    fn should_match_unqualified_tag_pattern_on_any_form() {
        let cond = TriggerCondition::TagAdd {
            tag: TagPattern::parse("cno.*").unwrap(),
            form: None,
        };
        assert!(cond.matches(&tag_added("inet:ipv4", "cno.mal")));
        assert!(cond.matches(&tag_added("inet:fqdn", "cno.mal")));
        assert!(!cond.matches(&tag_added("inet:fqdn", "cno")));
    }

    #[test]
    fn should_respect_form_qualifier_on_tag_conditions() {
        let cond = TriggerCondition::TagAdd {
            tag: TagPattern::parse("cno.mal").unwrap(),
            form: Some("inet:fqdn".to_string()),
        };
        assert!(cond.matches(&tag_added("inet:fqdn", "cno.mal")));
        assert!(!cond.matches(&tag_added("inet:ipv4", "cno.mal")));
    }

    #[test]
    fn should_reject_malformed_targets() {
        let bad = [
            TriggerCondition::NodeAdd {
                form: "Not A Form".to_string(),
            },
            TriggerCondition::PropSet {
                prop: "asn".to_string(),
            },
            TriggerCondition::TagDel {
                tag: TagPattern::parse("cno").unwrap(),
                form: Some(String::new()),
            },
        ];
        for cond in bad {
            assert!(cond.validate().is_err(), "{cond} should be rejected");
        }
    }

    #[test]
    fn should_deserialize_tagged_condition() {
        let cond: TriggerCondition =
            serde_json::from_str(r##"{"cond":"tag_add","tag":"#CNO.**"}"##).unwrap();
        assert_eq!(
            cond,
            TriggerCondition::TagAdd {
                tag: TagPattern::parse("cno.**").unwrap(),
                form: None,
            }
        );
    }

    #[test]
    fn should_display_condition_variants() {
        let cond = TriggerCondition::TagDel {
            tag: TagPattern::parse("cno").unwrap(),
            form: Some("inet:fqdn".to_string()),
        };
        assert_eq!(cond.to_string(), "tag:del(inet:fqdn#cno)");
    }
}
