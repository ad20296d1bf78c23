use serde::{Deserialize, Serialize};

use crate::model::PathAddress;

/// Everything a tree model reports to its observers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    NodeInsertAfter {
        path: PathAddress,
    },
    NodeMoveBefore {
        source: PathAddress,
    },
    NodeMoveAfter {
        source: PathAddress,
        target: PathAddress,
    },
    NodeCloneAfter {
        source: PathAddress,
        target: PathAddress,
    },
    NodeRemoveBefore {
        path: PathAddress,
    },
    /// `path` no longer resolves once this is delivered
    NodeRemoveAfter {
        path: PathAddress,
    },
    ValueChangeBefore {
        path: PathAddress,
        value_name: String,
    },
    ValueChangeAfter {
        path: PathAddress,
        value_name: String,
    },
    KeyValueChangeAfter {
        path: PathAddress,
        value_name: String,
    },
    /// The derived-id slot changed, so the instance may now resolve to
    /// another node type of its chain
    VariantValueChangeAfter {
        path: PathAddress,
        value_name: String,
    },
    CurrentChanged {
        path: Option<PathAddress>,
        forced: bool,
    },
    RootChanged,
    SchemaChanged,
    Destroyed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    NodeInsertAfter,
    NodeMoveBefore,
    NodeMoveAfter,
    NodeCloneAfter,
    NodeRemoveBefore,
    NodeRemoveAfter,
    ValueChangeBefore,
    ValueChangeAfter,
    KeyValueChangeAfter,
    VariantValueChangeAfter,
    CurrentChanged,
    RootChanged,
    SchemaChanged,
    Destroyed,
}

impl Notification {
    pub fn kind(&self) -> NotificationKind {
        match self {
            Notification::NodeInsertAfter { .. } => NotificationKind::NodeInsertAfter,
            Notification::NodeMoveBefore { .. } => NotificationKind::NodeMoveBefore,
            Notification::NodeMoveAfter { .. } => NotificationKind::NodeMoveAfter,
            Notification::NodeCloneAfter { .. } => NotificationKind::NodeCloneAfter,
            Notification::NodeRemoveBefore { .. } => NotificationKind::NodeRemoveBefore,
            Notification::NodeRemoveAfter { .. } => NotificationKind::NodeRemoveAfter,
            Notification::ValueChangeBefore { .. } => NotificationKind::ValueChangeBefore,
            Notification::ValueChangeAfter { .. } => NotificationKind::ValueChangeAfter,
            Notification::KeyValueChangeAfter { .. } => NotificationKind::KeyValueChangeAfter,
            Notification::VariantValueChangeAfter { .. } => NotificationKind::VariantValueChangeAfter,
            Notification::CurrentChanged { .. } => NotificationKind::CurrentChanged,
            Notification::RootChanged => NotificationKind::RootChanged,
            Notification::SchemaChanged => NotificationKind::SchemaChanged,
            Notification::Destroyed => NotificationKind::Destroyed,
        }
    }

    /// Address and slot name of a value notification
    pub fn value_target(&self) -> Option<(&PathAddress, &str)> {
        match self {
            Notification::ValueChangeBefore { path, value_name }
            | Notification::ValueChangeAfter { path, value_name }
            | Notification::KeyValueChangeAfter { path, value_name }
            | Notification::VariantValueChangeAfter { path, value_name } => {
                Some((path, value_name.as_str()))
            }
            _ => None,
        }
    }

    pub fn is_structural(&self) -> bool {
        matches!(
            self.kind(),
            NotificationKind::NodeInsertAfter
                | NotificationKind::NodeMoveBefore
                | NotificationKind::NodeMoveAfter
                | NotificationKind::NodeCloneAfter
                | NotificationKind::NodeRemoveBefore
                | NotificationKind::NodeRemoveAfter
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_target() {
        let path = PathAddress::root().child("Item", 0);
        let notification = Notification::ValueChangeAfter {
            path: path.clone(),
            value_name: "name".to_string(),
        };
        assert_eq!(notification.value_target(), Some((&path, "name")));
        assert!(!notification.is_structural());
        assert_eq!(Notification::RootChanged.value_target(), None);
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(Notification::NodeRemoveBefore {
            path: PathAddress::root().child("Item", 1),
        })
        .unwrap();
        assert_eq!(json["type"], "node_remove_before");
        assert_eq!(json["path"][0]["name"], "Item");
    }
}
