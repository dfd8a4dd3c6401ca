use kube::Resource;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Watch event type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchEventType {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for WatchEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchEventType::Added => write!(f, "ADDED"),
            WatchEventType::Modified => write!(f, "MODIFIED"),
            WatchEventType::Deleted => write!(f, "DELETED"),
        }
    }
}

/// A change notification for one resource, delivered by the informer layer.
///
/// Updates carry both the previously cached and the new object so consumers
/// can tell a real change from a resync replay.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent<K> {
    Added(K),
    Updated { old: K, new: K },
    Deleted(K),
}

impl<K: Resource> ResourceEvent<K> {
    pub fn event_type(&self) -> WatchEventType {
        match self {
            ResourceEvent::Added(_) => WatchEventType::Added,
            ResourceEvent::Updated { .. } => WatchEventType::Modified,
            ResourceEvent::Deleted(_) => WatchEventType::Deleted,
        }
    }

    /// The most recent state of the object (the new object for updates)
    pub fn object(&self) -> &K {
        match self {
            ResourceEvent::Added(obj) | ResourceEvent::Deleted(obj) => obj,
            ResourceEvent::Updated { new, .. } => new,
        }
    }

    /// True for an update whose old and new resource versions are equal
    pub fn is_resync(&self) -> bool {
        match self {
            ResourceEvent::Updated { old, new } => {
                old.meta().resource_version == new.meta().resource_version
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::rbac::v1::RoleBinding;

    fn make_binding(resource_version: &str) -> RoleBinding {
        let mut rb = RoleBinding::default();
        rb.metadata.name = Some("t1-edit".to_string());
        rb.metadata.namespace = Some("ns1".to_string());
        rb.metadata.resource_version = Some(resource_version.to_string());
        rb
    }

    #[test]
    fn test_update_with_same_version_is_resync() {
        let event = ResourceEvent::Updated {
            old: make_binding("7"),
            new: make_binding("7"),
        };
        assert!(event.is_resync());
        assert_eq!(event.event_type(), WatchEventType::Modified);
    }

    #[test]
    fn test_update_with_new_version_is_not_resync() {
        let event = ResourceEvent::Updated {
            old: make_binding("7"),
            new: make_binding("8"),
        };
        assert!(!event.is_resync());
        assert_eq!(
            event.object().metadata.resource_version.as_deref(),
            Some("8")
        );
    }

    #[test]
    fn test_added_and_deleted_are_never_resync() {
        assert!(!ResourceEvent::Added(make_binding("1")).is_resync());
        let deleted = ResourceEvent::Deleted(make_binding("1"));
        assert!(!deleted.is_resync());
        assert_eq!(deleted.event_type().to_string(), "DELETED");
    }
}
