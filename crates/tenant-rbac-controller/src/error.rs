use miette::Diagnostic;
use thiserror::Error;

/// Error type for resource store calls and reconciliation passes
#[derive(Error, Debug, Diagnostic)]
pub enum ReconcileError {
    /// Resource not found
    #[error("{kind} not found: {key}")]
    #[diagnostic(
        code(tenant_rbac::controller::not_found),
        help("Absent resources are usually created by the next reconciliation pass")
    )]
    NotFound {
        #[allow(unused)]
        kind: String,
        #[allow(unused)]
        key: String,
    },

    /// Resource already exists
    #[error("{kind} already exists: {key}")]
    #[diagnostic(
        code(tenant_rbac::controller::already_exists),
        help("Another writer created the resource between our read and our create. The pass will be retried")
    )]
    AlreadyExists {
        #[allow(unused)]
        kind: String,
        #[allow(unused)]
        key: String,
    },

    /// Optimistic-concurrency conflict on update
    #[error("Conflict updating {kind} {key} at resourceVersion {resource_version}")]
    #[diagnostic(
        code(tenant_rbac::controller::conflict),
        help("The resource was modified concurrently. The notification will be redelivered and the pass retried with the latest resourceVersion")
    )]
    Conflict {
        #[allow(unused)]
        kind: String,
        #[allow(unused)]
        key: String,
        #[allow(unused)]
        resource_version: String,
    },

    /// API server unreachable or rejected the call
    #[error("Resource store call failed: {message}")]
    #[diagnostic(
        code(tenant_rbac::controller::transport),
        help("Check API server connectivity and the operator's RBAC permissions")
    )]
    Transport {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Object is missing metadata the store needs to address it
    #[error("Invalid {kind}: {message}")]
    #[diagnostic(
        code(tenant_rbac::controller::invalid_object),
        help("Namespaced objects must carry metadata.name and metadata.namespace")
    )]
    InvalidObject {
        #[allow(unused)]
        kind: String,
        #[allow(unused)]
        message: String,
    },

    /// Watch caches never reported synced
    #[error("Watch caches failed to sync after {attempts} attempts: {pending}")]
    #[diagnostic(
        code(tenant_rbac::controller::cache_sync_failed),
        help("Verify the Tenant CRD is installed and the operator may list/watch tenants and rolebindings")
    )]
    CacheSyncFailed {
        #[allow(unused)]
        attempts: u32,
        #[allow(unused)]
        pending: String,
    },

    /// Core library error
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] tenant_rbac_core::TenancyError),
}

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, ReconcileError>;

impl ReconcileError {
    pub fn not_found(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            key: key.into(),
        }
    }

    pub fn already_exists(kind: impl Into<String>, key: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            key: key.into(),
        }
    }

    pub fn conflict(
        kind: impl Into<String>,
        key: impl Into<String>,
        resource_version: impl Into<String>,
    ) -> Self {
        Self::Conflict {
            kind: kind.into(),
            key: key.into(),
            resource_version: resource_version.into(),
        }
    }

    pub fn transport(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Transport {
            message: message.into(),
            source,
        }
    }

    pub fn invalid_object(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidObject {
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn cache_sync_failed(attempts: u32, pending: impl Into<String>) -> Self {
        Self::CacheSyncFailed {
            attempts,
            pending: pending.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_predicates() {
        assert!(ReconcileError::not_found("RoleBinding", "ns1/t1-edit").is_not_found());
        assert!(!ReconcileError::not_found("RoleBinding", "ns1/t1-edit").is_conflict());
        assert!(ReconcileError::conflict("RoleBinding", "ns1/t1-edit", "4").is_conflict());
        assert!(!ReconcileError::transport("connection refused", None).is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = ReconcileError::not_found("Namespace", "ns1");
        assert_eq!(err.to_string(), "Namespace not found: ns1");

        let err = ReconcileError::cache_sync_failed(3, "rolebindings");
        assert_eq!(
            err.to_string(),
            "Watch caches failed to sync after 3 attempts: rolebindings"
        );
    }
}
