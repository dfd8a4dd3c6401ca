//! Tenant RBAC Core - Fundamental types for the tenant RBAC operator
//!
//! This crate provides:
//! - The Tenant custom resource and its owner-reference helper
//! - The management label contract
//! - Typed watch events and resource keys
//! - Error types with miette diagnostics
//! - Serialization helpers

pub mod error;
pub mod events;
pub mod labels;
pub mod tenant;
pub mod types;

// Re-export commonly used types
pub use error::{Result, TenancyError};
pub use events::{ResourceEvent, WatchEventType};
pub use labels::{
    has_management_label, management_label_selector, management_labels, MANAGED_BY_LABEL,
    MANAGED_BY_VALUE,
};
pub use tenant::{tenant_owner_reference, NamespaceSpec, RoleSpec, Tenant, TenantSpec, TENANT_KIND};
pub use types::ObjectKey;

// Re-export k8s-openapi types for convenience
pub use k8s_openapi;
pub use k8s_openapi::api::core::v1::Namespace;
pub use k8s_openapi::api::rbac::v1::{RoleBinding, RoleRef, Subject};
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

/// Serialize a resource to YAML
pub fn to_yaml<T: serde::Serialize>(resource: &T) -> Result<String> {
    serde_yaml::to_string(resource).map_err(|e| {
        TenancyError::serialization_error(
            format!("Failed to serialize to YAML: {}", e),
            Some(Box::new(e)),
        )
    })
}

/// Deserialize a resource from YAML
pub fn from_yaml<T: for<'de> serde::Deserialize<'de>>(data: &str) -> Result<T> {
    serde_yaml::from_str(data).map_err(|e| {
        TenancyError::serialization_error(
            format!("Failed to deserialize from YAML: {}", e),
            Some(Box::new(e)),
        )
    })
}
