use crate::error::Result;
use async_trait::async_trait;
use tenant_rbac_core::{Namespace, RoleBinding, Tenant};

/// Trait for the cluster resource store the engine reads from and writes to
///
/// This abstracts over the API server so reconciliation can be tested with
/// `MemoryStore`. Every call is a single blocking round trip without retries.
/// A missing resource is reported as `ReconcileError::NotFound`, a stale
/// resource version on update as `ReconcileError::Conflict`.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    // --- Tenants ---

    /// Fetch a Tenant by name, bypassing any local cache
    async fn get_tenant(&self, name: &str) -> Result<Tenant>;

    /// List all Tenants
    async fn list_tenants(&self) -> Result<Vec<Tenant>>;

    // --- Namespaces ---

    /// Fetch a Namespace by name
    async fn get_namespace(&self, name: &str) -> Result<Namespace>;

    /// Create a Namespace
    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace>;

    /// Replace a Namespace; `metadata.resourceVersion` must be the last observed one
    async fn update_namespace(&self, namespace: &Namespace) -> Result<Namespace>;

    // --- RoleBindings ---

    /// Fetch a RoleBinding by namespace and name
    async fn get_role_binding(&self, namespace: &str, name: &str) -> Result<RoleBinding>;

    /// Create a RoleBinding
    async fn create_role_binding(&self, role_binding: &RoleBinding) -> Result<RoleBinding>;

    /// Replace a RoleBinding; `metadata.resourceVersion` must be the last observed one
    async fn update_role_binding(&self, role_binding: &RoleBinding) -> Result<RoleBinding>;
}
