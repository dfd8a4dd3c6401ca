use crate::error::{ReconcileError, Result};
use crate::traits::ResourceStore;
use async_trait::async_trait;
use kube::Resource;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tenant_rbac_core::{Namespace, ObjectKey, RoleBinding, Tenant};
use tokio::sync::RwLock;
use tracing::debug;

/// A successful write recorded by `MemoryStore`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    CreateNamespace(String),
    UpdateNamespace(String),
    CreateRoleBinding(ObjectKey),
    UpdateRoleBinding(ObjectKey),
}

impl StoreCall {
    pub fn is_create(&self) -> bool {
        matches!(
            self,
            StoreCall::CreateNamespace(_) | StoreCall::CreateRoleBinding(_)
        )
    }
}

/// Store operations that can be made to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    GetTenant,
    GetNamespace,
    CreateNamespace,
    UpdateNamespace,
    GetRoleBinding,
    CreateRoleBinding,
    UpdateRoleBinding,
}

#[derive(Default)]
struct StoreState {
    tenants: HashMap<String, Tenant>,
    namespaces: HashMap<String, Namespace>,
    role_bindings: HashMap<ObjectKey, RoleBinding>,
    next_version: u64,
    next_uid: u64,
    journal: Vec<StoreCall>,
    failures: HashSet<(StoreOp, String)>,
}

impl StoreState {
    fn bump_version(&mut self) -> String {
        self.next_version += 1;
        self.next_version.to_string()
    }

    fn stamp<K: Resource>(&mut self, obj: &mut K) {
        if obj.meta().uid.is_none() {
            self.next_uid += 1;
            obj.meta_mut().uid = Some(format!("uid-{}", self.next_uid));
        }
        obj.meta_mut().resource_version = Some(self.bump_version());
    }

    fn check_failure(&self, op: StoreOp, key: &str) -> Result<()> {
        if self.failures.contains(&(op, key.to_string())) {
            return Err(ReconcileError::transport(
                format!("injected failure for {:?} on {}", op, key),
                None,
            ));
        }
        Ok(())
    }
}

/// In-memory resource store for testing
///
/// Behaves like an API server for the calls the engine makes: resource
/// versions increase monotonically, updates with a stale resource version are
/// rejected with `Conflict`, duplicate creates with `AlreadyExists`. Every
/// successful write is appended to a journal, and failures can be injected
/// per operation and key.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<StoreState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a Tenant, assigning uid and resource version
    pub async fn put_tenant(&self, mut tenant: Tenant) -> Tenant {
        let mut state = self.state.write().await;
        state.stamp(&mut tenant);
        let name = tenant.metadata.name.clone().unwrap_or_default();
        state.tenants.insert(name, tenant.clone());
        tenant
    }

    pub async fn remove_tenant(&self, name: &str) -> Option<Tenant> {
        self.state.write().await.tenants.remove(name)
    }

    /// Seed a Namespace without journaling it
    pub async fn put_namespace(&self, mut namespace: Namespace) -> Namespace {
        let mut state = self.state.write().await;
        state.stamp(&mut namespace);
        let name = namespace.metadata.name.clone().unwrap_or_default();
        state.namespaces.insert(name, namespace.clone());
        namespace
    }

    /// Seed a RoleBinding without journaling it
    pub async fn put_role_binding(&self, mut role_binding: RoleBinding) -> RoleBinding {
        let mut state = self.state.write().await;
        state.stamp(&mut role_binding);
        state
            .role_bindings
            .insert(ObjectKey::of(&role_binding), role_binding.clone());
        role_binding
    }

    /// Remove a RoleBinding out of band, as a human or another controller would
    pub async fn delete_role_binding(&self, namespace: &str, name: &str) -> Option<RoleBinding> {
        self.state
            .write()
            .await
            .role_bindings
            .remove(&ObjectKey::new(namespace, name))
    }

    pub async fn namespace(&self, name: &str) -> Option<Namespace> {
        self.state.read().await.namespaces.get(name).cloned()
    }

    pub async fn role_binding(&self, namespace: &str, name: &str) -> Option<RoleBinding> {
        self.state
            .read()
            .await
            .role_bindings
            .get(&ObjectKey::new(namespace, name))
            .cloned()
    }

    pub async fn role_binding_count(&self) -> usize {
        self.state.read().await.role_bindings.len()
    }

    /// Successful writes so far, in order
    pub async fn journal(&self) -> Vec<StoreCall> {
        self.state.read().await.journal.clone()
    }

    pub async fn clear_journal(&self) {
        self.state.write().await.journal.clear();
    }

    /// Make `op` fail with a transport error for `key` (`name` or `namespace/name`)
    pub async fn fail_on(&self, op: StoreOp, key: impl Into<String>) {
        self.state.write().await.failures.insert((op, key.into()));
    }

    pub async fn clear_failures(&self) {
        self.state.write().await.failures.clear();
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get_tenant(&self, name: &str) -> Result<Tenant> {
        let state = self.state.read().await;
        state.check_failure(StoreOp::GetTenant, name)?;
        state
            .tenants
            .get(name)
            .cloned()
            .ok_or_else(|| ReconcileError::not_found("Tenant", name))
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        let state = self.state.read().await;
        let mut tenants: Vec<Tenant> = state.tenants.values().cloned().collect();
        tenants.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        Ok(tenants)
    }

    async fn get_namespace(&self, name: &str) -> Result<Namespace> {
        let state = self.state.read().await;
        state.check_failure(StoreOp::GetNamespace, name)?;
        state
            .namespaces
            .get(name)
            .cloned()
            .ok_or_else(|| ReconcileError::not_found("Namespace", name))
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace> {
        let mut state = self.state.write().await;
        let name = namespace.metadata.name.clone().unwrap_or_default();
        state.check_failure(StoreOp::CreateNamespace, &name)?;
        if state.namespaces.contains_key(&name) {
            return Err(ReconcileError::already_exists("Namespace", name));
        }

        let mut created = namespace.clone();
        state.stamp(&mut created);
        state.namespaces.insert(name.clone(), created.clone());
        state.journal.push(StoreCall::CreateNamespace(name.clone()));
        debug!("Memory: namespace created: {}", name);
        Ok(created)
    }

    async fn update_namespace(&self, namespace: &Namespace) -> Result<Namespace> {
        let mut state = self.state.write().await;
        let name = namespace.metadata.name.clone().unwrap_or_default();
        state.check_failure(StoreOp::UpdateNamespace, &name)?;

        let current = state
            .namespaces
            .get(&name)
            .ok_or_else(|| ReconcileError::not_found("Namespace", &name))?;
        if current.metadata.resource_version != namespace.metadata.resource_version {
            return Err(ReconcileError::conflict(
                "Namespace",
                &name,
                namespace.metadata.resource_version.clone().unwrap_or_default(),
            ));
        }

        let mut updated = namespace.clone();
        updated.metadata.uid = current.metadata.uid.clone();
        updated.metadata.resource_version = Some(state.bump_version());
        state.namespaces.insert(name.clone(), updated.clone());
        state.journal.push(StoreCall::UpdateNamespace(name.clone()));
        debug!("Memory: namespace updated: {}", name);
        Ok(updated)
    }

    async fn get_role_binding(&self, namespace: &str, name: &str) -> Result<RoleBinding> {
        let state = self.state.read().await;
        let key = ObjectKey::new(namespace, name);
        state.check_failure(StoreOp::GetRoleBinding, &key.to_string())?;
        state
            .role_bindings
            .get(&key)
            .cloned()
            .ok_or_else(|| ReconcileError::not_found("RoleBinding", key.to_string()))
    }

    async fn create_role_binding(&self, role_binding: &RoleBinding) -> Result<RoleBinding> {
        let mut state = self.state.write().await;
        let key = ObjectKey::of(role_binding);
        state.check_failure(StoreOp::CreateRoleBinding, &key.to_string())?;
        if state.role_bindings.contains_key(&key) {
            return Err(ReconcileError::already_exists(
                "RoleBinding",
                key.to_string(),
            ));
        }

        let mut created = role_binding.clone();
        state.stamp(&mut created);
        state.role_bindings.insert(key.clone(), created.clone());
        debug!("Memory: role binding created: {}", key);
        state.journal.push(StoreCall::CreateRoleBinding(key));
        Ok(created)
    }

    async fn update_role_binding(&self, role_binding: &RoleBinding) -> Result<RoleBinding> {
        let mut state = self.state.write().await;
        let key = ObjectKey::of(role_binding);
        state.check_failure(StoreOp::UpdateRoleBinding, &key.to_string())?;

        let current = state
            .role_bindings
            .get(&key)
            .ok_or_else(|| ReconcileError::not_found("RoleBinding", key.to_string()))?;
        if current.metadata.resource_version != role_binding.metadata.resource_version {
            return Err(ReconcileError::conflict(
                "RoleBinding",
                key.to_string(),
                role_binding
                    .metadata
                    .resource_version
                    .clone()
                    .unwrap_or_default(),
            ));
        }

        let mut updated = role_binding.clone();
        updated.metadata.uid = current.metadata.uid.clone();
        updated.metadata.resource_version = Some(state.bump_version());
        state.role_bindings.insert(key.clone(), updated.clone());
        debug!("Memory: role binding updated: {}", key);
        state.journal.push(StoreCall::UpdateRoleBinding(key));
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenant_rbac_core::TenantSpec;

    fn make_binding(namespace: &str, name: &str) -> RoleBinding {
        let mut rb = RoleBinding::default();
        rb.metadata.name = Some(name.to_string());
        rb.metadata.namespace = Some(namespace.to_string());
        rb
    }

    #[tokio::test]
    async fn test_create_then_get_role_binding() {
        let store = MemoryStore::new();
        let created = store
            .create_role_binding(&make_binding("ns1", "t1-edit"))
            .await
            .unwrap();
        assert!(created.metadata.resource_version.is_some());
        assert!(created.metadata.uid.is_some());

        let fetched = store.get_role_binding("ns1", "t1-edit").await.unwrap();
        assert_eq!(fetched, created);
        assert_eq!(
            store.journal().await,
            vec![StoreCall::CreateRoleBinding(ObjectKey::new("ns1", "t1-edit"))]
        );
    }

    #[tokio::test]
    async fn test_missing_resources_return_not_found() {
        let store = MemoryStore::new();
        assert!(store.get_tenant("t1").await.unwrap_err().is_not_found());
        assert!(store.get_namespace("ns1").await.unwrap_err().is_not_found());
        assert!(store
            .get_role_binding("ns1", "t1-edit")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_duplicate_create_returns_already_exists() {
        let store = MemoryStore::new();
        let rb = make_binding("ns1", "t1-edit");
        store.create_role_binding(&rb).await.unwrap();
        assert!(matches!(
            store.create_role_binding(&rb).await.unwrap_err(),
            ReconcileError::AlreadyExists { .. }
        ));
    }

    #[tokio::test]
    async fn test_stale_update_is_conflict() {
        let store = MemoryStore::new();
        let created = store
            .create_role_binding(&make_binding("ns1", "t1-edit"))
            .await
            .unwrap();

        let first = store.update_role_binding(&created).await.unwrap();
        assert_ne!(
            first.metadata.resource_version,
            created.metadata.resource_version
        );

        let err = store.update_role_binding(&created).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_update_keeps_server_assigned_uid() {
        let store = MemoryStore::new();
        let mut ns = Namespace::default();
        ns.metadata.name = Some("ns1".to_string());
        let created = store.create_namespace(&ns).await.unwrap();
        assert!(created.metadata.uid.is_some());

        let mut changed = created.clone();
        changed.metadata.uid = None;
        changed.metadata.labels = Some([("k".to_string(), "v".to_string())].into());
        let updated = store.update_namespace(&changed).await.unwrap();

        assert_eq!(updated.metadata.uid, created.metadata.uid);
        assert_eq!(
            store.namespace("ns1").await.unwrap().metadata.uid,
            created.metadata.uid
        );
        assert_eq!(
            store.journal().await,
            vec![
                StoreCall::CreateNamespace("ns1".to_string()),
                StoreCall::UpdateNamespace("ns1".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_seeding_is_not_journaled() {
        let store = MemoryStore::new();
        store
            .put_tenant(Tenant::new("t1", TenantSpec::default()))
            .await;
        store.put_role_binding(make_binding("ns1", "x")).await;
        assert!(store.journal().await.is_empty());
        assert!(store.get_tenant("t1").await.unwrap().metadata.uid.is_some());
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let store = MemoryStore::new();
        store.fail_on(StoreOp::CreateRoleBinding, "ns1/t1-edit").await;

        let err = store
            .create_role_binding(&make_binding("ns1", "t1-edit"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Transport { .. }));
        assert_eq!(store.role_binding_count().await, 0);

        store.clear_failures().await;
        store
            .create_role_binding(&make_binding("ns1", "t1-edit"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_tenants_sorted_by_name() {
        let store = MemoryStore::new();
        store
            .put_tenant(Tenant::new("b", TenantSpec::default()))
            .await;
        store
            .put_tenant(Tenant::new("a", TenantSpec::default()))
            .await;

        let names: Vec<_> = store
            .list_tenants()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.metadata.name.unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
