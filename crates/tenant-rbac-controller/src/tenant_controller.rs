use crate::compiler::{compile, ChildKind, ClusterRoleFilter};
use crate::error::Result;
use crate::lock::ConvergenceLock;
use crate::namespace::{reconcile_namespace, NamespaceAction};
use crate::role_binding::{reconcile_role_binding, RoleBindingAction};
use crate::traits::ResourceStore;
use kube::ResourceExt;
use std::sync::Arc;
use tenant_rbac_core::{tenant_owner_reference, ObjectKey, ResourceEvent, Tenant};
use tracing::{debug, error, info, warn};

/// Summary of one primary reconciliation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    pub tenant: String,
    /// False when the tenant no longer exists and the pass short-circuited
    pub found: bool,
    pub namespaces: Vec<(String, NamespaceAction)>,
    /// Namespaces whose reconciliation failed; the pass carried on
    pub namespace_failures: Vec<String>,
    pub role_bindings: Vec<(ObjectKey, RoleBindingAction)>,
}

impl PassReport {
    /// Number of create/update calls the pass issued
    pub fn writes(&self) -> usize {
        let ns = self
            .namespaces
            .iter()
            .filter(|(_, a)| *a != NamespaceAction::Unchanged)
            .count();
        let rb = self
            .role_bindings
            .iter()
            .filter(|(_, a)| matches!(a, RoleBindingAction::Created | RoleBindingAction::Updated))
            .count();
        ns + rb
    }
}

/// Outcome of reconciling every tenant once
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResyncSummary {
    pub reconciled: usize,
    pub failed: Vec<String>,
}

/// Primary controller, driven by notifications on Tenant resources
pub struct TenantController {
    store: Arc<dyn ResourceStore>,
    lock: ConvergenceLock,
}

impl TenantController {
    pub fn new(store: Arc<dyn ResourceStore>, lock: ConvergenceLock) -> Self {
        Self { store, lock }
    }

    /// Handle one Tenant notification.
    ///
    /// Every event kind triggers a full pass against the freshest Tenant;
    /// a deleted Tenant is reported as not found and is not an error.
    pub async fn handle(&self, event: &ResourceEvent<Tenant>) -> Result<PassReport> {
        let name = event.object().name_any();
        debug!("Tenant {} event: {}", name, event.event_type());
        self.reconcile(&name).await
    }

    /// Run one reconciliation pass for the named Tenant.
    ///
    /// Namespace failures are logged and skipped; the first role binding
    /// failure aborts the pass and is returned so the notification can be
    /// redelivered.
    pub async fn reconcile(&self, name: &str) -> Result<PassReport> {
        let _guard = self.lock.acquire().await;

        let mut report = PassReport {
            tenant: name.to_string(),
            ..Default::default()
        };

        let tenant = match self.store.get_tenant(name).await {
            Ok(t) => t,
            Err(e) if e.is_not_found() => {
                info!(
                    "Tenant {} not found. Ignoring since object must be deleted",
                    name
                );
                return Ok(report);
            }
            Err(e) => return Err(e),
        };
        report.found = true;

        info!("Reconciling tenant {}", name);
        let owner = tenant_owner_reference(&tenant)?;
        let desired = compile(
            &tenant,
            &[ChildKind::Namespace, ChildKind::RoleBinding],
            &ClusterRoleFilter::All,
            &owner,
        );

        for ns in &desired.namespaces {
            match reconcile_namespace(self.store.as_ref(), ns).await {
                Ok(action) => report.namespaces.push((ns.name.clone(), action)),
                Err(e) => {
                    warn!(
                        "Failed to reconcile namespace {} for tenant {}: {}",
                        ns.name, name, e
                    );
                    report.namespace_failures.push(ns.name.clone());
                }
            }
        }

        for binding in &desired.role_bindings {
            let action = reconcile_role_binding(self.store.as_ref(), binding).await?;
            report.role_bindings.push((binding.key(), action));
        }

        debug!(
            "Tenant {} reconciled with {} write(s)",
            name,
            report.writes()
        );
        Ok(report)
    }

    /// Reconcile every Tenant currently in the store, one pass each
    pub async fn reconcile_all(&self) -> Result<ResyncSummary> {
        let tenants = self.store.list_tenants().await?;
        let mut summary = ResyncSummary::default();

        for tenant in tenants {
            let name = tenant.name_any();
            match self.reconcile(&name).await {
                Ok(_) => summary.reconciled += 1,
                Err(e) => {
                    error!("Failed to reconcile tenant {}: {}", name, e);
                    summary.failed.push(name);
                }
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, StoreCall, StoreOp};
    use tenant_rbac_core::{Namespace, NamespaceSpec, OwnerReference, TenantSpec};

    async fn setup(namespaces: Vec<NamespaceSpec>) -> (MemoryStore, TenantController) {
        let store = MemoryStore::new();
        store
            .put_tenant(Tenant::new("t1", TenantSpec { namespaces }))
            .await;
        let controller = TenantController::new(Arc::new(store.clone()), ConvergenceLock::new());
        (store, controller)
    }

    #[tokio::test]
    async fn test_empty_cluster_creates_namespaces_and_bindings() {
        let (store, controller) = setup(vec![
            NamespaceSpec::new("ns1", &["edit", "view"]),
            NamespaceSpec::new("ns2", &["admin"]),
        ])
        .await;

        let report = controller.reconcile("t1").await.unwrap();

        assert!(report.found);
        let journal = store.journal().await;
        let ns_creates = journal
            .iter()
            .filter(|c| matches!(c, StoreCall::CreateNamespace(_)))
            .count();
        let rb_creates = journal
            .iter()
            .filter(|c| matches!(c, StoreCall::CreateRoleBinding(_)))
            .count();
        assert_eq!(ns_creates, 2);
        assert_eq!(rb_creates, 3);
        assert!(journal.iter().all(StoreCall::is_create));
        assert_eq!(report.writes(), 5);
    }

    #[tokio::test]
    async fn test_second_pass_is_fixed_point() {
        let (store, controller) = setup(vec![NamespaceSpec::new("ns1", &["edit"])]).await;

        controller.reconcile("t1").await.unwrap();
        store.clear_journal().await;

        let report = controller.reconcile("t1").await.unwrap();

        assert!(store.journal().await.is_empty());
        assert_eq!(report.writes(), 0);
        assert_eq!(
            report.role_bindings,
            vec![(ObjectKey::new("ns1", "t1-edit"), RoleBindingAction::Unchanged)]
        );
    }

    #[tokio::test]
    async fn test_deleted_tenant_short_circuits() {
        let (store, controller) = setup(vec![NamespaceSpec::new("ns1", &["edit"])]).await;
        store.remove_tenant("t1").await;

        let event = ResourceEvent::Deleted(Tenant::new("t1", TenantSpec::default()));
        let report = controller.handle(&event).await.unwrap();

        assert!(!report.found);
        assert!(store.journal().await.is_empty());
    }

    #[tokio::test]
    async fn test_handle_refetches_fresh_tenant() {
        let (store, controller) = setup(vec![NamespaceSpec::new("ns1", &["edit"])]).await;

        // The event carries a stale copy with no namespaces
        let stale = Tenant::new("t1", TenantSpec::default());
        let report = controller
            .handle(&ResourceEvent::Added(stale))
            .await
            .unwrap();

        assert_eq!(report.role_bindings.len(), 1);
        assert!(store.role_binding("ns1", "t1-edit").await.is_some());
    }

    #[tokio::test]
    async fn test_namespace_failure_does_not_abort_pass() {
        let (store, controller) = setup(vec![
            NamespaceSpec::new("ns1", &["edit"]),
            NamespaceSpec::new("ns2", &["view"]),
        ])
        .await;
        store.fail_on(StoreOp::CreateNamespace, "ns1").await;

        let report = controller.reconcile("t1").await.unwrap();

        assert_eq!(report.namespace_failures, vec!["ns1".to_string()]);
        assert_eq!(report.namespaces, vec![("ns2".to_string(), NamespaceAction::Created)]);
        assert_eq!(report.role_bindings.len(), 2);
    }

    #[tokio::test]
    async fn test_role_binding_failure_aborts_pass() {
        let (store, controller) = setup(vec![
            NamespaceSpec::new("ns1", &["edit"]),
            NamespaceSpec::new("ns2", &["view"]),
        ])
        .await;
        store.fail_on(StoreOp::CreateRoleBinding, "ns1/t1-edit").await;

        let result = controller.reconcile("t1").await;

        assert!(result.is_err());
        assert!(store.role_binding("ns2", "t1-view").await.is_none());
    }

    #[tokio::test]
    async fn test_tenant_fetch_failure_is_returned() {
        let (store, controller) = setup(vec![NamespaceSpec::new("ns1", &["edit"])]).await;
        store.fail_on(StoreOp::GetTenant, "t1").await;

        assert!(controller.reconcile("t1").await.is_err());
        assert!(store.journal().await.is_empty());
    }

    #[tokio::test]
    async fn test_foreign_owned_binding_is_skipped_not_failed() {
        let (store, controller) = setup(vec![NamespaceSpec::new("ns1", &["edit", "view"])]).await;

        let mut foreign = tenant_rbac_core::RoleBinding::default();
        foreign.metadata.name = Some("t1-edit".to_string());
        foreign.metadata.namespace = Some("ns1".to_string());
        foreign.metadata.owner_references = Some(vec![OwnerReference {
            api_version: "apps/v1".to_string(),
            kind: "Deployment".to_string(),
            name: "someone".to_string(),
            uid: "uid-x".to_string(),
            ..Default::default()
        }]);
        store.put_role_binding(foreign).await;

        let report = controller.reconcile("t1").await.unwrap();

        assert_eq!(
            report.role_bindings,
            vec![
                (
                    ObjectKey::new("ns1", "t1-edit"),
                    RoleBindingAction::SkippedOwnerMismatch
                ),
                (ObjectKey::new("ns1", "t1-view"), RoleBindingAction::Created),
            ]
        );
        let untouched = store.role_binding("ns1", "t1-edit").await.unwrap();
        assert_eq!(untouched.metadata.owner_references.unwrap()[0].kind, "Deployment");
    }

    #[tokio::test]
    async fn test_unlabelled_namespace_is_healed() {
        let (store, controller) = setup(vec![NamespaceSpec::new("ns1", &["edit"])]).await;
        let mut ns = Namespace::default();
        ns.metadata.name = Some("ns1".to_string());
        ns.metadata.labels = Some([("team".to_string(), "a".to_string())].into());
        store.put_namespace(ns).await;

        let report = controller.reconcile("t1").await.unwrap();

        assert_eq!(
            report.namespaces,
            vec![("ns1".to_string(), NamespaceAction::Labelled)]
        );
        let labels = store.namespace("ns1").await.unwrap().metadata.labels.unwrap();
        assert_eq!(labels.len(), 2);
    }

    #[tokio::test]
    async fn test_reconcile_all_counts_failures() {
        let store = MemoryStore::new();
        store
            .put_tenant(Tenant::new(
                "t1",
                TenantSpec {
                    namespaces: vec![NamespaceSpec::new("ns1", &["edit"])],
                },
            ))
            .await;
        store
            .put_tenant(Tenant::new(
                "t2",
                TenantSpec {
                    namespaces: vec![NamespaceSpec::new("ns2", &["edit"])],
                },
            ))
            .await;
        store.fail_on(StoreOp::CreateRoleBinding, "ns2/t2-edit").await;
        let controller = TenantController::new(Arc::new(store.clone()), ConvergenceLock::new());

        let summary = controller.reconcile_all().await.unwrap();

        assert_eq!(summary.reconciled, 1);
        assert_eq!(summary.failed, vec!["t2".to_string()]);
    }

    #[tokio::test]
    async fn test_pass_waits_for_held_lock() {
        let store = MemoryStore::new();
        store
            .put_tenant(Tenant::new(
                "t1",
                TenantSpec {
                    namespaces: vec![NamespaceSpec::new("ns1", &["edit"])],
                },
            ))
            .await;
        let lock = ConvergenceLock::new();
        let controller = Arc::new(TenantController::new(Arc::new(store.clone()), lock.clone()));

        let guard = lock.acquire().await;
        let pass = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.reconcile("t1").await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!pass.is_finished());
        assert!(store.journal().await.is_empty());

        drop(guard);
        let report = pass.await.unwrap().unwrap();

        assert_eq!(report.writes(), 2);
        assert_eq!(
            store.journal().await,
            vec![
                StoreCall::CreateNamespace("ns1".to_string()),
                StoreCall::CreateRoleBinding(ObjectKey::new("ns1", "t1-edit")),
            ]
        );
    }

    #[tokio::test]
    async fn test_colliding_binding_name_is_not_clobbered() {
        let store = MemoryStore::new();
        store
            .put_tenant(Tenant::new(
                "a-b",
                TenantSpec {
                    namespaces: vec![NamespaceSpec::new("ns1", &["c"])],
                },
            ))
            .await;
        store
            .put_tenant(Tenant::new(
                "a",
                TenantSpec {
                    namespaces: vec![NamespaceSpec::new("ns1", &["b-c"])],
                },
            ))
            .await;
        let controller = TenantController::new(Arc::new(store.clone()), ConvergenceLock::new());

        let first = controller.reconcile("a-b").await.unwrap();
        assert_eq!(
            first.role_bindings,
            vec![(ObjectKey::new("ns1", "a-b-c"), RoleBindingAction::Created)]
        );

        let second = controller.reconcile("a").await.unwrap();
        assert_eq!(
            second.role_bindings,
            vec![(
                ObjectKey::new("ns1", "a-b-c"),
                RoleBindingAction::SkippedOwnerMismatch
            )]
        );

        let rb = store.role_binding("ns1", "a-b-c").await.unwrap();
        assert_eq!(rb.metadata.owner_references.unwrap()[0].name, "a-b");
        assert_eq!(rb.role_ref.name, "c");
    }
}
