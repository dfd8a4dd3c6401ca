use crate::compiler::{compile, ChildKind, ClusterRoleFilter};
use crate::error::Result;
use crate::lock::ConvergenceLock;
use crate::role_binding::{reconcile_role_binding, RoleBindingAction};
use crate::traits::ResourceStore;
use std::sync::Arc;
use tenant_rbac_core::{
    tenant_owner_reference, ObjectKey, OwnerReference, ResourceEvent, RoleBinding, TENANT_KIND,
};
use tracing::{debug, error, info};

/// What happened for one Tenant owner reference
#[derive(Debug, Clone, PartialEq)]
pub enum OwnerOutcome {
    /// Bindings for the owner were reconciled
    Reconciled(Vec<(ObjectKey, RoleBindingAction)>),
    /// The owning Tenant no longer exists; nothing to heal
    TenantGone,
    /// Reconciliation failed; the error was logged
    Failed(String),
}

/// Summary of one owner-trace notification
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OwnerTraceReport {
    /// False for notifications that were filtered out
    pub triggered: bool,
    /// Outcome per Tenant owner reference, in owner reference order
    pub owners: Vec<(String, OwnerOutcome)>,
}

/// Secondary controller: maps role binding notifications back to their
/// owning Tenants and re-runs the role binding reconciler for them
pub struct OwnerTraceController {
    store: Arc<dyn ResourceStore>,
    lock: ConvergenceLock,
}

impl OwnerTraceController {
    pub fn new(store: Arc<dyn ResourceStore>, lock: ConvergenceLock) -> Self {
        Self { store, lock }
    }

    /// Handle one RoleBinding notification.
    ///
    /// Additions are only logged. Updates fire when the resource version
    /// changed, using the previous owner references and the current role ref.
    /// Deletions fire with the last known state.
    pub async fn handle(&self, event: &ResourceEvent<RoleBinding>) -> OwnerTraceReport {
        match event {
            ResourceEvent::Added(rb) => {
                debug!("Role binding {} added", ObjectKey::of(rb));
                OwnerTraceReport::default()
            }
            ResourceEvent::Updated { old, new } => {
                if event.is_resync() {
                    debug!("Role binding {} resynced without changes", ObjectKey::of(new));
                    return OwnerTraceReport::default();
                }
                info!("Role binding {} modified", ObjectKey::of(new));
                self.reconcile_owners(owner_references(old), &new.role_ref.name)
                    .await
            }
            ResourceEvent::Deleted(rb) => {
                info!("Role binding {} deleted", ObjectKey::of(rb));
                self.reconcile_owners(owner_references(rb), &rb.role_ref.name)
                    .await
            }
        }
    }

    /// Re-reconcile the `cluster_role` binding of every Tenant named in
    /// `owners`.
    ///
    /// Owner references of other kinds are ignored. A failure for one owner
    /// is logged and does not stop the remaining owners.
    pub async fn reconcile_owners(
        &self,
        owners: &[OwnerReference],
        cluster_role: &str,
    ) -> OwnerTraceReport {
        let _guard = self.lock.acquire().await;
        let mut report = OwnerTraceReport {
            triggered: true,
            owners: Vec::new(),
        };

        for owner in owners.iter().filter(|o| o.kind == TENANT_KIND) {
            let outcome = match self.heal_owner(&owner.name, cluster_role).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(
                        "Failed to reconcile {} binding for tenant {}: {}",
                        cluster_role, owner.name, e
                    );
                    OwnerOutcome::Failed(e.to_string())
                }
            };
            report.owners.push((owner.name.clone(), outcome));
        }

        report
    }

    async fn heal_owner(&self, tenant_name: &str, cluster_role: &str) -> Result<OwnerOutcome> {
        let tenant = match self.store.get_tenant(tenant_name).await {
            Ok(t) => t,
            Err(e) if e.is_not_found() => {
                debug!("Owner tenant {} not found, nothing to heal", tenant_name);
                return Ok(OwnerOutcome::TenantGone);
            }
            Err(e) => return Err(e),
        };

        let owner = tenant_owner_reference(&tenant)?;
        let desired = compile(
            &tenant,
            &[ChildKind::RoleBinding],
            &ClusterRoleFilter::Only(cluster_role.to_string()),
            &owner,
        );

        let mut actions = Vec::with_capacity(desired.role_bindings.len());
        for binding in &desired.role_bindings {
            let action = reconcile_role_binding(self.store.as_ref(), binding).await?;
            actions.push((binding.key(), action));
        }
        Ok(OwnerOutcome::Reconciled(actions))
    }
}

fn owner_references(rb: &RoleBinding) -> &[OwnerReference] {
    rb.metadata.owner_references.as_deref().unwrap_or_default()
}
