use crate::compiler::DesiredRoleBinding;
use crate::differ::{diff_role_binding, Verdict};
use crate::error::Result;
use crate::traits::ResourceStore;
use tracing::{debug, error, info, warn};

/// What the role binding reconciler did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleBindingAction {
    Created,
    Updated,
    Unchanged,
    /// Owned by something else; left untouched
    SkippedOwnerMismatch,
}

/// Converge one role binding towards its desired state.
///
/// A single attempt without retries: store errors are returned to the caller,
/// which decides whether the pass continues. A binding owned by something
/// other than the desired owner is never written.
pub async fn reconcile_role_binding(
    store: &dyn ResourceStore,
    desired: &DesiredRoleBinding,
) -> Result<RoleBindingAction> {
    let key = desired.key();

    let observed = match store
        .get_role_binding(&desired.namespace, &desired.name)
        .await
    {
        Ok(rb) => Some(rb),
        Err(e) if e.is_not_found() => None,
        Err(e) => {
            error!("Failed to fetch role binding {}: {}", key, e);
            return Err(e);
        }
    };

    match diff_role_binding(desired, observed.as_ref()) {
        Verdict::Absent => {
            info!("Creating role binding {}", key);
            if let Err(e) = store.create_role_binding(&desired.to_role_binding()).await {
                error!("Failed to create role binding {}: {}", key, e);
                return Err(e);
            }
            Ok(RoleBindingAction::Created)
        }
        Verdict::OwnerMismatch { observed: owners } => {
            let owners: Vec<String> = owners
                .iter()
                .map(|o| format!("{}/{}", o.kind, o.name))
                .collect();
            warn!(
                "Role binding {} is owned by [{}], not by tenant {}; skipping update",
                key,
                owners.join(", "),
                desired
                    .owner_references
                    .first()
                    .map(|o| o.name.as_str())
                    .unwrap_or("<unknown>")
            );
            Ok(RoleBindingAction::SkippedOwnerMismatch)
        }
        Verdict::Matches => {
            debug!("Role binding {} already matches desired state", key);
            Ok(RoleBindingAction::Unchanged)
        }
        Verdict::Diverges { causes, corrected } => {
            let causes: Vec<String> = causes.iter().map(ToString::to_string).collect();
            info!(
                "Changes detected ({}), updating role binding {}",
                causes.join(", "),
                key
            );
            if let Err(e) = store.update_role_binding(&corrected).await {
                error!("Failed to update role binding {}: {}", key, e);
                return Err(e);
            }
            Ok(RoleBindingAction::Updated)
        }
    }
}
