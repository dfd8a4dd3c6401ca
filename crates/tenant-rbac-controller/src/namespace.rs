use crate::compiler::DesiredNamespace;
use crate::error::Result;
use crate::traits::ResourceStore;
use tenant_rbac_core::has_management_label;
use tracing::{debug, info};

/// What the namespace reconciler did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceAction {
    Created,
    Labelled,
    Unchanged,
}

/// Ensure a namespace exists and carries the desired labels.
///
/// Missing labels are added on top of the existing ones; nothing else about
/// the namespace is compared or corrected, and namespaces are never deleted.
pub async fn reconcile_namespace(
    store: &dyn ResourceStore,
    desired: &DesiredNamespace,
) -> Result<NamespaceAction> {
    let mut observed = match store.get_namespace(&desired.name).await {
        Ok(ns) => ns,
        Err(e) if e.is_not_found() => {
            info!("Creating namespace {}", desired.name);
            store.create_namespace(&desired.to_namespace()).await?;
            return Ok(NamespaceAction::Created);
        }
        Err(e) => return Err(e),
    };

    let adopting = !has_management_label(observed.metadata.labels.as_ref());
    let labels = observed.metadata.labels.get_or_insert_with(Default::default);
    let missing: Vec<_> = desired
        .labels
        .iter()
        .filter(|(k, v)| labels.get(*k) != Some(*v))
        .collect();

    if missing.is_empty() {
        debug!("Namespace {} already labelled", desired.name);
        return Ok(NamespaceAction::Unchanged);
    }

    if adopting {
        info!("Adding management label to namespace {}", desired.name);
    } else {
        info!("Restoring labels on namespace {}", desired.name);
    }
    for (k, v) in missing {
        labels.insert(k.clone(), v.clone());
    }
    store.update_namespace(&observed).await?;
    Ok(NamespaceAction::Labelled)
}
