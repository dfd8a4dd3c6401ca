//! Tenant spec compiler
//!
//! Pure translation of a Tenant into the namespaces and role bindings it
//! implies. The result is recomputed from scratch on every pass.

use kube::ResourceExt;
use std::collections::{BTreeMap, HashSet};
use tenant_rbac_core::{
    management_labels, Namespace, ObjectKey, ObjectMeta, OwnerReference, RoleBinding, RoleRef,
    Subject, Tenant,
};

pub const RBAC_API_GROUP: &str = "rbac.authorization.k8s.io";
pub const CLUSTER_ROLE_KIND: &str = "ClusterRole";
pub const SERVICE_ACCOUNT_KIND: &str = "ServiceAccount";

/// Child resource kinds the compiler can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildKind {
    Namespace,
    RoleBinding,
}

/// Which cluster roles produce bindings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterRoleFilter {
    /// One binding per listed role
    All,
    /// One binding for this cluster role per namespace that lists any role
    Only(String),
}

/// A namespace the tenant requires
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredNamespace {
    pub name: String,
    pub labels: BTreeMap<String, String>,
}

impl DesiredNamespace {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: management_labels(),
        }
    }

    pub fn to_namespace(&self) -> Namespace {
        Namespace {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                labels: Some(self.labels.clone()),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// A role binding the tenant requires
#[derive(Debug, Clone, PartialEq)]
pub struct DesiredRoleBinding {
    pub name: String,
    pub namespace: String,
    pub owner_references: Vec<OwnerReference>,
    pub labels: BTreeMap<String, String>,
    pub role_ref: RoleRef,
    pub subjects: Vec<Subject>,
}

impl DesiredRoleBinding {
    /// Grant `cluster_role` to the tenant's service account inside `namespace`
    pub fn build(
        tenant_name: &str,
        namespace: &str,
        cluster_role: &str,
        owner: &OwnerReference,
    ) -> Self {
        Self {
            name: role_binding_name(tenant_name, cluster_role),
            namespace: namespace.to_string(),
            owner_references: vec![owner.clone()],
            labels: management_labels(),
            role_ref: RoleRef {
                api_group: RBAC_API_GROUP.to_string(),
                kind: CLUSTER_ROLE_KIND.to_string(),
                name: cluster_role.to_string(),
            },
            subjects: vec![Subject {
                kind: SERVICE_ACCOUNT_KIND.to_string(),
                name: tenant_name.to_string(),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            }],
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    /// Full RoleBinding object, as sent on create
    pub fn to_role_binding(&self) -> RoleBinding {
        RoleBinding {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                owner_references: Some(self.owner_references.clone()),
                labels: Some(self.labels.clone()),
                ..Default::default()
            },
            role_ref: self.role_ref.clone(),
            subjects: Some(self.subjects.clone()),
        }
    }
}

/// Everything one tenant implies, in spec order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DesiredState {
    pub namespaces: Vec<DesiredNamespace>,
    pub role_bindings: Vec<DesiredRoleBinding>,
}

/// Deterministic binding name for a (tenant, cluster role) pair
pub fn role_binding_name(tenant_name: &str, cluster_role: &str) -> String {
    format!("{}-{}", tenant_name, cluster_role)
}

/// Compile a tenant into its desired children.
///
/// Only the kinds listed in `kinds` are emitted. Namespaces and bindings are
/// deduplicated on their identity; the first occurrence keeps its position.
pub fn compile(
    tenant: &Tenant,
    kinds: &[ChildKind],
    filter: &ClusterRoleFilter,
    owner: &OwnerReference,
) -> DesiredState {
    let tenant_name = tenant.name_any();
    let mut desired = DesiredState::default();

    if kinds.contains(&ChildKind::Namespace) {
        let mut seen = HashSet::new();
        for ns in &tenant.spec.namespaces {
            if seen.insert(ns.name.as_str()) {
                desired.namespaces.push(DesiredNamespace::new(&ns.name));
            }
        }
    }

    if kinds.contains(&ChildKind::RoleBinding) {
        let mut seen = HashSet::new();
        for ns in &tenant.spec.namespaces {
            let roles: Vec<&str> = match filter {
                ClusterRoleFilter::All => ns.roles.iter().map(|r| r.name.as_str()).collect(),
                ClusterRoleFilter::Only(role) if !ns.roles.is_empty() => vec![role.as_str()],
                ClusterRoleFilter::Only(_) => vec![],
            };

            for role in roles {
                let binding = DesiredRoleBinding::build(&tenant_name, &ns.name, role, owner);
                if seen.insert(binding.key()) {
                    desired.role_bindings.push(binding);
                }
            }
        }
    }

    desired
}
