//! Tenant CRD
//!
//! A Tenant declares the namespaces it should own and the cluster roles its
//! service account is granted inside each of them.

use crate::error::{Result, TenancyError};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::{CustomResource, Resource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind string used on owner references pointing at a Tenant
pub const TENANT_KIND: &str = "Tenant";

/// Tenant describes the namespaces and role grants owned by one tenant.
///
/// Example:
/// ```yaml
/// apiVersion: multitenancy.devopscentral.io/v1alpha
/// kind: Tenant
/// metadata:
///   name: team-a
/// spec:
///   namespaces:
///     - name: team-a-dev
///       roles:
///         - name: edit
///         - name: view
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "multitenancy.devopscentral.io",
    version = "v1alpha",
    kind = "Tenant",
    plural = "tenants",
    shortname = "tn",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TenantSpec {
    /// Namespaces owned by the tenant, in declaration order
    #[serde(default)]
    pub namespaces: Vec<NamespaceSpec>,
}

/// A namespace and the cluster roles granted inside it
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceSpec {
    pub name: String,

    #[serde(default)]
    pub roles: Vec<RoleSpec>,
}

/// Reference to a ClusterRole by name
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoleSpec {
    pub name: String,
}

impl NamespaceSpec {
    pub fn new(name: impl Into<String>, roles: &[&str]) -> Self {
        Self {
            name: name.into(),
            roles: roles
                .iter()
                .map(|r| RoleSpec {
                    name: (*r).to_string(),
                })
                .collect(),
        }
    }
}

/// Build the controller owner reference that every child of `tenant` carries.
///
/// The tenant must come from the API server: both `metadata.name` and
/// `metadata.uid` are required.
pub fn tenant_owner_reference(tenant: &Tenant) -> Result<OwnerReference> {
    let name = tenant
        .metadata
        .name
        .as_deref()
        .ok_or_else(|| TenancyError::invalid_tenant("<unknown>", "missing metadata.name"))?;

    let mut owner = tenant
        .controller_owner_ref(&())
        .ok_or_else(|| TenancyError::invalid_tenant(name, "missing metadata.uid"))?;
    // Tenant deletion waits for its children to be collected first
    owner.block_owner_deletion = Some(true);
    Ok(owner)
}
