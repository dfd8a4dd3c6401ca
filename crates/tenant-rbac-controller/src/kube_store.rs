use crate::error::{ReconcileError, Result};
use crate::traits::ResourceStore;
use async_trait::async_trait;
use kube::api::{Api, ListParams, PostParams};
use kube::Client;
use tenant_rbac_core::{Namespace, ObjectKey, RoleBinding, Tenant};
use tracing::debug;

/// Which call produced an API error; a 409 means different things per verb
#[derive(Debug, Clone, Copy)]
enum Verb<'a> {
    Read,
    Create,
    Replace { resource_version: &'a str },
}

impl Verb<'_> {
    fn as_str(&self) -> &'static str {
        match self {
            Verb::Read => "get",
            Verb::Create => "create",
            Verb::Replace { .. } => "replace",
        }
    }
}

/// Resource store backed by the Kubernetes API server
///
/// Reads go straight to the API server, never through an informer cache.
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn tenants(&self) -> Api<Tenant> {
        Api::all(self.client.clone())
    }

    fn namespaces(&self) -> Api<Namespace> {
        Api::all(self.client.clone())
    }

    fn role_bindings(&self, namespace: &str) -> Api<RoleBinding> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Translate a kube client error into the store's error vocabulary
fn map_api_error(e: kube::Error, kind: &str, key: &str, verb: Verb<'_>) -> ReconcileError {
    let code = match &e {
        kube::Error::Api(ae) => Some(ae.code),
        _ => None,
    };

    match (code, verb) {
        (Some(404), _) => ReconcileError::not_found(kind, key),
        (Some(409), Verb::Create) => ReconcileError::already_exists(kind, key),
        (Some(409), Verb::Replace { resource_version }) => {
            ReconcileError::conflict(kind, key, resource_version)
        }
        _ => ReconcileError::transport(
            format!("{} {} {}: {}", verb.as_str(), kind, key, e),
            Some(Box::new(e)),
        ),
    }
}

fn namespaced_key(role_binding: &RoleBinding) -> Result<ObjectKey> {
    let key = ObjectKey::of(role_binding);
    if key.name.is_empty() || !key.is_namespaced() {
        return Err(ReconcileError::invalid_object(
            "RoleBinding",
            format!("missing name or namespace on '{}'", key),
        ));
    }
    Ok(key)
}

fn cluster_key(namespace: &Namespace) -> Result<String> {
    match namespace.metadata.name.as_deref() {
        Some(name) if !name.is_empty() => Ok(name.to_string()),
        _ => Err(ReconcileError::invalid_object(
            "Namespace",
            "missing metadata.name",
        )),
    }
}

#[async_trait]
impl ResourceStore for KubeStore {
    async fn get_tenant(&self, name: &str) -> Result<Tenant> {
        self.tenants()
            .get(name)
            .await
            .map_err(|e| map_api_error(e, "Tenant", name, Verb::Read))
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        let list = self
            .tenants()
            .list(&ListParams::default())
            .await
            .map_err(|e| map_api_error(e, "Tenant", "*", Verb::Read))?;
        Ok(list.items)
    }

    async fn get_namespace(&self, name: &str) -> Result<Namespace> {
        self.namespaces()
            .get(name)
            .await
            .map_err(|e| map_api_error(e, "Namespace", name, Verb::Read))
    }

    async fn create_namespace(&self, namespace: &Namespace) -> Result<Namespace> {
        let name = cluster_key(namespace)?;
        debug!("API: creating namespace {}", name);
        self.namespaces()
            .create(&PostParams::default(), namespace)
            .await
            .map_err(|e| map_api_error(e, "Namespace", &name, Verb::Create))
    }

    async fn update_namespace(&self, namespace: &Namespace) -> Result<Namespace> {
        let name = cluster_key(namespace)?;
        let resource_version = namespace.metadata.resource_version.as_deref().unwrap_or("");
        debug!("API: replacing namespace {} at {}", name, resource_version);
        self.namespaces()
            .replace(&name, &PostParams::default(), namespace)
            .await
            .map_err(|e| map_api_error(e, "Namespace", &name, Verb::Replace { resource_version }))
    }

    async fn get_role_binding(&self, namespace: &str, name: &str) -> Result<RoleBinding> {
        self.role_bindings(namespace)
            .get(name)
            .await
            .map_err(|e| {
                map_api_error(
                    e,
                    "RoleBinding",
                    &ObjectKey::new(namespace, name).to_string(),
                    Verb::Read,
                )
            })
    }

    async fn create_role_binding(&self, role_binding: &RoleBinding) -> Result<RoleBinding> {
        let key = namespaced_key(role_binding)?;
        debug!("API: creating role binding {}", key);
        self.role_bindings(&key.namespace)
            .create(&PostParams::default(), role_binding)
            .await
            .map_err(|e| map_api_error(e, "RoleBinding", &key.to_string(), Verb::Create))
    }

    async fn update_role_binding(&self, role_binding: &RoleBinding) -> Result<RoleBinding> {
        let key = namespaced_key(role_binding)?;
        let resource_version = role_binding
            .metadata
            .resource_version
            .as_deref()
            .unwrap_or("");
        debug!("API: replacing role binding {} at {}", key, resource_version);
        self.role_bindings(&key.namespace)
            .replace(&key.name, &PostParams::default(), role_binding)
            .await
            .map_err(|e| {
                map_api_error(
                    e,
                    "RoleBinding",
                    &key.to_string(),
                    Verb::Replace { resource_version },
                )
            })
    }
}
