// Allow unused assignments for diagnostic fields - they're used by the thiserror/miette macros
#![allow(unused_assignments)]

pub mod compiler;
pub mod config;
pub mod differ;
pub mod dispatch;
pub mod error;
pub mod informer;
pub mod kube_store;
pub mod lock;
pub mod memory;
pub mod namespace;
pub mod owner_trace;
pub mod readiness;
pub mod role_binding;
pub mod tenant_controller;
pub mod traits;

// Re-export primary types
pub use error::{ReconcileError, Result};
pub use memory::MemoryStore;
pub use traits::ResourceStore;

// Re-export the reconciliation engine
pub use compiler::{compile, ChildKind, ClusterRoleFilter, DesiredNamespace, DesiredRoleBinding, DesiredState};
pub use differ::{diff_role_binding, Divergence, Verdict};
pub use namespace::{reconcile_namespace, NamespaceAction};
pub use role_binding::{reconcile_role_binding, RoleBindingAction};

// Re-export controllers and their plumbing
pub use config::ControllerConfig;
pub use dispatch::{dispatch_role_binding_events, dispatch_tenant_events};
pub use informer::{pump, Informer, SyncFlag};
pub use kube_store::KubeStore;
pub use lock::{ConvergenceGuard, ConvergenceLock};
pub use owner_trace::{OwnerOutcome, OwnerTraceController, OwnerTraceReport};
pub use readiness::{CacheReadinessGate, CacheStatus};
pub use tenant_controller::{PassReport, ResyncSummary, TenantController};
