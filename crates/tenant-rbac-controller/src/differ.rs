//! Desired-vs-observed comparison for role bindings

use crate::compiler::DesiredRoleBinding;
use std::collections::BTreeMap;
use std::fmt;
use tenant_rbac_core::{OwnerReference, RoleBinding};

/// A field that differs between desired and observed state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Divergence {
    Subjects,
    RoleRef,
    Labels,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Divergence::Subjects => write!(f, "subjects"),
            Divergence::RoleRef => write!(f, "roleRef"),
            Divergence::Labels => write!(f, "labels"),
        }
    }
}

/// Outcome of comparing one desired binding against the live object
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Nothing exists at the name/namespace
    Absent,
    /// The live object is owned by something else; it must not be written
    OwnerMismatch { observed: Vec<OwnerReference> },
    /// Live object already matches
    Matches,
    /// Live object must be replaced by `corrected`, which carries the
    /// observed resource version
    Diverges {
        causes: Vec<Divergence>,
        corrected: Box<RoleBinding>,
    },
}

/// Compare a desired binding with the observed one at the same name/namespace.
///
/// Owner references and subjects compare by full structural equality, subjects
/// order-sensitive. Labels match when every desired label is present with the
/// same value; labels added by others are tolerated.
pub fn diff_role_binding(desired: &DesiredRoleBinding, observed: Option<&RoleBinding>) -> Verdict {
    let Some(observed) = observed else {
        return Verdict::Absent;
    };

    let observed_owners = observed
        .metadata
        .owner_references
        .as_deref()
        .unwrap_or_default();
    if observed_owners != desired.owner_references.as_slice() {
        return Verdict::OwnerMismatch {
            observed: observed_owners.to_vec(),
        };
    }

    let mut causes = Vec::new();
    if observed.subjects.as_deref().unwrap_or_default() != desired.subjects.as_slice() {
        causes.push(Divergence::Subjects);
    }
    if observed.role_ref != desired.role_ref {
        causes.push(Divergence::RoleRef);
    }
    if !labels_contain(observed.metadata.labels.as_ref(), &desired.labels) {
        causes.push(Divergence::Labels);
    }

    if causes.is_empty() {
        Verdict::Matches
    } else {
        Verdict::Diverges {
            causes,
            corrected: Box::new(corrected_role_binding(desired, observed)),
        }
    }
}

fn labels_contain(
    observed: Option<&BTreeMap<String, String>>,
    wanted: &BTreeMap<String, String>,
) -> bool {
    wanted
        .iter()
        .all(|(k, v)| observed.and_then(|l| l.get(k)) == Some(v))
}

/// Object to send when correcting a diverged binding.
///
/// Carries the desired subjects, roleRef and owners, the observed resource
/// version, and the observed labels overlaid with the desired ones.
pub fn corrected_role_binding(desired: &DesiredRoleBinding, observed: &RoleBinding) -> RoleBinding {
    let mut labels = observed.metadata.labels.clone().unwrap_or_default();
    labels.extend(desired.labels.clone());

    let mut rb = desired.to_role_binding();
    rb.metadata.labels = Some(labels);
    rb.metadata.resource_version = observed.metadata.resource_version.clone();
    rb
}
