//! Management label applied to every resource this operator creates or adopts.
//!
//! The label doubles as the server-side list/watch filter, so the operator
//! only ever observes children it owns.

use std::collections::BTreeMap;

/// Key of the management label
pub const MANAGED_BY_LABEL: &str = "devopscentral.io/managed-by";

/// Value of the management label
pub const MANAGED_BY_VALUE: &str = "tenant-operator";

/// Fresh label map containing only the management label
pub fn management_labels() -> BTreeMap<String, String> {
    BTreeMap::from([(MANAGED_BY_LABEL.to_string(), MANAGED_BY_VALUE.to_string())])
}

/// Label selector string for list/watch calls (`key=value`)
pub fn management_label_selector() -> String {
    format!("{}={}", MANAGED_BY_LABEL, MANAGED_BY_VALUE)
}

/// Whether the given labels carry the management label with the expected value
pub fn has_management_label(labels: Option<&BTreeMap<String, String>>) -> bool {
    labels
        .and_then(|l| l.get(MANAGED_BY_LABEL))
        .is_some_and(|v| v == MANAGED_BY_VALUE)
}
