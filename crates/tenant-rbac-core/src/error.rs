// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for tenant model operations
#[derive(Error, Debug, Diagnostic)]
pub enum TenancyError {
    /// Tenant cannot be used as an owner
    #[error("Invalid tenant '{tenant}': {reason}")]
    #[diagnostic(
        code(tenant_rbac::invalid_tenant),
        help("Tenants must be fetched from the API server so that metadata.name and metadata.uid are populated")
    )]
    InvalidTenant {
        #[allow(unused)]
        tenant: String,
        #[allow(unused)]
        reason: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(
        code(tenant_rbac::serialization_error),
        help("Ensure the resource format is valid JSON or YAML")
    )]
    SerializationError {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, TenancyError>;

impl TenancyError {
    /// Create an InvalidTenant error
    pub fn invalid_tenant(tenant: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTenant {
            tenant: tenant.into(),
            reason: reason.into(),
        }
    }

    /// Create a SerializationError
    pub fn serialization_error(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::SerializationError {
            message: message.into(),
            source,
        }
    }
}
