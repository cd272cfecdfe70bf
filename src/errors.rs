//! Error utilities

use std::time::Duration;

/// Describes error reason
#[non_exhaustive]
#[derive(Debug, PartialEq, Eq)]
pub enum ErrorClass {
    NotFound,
    Conflict,
    AlreadyExists,
    /// Catch-all variant. Since this enum is non-exhaustive,
    /// it should be handled with `_` pattern
    Unknown,
}

/// Tries to classify k8s error
pub fn classify(error_reason: &str) -> ErrorClass {
    match error_reason {
        "NotFound" => ErrorClass::NotFound,
        "Conflict" => ErrorClass::Conflict,
        "AlreadyExists" => ErrorClass::AlreadyExists,
        _ => ErrorClass::Unknown,
    }
}

/// Classifies by HTTP status code, for responses without a known reason
pub fn classify_code(code: u16) -> ErrorClass {
    match code {
        404 => ErrorClass::NotFound,
        409 => ErrorClass::Conflict,
        _ => ErrorClass::Unknown,
    }
}

/// Tries to classify k8s error, wrapped in kube Error
pub fn classify_kube(error: &kube::Error) -> ErrorClass {
    match error {
        kube::Error::Api(api) => match classify(&api.reason) {
            ErrorClass::Unknown => classify_code(api.code),
            class => class,
        },
        _ => ErrorClass::Unknown,
    }
}

/// Errors returned by the aggregator and the provisioner
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Cluster API could not be reached or returned garbage.
    #[error("cluster API is unavailable: {0:#}")]
    GatewayUnavailable(anyhow::Error),
    #[error("failed to provision policy {name}: {error:#}")]
    ProvisioningFailed { name: String, error: anyhow::Error },
    /// Only returned when existing policies are checked strictly
    #[error("policy {name} already exists with pod selector {existing:?}, requested {requested:?}")]
    PolicyMismatch {
        name: String,
        existing: std::collections::BTreeMap<String, String>,
        requested: std::collections::BTreeMap<String, String>,
    },
    #[error("operation was cancelled")]
    Cancelled,
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
}
