// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::conditions;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeysmithError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("length must be between 22 and 256, got {0}")]
    InvalidLength(usize),

    #[error("Invalid resource spec: {0}")]
    InvalidSpec(String),

    #[error("derivation context {0:?} is shorter than 8 bytes")]
    InvalidContext(String),

    #[error("Key derivation failed: {0}")]
    Derivation(String),

    #[error("Master secret unavailable: {0}")]
    MasterSecretUnavailable(String),

    #[error("Secret reconciliation failed: {0}")]
    SecretReconciliationFailed(String),

    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(String),

    #[error("Conflicting write: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl KeysmithError {
    /// A concurrent writer won the optimistic-concurrency race
    pub fn is_conflict(&self) -> bool {
        match self {
            KeysmithError::Conflict(_) => true,
            KeysmithError::KubeError(kube::Error::Api(resp)) => resp.code == 409,
            _ => false,
        }
    }

    /// Retrying cannot help until the declaring resource changes
    pub fn is_permanent(&self) -> bool {
        match self {
            KeysmithError::InvalidLength(_)
            | KeysmithError::InvalidSpec(_)
            | KeysmithError::InvalidContext(_) => true,
            // the API server refused the object itself, e.g. an immutable field
            KeysmithError::KubeError(kube::Error::Api(resp)) => resp.code == 422,
            _ => false,
        }
    }

    /// Machine reason written into a False `Ready` condition
    pub fn reason(&self) -> &'static str {
        match self {
            KeysmithError::InvalidLength(_) => conditions::REASON_INVALID_LENGTH,
            KeysmithError::InvalidSpec(_) => conditions::REASON_INVALID_SPEC,
            KeysmithError::InvalidContext(_) => conditions::REASON_INVALID_CONTEXT,
            KeysmithError::MasterSecretUnavailable(_) => {
                conditions::REASON_MASTER_SECRET_UNAVAILABLE
            }
            KeysmithError::SecretReconciliationFailed(_) => {
                conditions::REASON_SECRET_RECONCILIATION_FAILED
            }
            _ => conditions::REASON_RECONCILIATION_FAILED,
        }
    }
}

pub type Result<T> = std::result::Result<T, KeysmithError>;
