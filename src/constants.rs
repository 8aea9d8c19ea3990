// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// The operator name, used as `managed-by` label value
pub const OPERATOR_NAME: &str = "keysmith";

/// API group of the MasterSecret and DerivedSecret resources
pub const API_GROUP: &str = "keysmith.geeko.me";

/// API version of the MasterSecret and DerivedSecret resources
pub const API_VERSION: &str = "v1alpha1";

/// Finalizer guarding cleanup of a DerivedSecret's materialized secret
pub const DERIVED_SECRET_FINALIZER: &str = "keysmith.geeko.me/derivedsecret-finalizer";

/// Data key holding the master value inside a backing secret
pub const MASTER_SECRET_KEY: &str = "masterPassword";

/// Master secret used by keys that do not name one
pub const DEFAULT_MASTER_SECRET: &str = "default";

/// Suffix of the backing secret name when a MasterSecret has no secretRef
pub const BACKING_SECRET_SUFFIX: &str = "-mp";

/// Length of a generated master value when the spec does not set one
pub const DEFAULT_MASTER_LENGTH: usize = 86;

/// Secret type applied to materialized secrets when the spec does not set one
pub const DEFAULT_SECRET_TYPE: &str = "Opaque";

/// Kubernetes label keys used by keysmith
pub mod labels {
    /// Marks secrets created by the operator
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    /// Names the MasterSecret a backing secret belongs to
    pub const MASTER_SECRET: &str = "keysmith.geeko.me/master-secret";
}

/// Status condition types and reasons
pub mod conditions {
    pub const READY: &str = "Ready";

    pub const REASON_SECRET_READY: &str = "SecretReady";
    pub const REASON_SECRET_RECONCILIATION_FAILED: &str = "SecretReconciliationFailed";
    pub const REASON_RECONCILIATION_FAILED: &str = "ReconciliationFailed";
    pub const REASON_MASTER_SECRET_UNAVAILABLE: &str = "MasterSecretUnavailable";
    pub const REASON_INVALID_LENGTH: &str = "InvalidLength";
    pub const REASON_INVALID_SPEC: &str = "InvalidSpec";
    pub const REASON_INVALID_CONTEXT: &str = "InvalidContext";
}

/// CRD polling configuration
pub mod crd {
    /// Initial polling interval in seconds when waiting for CRD
    pub const POLL_INTERVAL_SECS: u64 = 10;
    /// Maximum polling interval in seconds (exponential backoff cap)
    pub const POLL_MAX_INTERVAL_SECS: u64 = 60;
}

/// Reconcile retry defaults
pub mod retry {
    /// First delay after a failed reconcile
    pub const BASE_SECS: u64 = 5;
    /// Upper bound for the exponential retry delay
    pub const MAX_SECS: u64 = 300;
    /// Parallel reconciles per resource kind
    pub const CONCURRENCY: u16 = 4;
}
