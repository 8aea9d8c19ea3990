// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Reverse-watch mappings: turn an event on a secondary object into
//! reconcile requests for the primary objects depending on it.

use crate::constants::{labels, BACKING_SECRET_SUFFIX, OPERATOR_NAME};
use crate::types::{DerivedSecret, MasterSecret};
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;
use std::sync::Arc;

/// Whether a secret carries the operator's `managed-by` label
pub fn is_managed_by_operator(secret: &Secret) -> bool {
    secret
        .labels()
        .get(labels::MANAGED_BY)
        .is_some_and(|v| v == OPERATOR_NAME)
}

/// MasterSecrets whose backing secret is `secret`.
///
/// A match additionally requires the operator's label or the `<name>-mp`
/// name, the latter so deletions are caught even when labels are gone.
pub fn master_secrets_for_secret(
    secret: &Secret,
    masters: &[Arc<MasterSecret>],
    operator_namespace: &str,
) -> Vec<ObjectRef<MasterSecret>> {
    if secret.namespace().as_deref() != Some(operator_namespace) {
        return Vec::new();
    }

    let secret_name = secret.name_any();
    let managed = is_managed_by_operator(secret);

    masters
        .iter()
        .filter(|master| master.backing_secret_name() == secret_name)
        .filter(|master| managed || master.default_backing_secret_name() == secret_name)
        .map(|master| ObjectRef::new(&master.name_any()))
        .collect()
}

/// MasterSecrets referenced by a DerivedSecret, whose dependent count may have moved
pub fn master_secrets_for_derived(derived: &DerivedSecret) -> Vec<ObjectRef<MasterSecret>> {
    derived
        .master_secret_names()
        .into_iter()
        .map(ObjectRef::new)
        .collect()
}

/// DerivedSecrets with at least one key referencing the master secret
pub fn derived_secrets_for_master(
    master_name: &str,
    derived: &[Arc<DerivedSecret>],
) -> Vec<ObjectRef<DerivedSecret>> {
    derived
        .iter()
        .filter(|ds| ds.references_master(master_name))
        .map(|ds| ObjectRef::from_obj(ds.as_ref()))
        .collect()
}

/// DerivedSecrets depending on the master value stored in `secret`.
///
/// The master is identified by the backing secret's master-secret label,
/// falling back to the `<name>-mp` naming pattern.
pub fn derived_secrets_for_backing_secret(
    secret: &Secret,
    derived: &[Arc<DerivedSecret>],
    operator_namespace: &str,
) -> Vec<ObjectRef<DerivedSecret>> {
    if secret.namespace().as_deref() != Some(operator_namespace) {
        return Vec::new();
    }

    let secret_name = secret.name_any();
    let master_name = secret
        .labels()
        .get(labels::MASTER_SECRET)
        .cloned()
        .or_else(|| secret_name.strip_suffix(BACKING_SECRET_SUFFIX).map(str::to_string));

    match master_name {
        Some(master_name) if !master_name.is_empty() => {
            derived_secrets_for_master(&master_name, derived)
        }
        _ => Vec::new(),
    }
}
