// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{conditions, BACKING_SECRET_SUFFIX, DEFAULT_MASTER_LENGTH};
use crate::types::condition::Conditions;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A cluster-wide master value from which derived secrets are computed.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(group = "keysmith.geeko.me", version = "v1alpha1", kind = "MasterSecret")]
#[kube(status = "MasterSecretStatus", shortname = "ms")]
#[kube(
    printcolumn = r#"{"name":"Ready", "type":"boolean", "jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Dependents", "type":"integer", "jsonPath":".status.dependentCount"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct MasterSecretSpec {
    /// Length of the generated master value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 22, max = 256))]
    pub length: Option<usize>,
    /// Secret holding the master value, defaults to `<name>-mp` in the operator namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretReference>,
    /// Annotations applied to the backing secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    pub name: String,
    /// Create the secret when it does not exist (default true)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MasterSecretStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_at: Option<SecretLocation>,
    #[serde(default)]
    pub ready: bool,
    /// Number of DerivedSecrets referencing this master secret
    #[serde(default)]
    pub dependent_count: i32,
    #[serde(default)]
    pub conditions: Conditions,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, JsonSchema)]
pub struct SecretLocation {
    pub name: String,
    pub namespace: String,
}

impl MasterSecret {
    /// Name of the backing secret
    pub fn backing_secret_name(&self) -> String {
        self.spec
            .secret_ref
            .as_ref()
            .map(|r| r.name.clone())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.default_backing_secret_name())
    }

    /// The `<name>-mp` name used when no secretRef is given
    pub fn default_backing_secret_name(&self) -> String {
        format!("{}{}", self.name_any(), BACKING_SECRET_SUFFIX)
    }

    /// Backing secret location; backing secrets always live in the operator namespace
    pub fn backing_secret_location(&self, operator_namespace: &str) -> SecretLocation {
        SecretLocation {
            name: self.backing_secret_name(),
            namespace: operator_namespace.to_string(),
        }
    }

    /// Whether a missing backing secret may be generated
    pub fn should_create(&self) -> bool {
        self.spec
            .secret_ref
            .as_ref()
            .and_then(|r| r.create)
            .unwrap_or(true)
    }

    pub fn master_length(&self) -> usize {
        self.spec.length.unwrap_or(DEFAULT_MASTER_LENGTH)
    }

    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.conditions.is_true(conditions::READY))
    }
}
