// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::constants::{conditions, DEFAULT_MASTER_SECRET, DEFAULT_SECRET_TYPE, DERIVED_SECRET_FINALIZER};
use crate::crypto::secret_length;
use crate::types::condition::Conditions;
use chrono::{DateTime, Utc};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A namespaced declaration of keys derived from master secrets.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[kube(group = "keysmith.geeko.me", version = "v1alpha1", kind = "DerivedSecret")]
#[kube(namespaced)]
#[kube(status = "DerivedSecretStatus", shortname = "ds")]
#[kube(
    printcolumn = r#"{"name":"Ready", "type":"boolean", "jsonPath":".status.ready"}"#,
    printcolumn = r#"{"name":"Secret", "type":"string", "jsonPath":".status.secretName"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DerivedSecretSpec {
    /// Type of the generated secret
    #[serde(rename = "type", default = "default_output_type")]
    pub output_type: String,
    /// Annotations applied to the generated secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotations: Option<BTreeMap<String, String>>,
    /// Labels applied to the generated secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    /// Key name to derivation settings
    pub keys: BTreeMap<String, DerivedKeySpec>,
}

fn default_output_type() -> String {
    DEFAULT_SECRET_TYPE.to_string()
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DerivedKeySpec {
    #[serde(rename = "type")]
    pub secret_type: SecretType,
    /// MasterSecret to derive from, "default" when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_secret_ref: Option<String>,
    /// Length of a `custom` key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(range(min = 22, max = 256))]
    pub length: Option<usize>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SecretType {
    Password,
    EncryptionKey,
    Custom,
}

impl SecretType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretType::Password => "password",
            SecretType::EncryptionKey => "encryption-key",
            SecretType::Custom => "custom",
        }
    }
}

impl DerivedKeySpec {
    pub fn master_secret_name(&self) -> &str {
        self.master_secret_ref
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_MASTER_SECRET)
    }

    pub fn resolved_length(&self) -> usize {
        secret_length(self.secret_type.as_str(), self.length)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DerivedSecretStatus {
    /// Name of the materialized secret
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
    #[serde(default)]
    pub ready: bool,
    /// Last time the materialized secret was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Per-key fingerprint in 0..=999, never the value itself
    #[serde(default)]
    pub key_hashes: BTreeMap<String, u16>,
    #[serde(default)]
    pub conditions: Conditions,
}

/// Where a DerivedSecret is in its finalizer-gated lifecycle
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Lifecycle {
    /// Finalizer not yet present; nothing may be materialized
    Initializing,
    /// Finalizer present; keep the materialized secret in sync
    Active,
    /// Deletion requested; clean up and release the finalizer
    Terminating,
}

impl DerivedSecret {
    pub fn lifecycle(&self) -> Lifecycle {
        if self.metadata.deletion_timestamp.is_some() {
            Lifecycle::Terminating
        } else if self.has_finalizer() {
            Lifecycle::Active
        } else {
            Lifecycle::Initializing
        }
    }

    pub fn has_finalizer(&self) -> bool {
        self.metadata
            .finalizers
            .as_ref()
            .is_some_and(|f| f.iter().any(|f| f == DERIVED_SECRET_FINALIZER))
    }

    /// Names of all master secrets referenced by the keys
    pub fn master_secret_names(&self) -> BTreeSet<&str> {
        self.spec
            .keys
            .values()
            .map(DerivedKeySpec::master_secret_name)
            .collect()
    }

    pub fn references_master(&self, master_name: &str) -> bool {
        self.spec
            .keys
            .values()
            .any(|k| k.master_secret_name() == master_name)
    }

    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .is_some_and(|s| s.conditions.is_true(conditions::READY))
    }
}
