// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! DerivedSecret reconciler - materializes the derived keys of each
//! DerivedSecret into a Secret of the same name and namespace.

use crate::config::Config;
use crate::constants::{conditions, DEFAULT_SECRET_TYPE, DERIVED_SECRET_FINALIZER};
use crate::crypto::{build_context, derive_secret, key_hash};
use crate::error::{KeysmithError, Result};
use crate::kubernetes::{delete_secret_if_exists, read_master_value};
use crate::reconcilers::backoff::RetryBackoff;
use crate::reconcilers::mappers::{derived_secrets_for_backing_secret, derived_secrets_for_master};
use crate::types::{Condition, DerivedKeySpec, DerivedSecret, DerivedSecretStatus, Lifecycle, MasterSecret};
use chrono::Utc;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::{
    api::{ObjectMeta, Patch, PatchParams, PostParams},
    runtime::{controller::Action, controller::Config as ControllerConfig, Controller},
    Api, Client, Resource, ResourceExt,
};
use kube::runtime::reflector::ObjectRef;
use kube_runtime::watcher::Config as WatcherConfig;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

/// Derived values keyed by secret data key
type DerivedValues = BTreeMap<String, Zeroizing<String>>;

pub struct DerivedSecretReconciler {
    client: Client,
    config: Config,
    backoff: RetryBackoff,
}

impl DerivedSecretReconciler {
    pub fn new(client: Client, config: Config) -> Self {
        let backoff = RetryBackoff::new(config.retry_base, config.retry_max);
        Self {
            client,
            config,
            backoff,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let derived: Api<DerivedSecret> = Api::all(self.client.clone());
        let owned: Api<Secret> = Api::all(self.client.clone());
        let masters: Api<MasterSecret> = Api::all(self.client.clone());
        let backing: Api<Secret> =
            Api::namespaced(self.client.clone(), &self.config.operator_namespace);
        let operator_namespace = self.config.operator_namespace.clone();
        let concurrency = self.config.concurrency;
        let context = Arc::new(self);
        let pruner = context.clone();

        let controller = Controller::new(derived, WatcherConfig::default());
        let store = controller.store();
        let master_store = store.clone();
        let known = store.clone();

        controller
            .owns(owned, WatcherConfig::default())
            .watches(masters, WatcherConfig::default(), move |master: MasterSecret| {
                derived_secrets_for_master(&master.name_any(), &master_store.state())
            })
            .watches(backing, WatcherConfig::default(), move |secret: Secret| {
                derived_secrets_for_backing_secret(&secret, &store.state(), &operator_namespace)
            })
            .with_config(ControllerConfig::default().concurrency(concurrency))
            .shutdown_on_signal()
            .run(reconcile, error_policy, context)
            .for_each(|res| {
                pruner
                    .backoff
                    .retain(|id| object_ref(id).is_some_and(|r| known.get(&r).is_some()));
                async move {
                    match res {
                        Ok(o) => debug!("Reconciled DerivedSecret: {:?}", o),
                        Err(e) => warn!("DerivedSecret reconciliation error: {:?}", e),
                    }
                }
            })
            .await;

        Ok(())
    }

    /// Add the finalizer; nothing is materialized before it is persisted
    async fn add_finalizer(&self, api: &Api<DerivedSecret>, ds: &DerivedSecret) -> Result<()> {
        let mut updated = ds.clone();
        updated
            .metadata
            .finalizers
            .get_or_insert_with(Vec::new)
            .push(DERIVED_SECRET_FINALIZER.to_string());
        api.replace(&ds.name_any(), &PostParams::default(), &updated)
            .await?;
        debug!("Added finalizer to DerivedSecret {}", identity(ds));
        Ok(())
    }

    /// Delete the materialized secret, then release the finalizer
    #[instrument(skip(self, api, ds), fields(derived = %identity(ds)))]
    async fn cleanup(&self, api: &Api<DerivedSecret>, ds: &DerivedSecret) -> Result<Action> {
        if !ds.has_finalizer() {
            self.backoff.reset(&identity(ds));
            return Ok(Action::await_change());
        }

        let name = ds.name_any();
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &namespace(ds));
        if delete_secret_if_exists(&secrets, &name).await? {
            info!("Deleted secret {}", identity(ds));
        }

        let mut updated = ds.clone();
        if let Some(finalizers) = updated.metadata.finalizers.as_mut() {
            finalizers.retain(|f| f != DERIVED_SECRET_FINALIZER);
        }
        api.replace(&name, &PostParams::default(), &updated).await?;

        self.backoff.reset(&identity(ds));
        Ok(Action::await_change())
    }

    /// Derive every key and bring the materialized secret in line.
    ///
    /// Returns the key hashes and whether the secret was written.
    #[instrument(skip(self, ds), fields(derived = %identity(ds)))]
    async fn materialize(&self, ds: &DerivedSecret) -> Result<(BTreeMap<String, u16>, bool)> {
        if ds.spec.keys.is_empty() {
            return Err(KeysmithError::InvalidSpec("no keys declared".to_string()));
        }

        // any unavailable master aborts before anything is written
        let mut masters = BTreeMap::new();
        for master_name in ds.master_secret_names() {
            let value =
                read_master_value(&self.client, master_name, &self.config.operator_namespace).await?;
            masters.insert(master_name.to_string(), value);
        }

        let namespace = namespace(ds);
        let name = ds.name_any();
        let keys = ds.spec.keys.clone();
        let values = tokio::task::spawn_blocking(move || derive_keys(&namespace, &name, &keys, &masters))
            .await
            .map_err(|e| KeysmithError::ReconciliationFailed(format!("derivation task failed: {}", e)))??;

        let key_hashes = values
            .iter()
            .map(|(key, value)| (key.clone(), key_hash(value.as_bytes())))
            .collect();
        let data = values
            .iter()
            .map(|(key, value)| (key.clone(), ByteString(value.as_bytes().to_vec())))
            .collect();

        let written = self.upsert_secret(ds, data).await?;
        Ok((key_hashes, written))
    }

    /// Create the secret or replace it when it drifted. Returns whether it was written.
    async fn upsert_secret(&self, ds: &DerivedSecret, data: BTreeMap<String, ByteString>) -> Result<bool> {
        let name = ds.name_any();
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &namespace(ds));
        let owner = ds.controller_owner_ref(&()).ok_or_else(|| {
            KeysmithError::ReconciliationFailed(format!("DerivedSecret {} has no uid", identity(ds)))
        })?;

        let Some(existing) = secrets.get_opt(&name).await? else {
            let secret = Secret {
                metadata: ObjectMeta {
                    name: Some(name.clone()),
                    namespace: ds.namespace(),
                    labels: ds.spec.labels.clone(),
                    annotations: ds.spec.annotations.clone(),
                    owner_references: Some(vec![owner]),
                    ..Default::default()
                },
                type_: Some(output_type(ds).to_string()),
                data: Some(data),
                ..Default::default()
            };
            secrets.create(&PostParams::default(), &secret).await?;
            info!("Created secret {}", identity(ds));
            return Ok(true);
        };

        let mut updated = existing.clone();
        let mut changed = false;

        // the API rejects a type change; the existing secret is left as is
        if existing.type_.as_deref().unwrap_or(DEFAULT_SECRET_TYPE) != output_type(ds) {
            updated.type_ = Some(output_type(ds).to_string());
            changed = true;
        }
        if existing.data.as_ref() != Some(&data) {
            updated.data = Some(data);
            changed = true;
        }
        if !same_map(existing.metadata.labels.as_ref(), ds.spec.labels.as_ref()) {
            updated.metadata.labels = ds.spec.labels.clone();
            changed = true;
        }
        if !same_map(existing.metadata.annotations.as_ref(), ds.spec.annotations.as_ref()) {
            updated.metadata.annotations = ds.spec.annotations.clone();
            changed = true;
        }
        let owner_refs = updated.metadata.owner_references.get_or_insert_with(Vec::new);
        if !owner_refs.iter().any(|r| r.uid == owner.uid) {
            owner_refs.retain(|r| r.controller != Some(true));
            owner_refs.push(owner);
            changed = true;
        }

        if !changed {
            debug!("Secret {} up to date", identity(ds));
            return Ok(false);
        }

        secrets.replace(&name, &PostParams::default(), &updated).await?;
        info!("Updated secret {}", identity(ds));
        Ok(true)
    }

    async fn update_status(&self, ds: &DerivedSecret, status: DerivedSecretStatus) -> Result<()> {
        if ds.status.as_ref() == Some(&status) {
            debug!("Status of DerivedSecret {} unchanged", identity(ds));
            return Ok(());
        }

        let api: Api<DerivedSecret> = Api::namespaced(self.client.clone(), &namespace(ds));
        let patch = status_patch(ds.status.as_ref(), &status)?;
        api.patch_status(&ds.name_any(), &PatchParams::default(), &Patch::Merge(patch))
            .await?;
        Ok(())
    }
}

/// Derive the value of every declared key
pub fn derive_keys(
    namespace: &str,
    name: &str,
    keys: &BTreeMap<String, DerivedKeySpec>,
    masters: &BTreeMap<String, Zeroizing<String>>,
) -> Result<DerivedValues> {
    keys.iter()
        .map(|(key, spec)| {
            let master = masters.get(spec.master_secret_name()).ok_or_else(|| {
                KeysmithError::MasterSecretUnavailable(spec.master_secret_name().to_string())
            })?;
            let context = build_context(namespace, name, key);
            let value = derive_secret(master, &context, spec.resolved_length())?;
            Ok((key.clone(), Zeroizing::new(value)))
        })
        .collect()
}

/// Merge patch for the status subresource, nulling key hashes that went away
fn status_patch(current: Option<&DerivedSecretStatus>, desired: &DerivedSecretStatus) -> Result<Value> {
    let mut status = serde_json::to_value(desired)?;
    if let Some(current) = current {
        for key in current.key_hashes.keys() {
            if !desired.key_hashes.contains_key(key) {
                status["keyHashes"][key] = Value::Null;
            }
        }
    }
    Ok(json!({ "status": status }))
}

fn same_map(a: Option<&BTreeMap<String, String>>, b: Option<&BTreeMap<String, String>>) -> bool {
    a.filter(|m| !m.is_empty()) == b.filter(|m| !m.is_empty())
}

fn output_type(ds: &DerivedSecret) -> &str {
    if ds.spec.output_type.is_empty() {
        DEFAULT_SECRET_TYPE
    } else {
        &ds.spec.output_type
    }
}

fn namespace(ds: &DerivedSecret) -> String {
    ds.namespace().unwrap_or_default()
}

fn identity(ds: &DerivedSecret) -> String {
    format!("{}/{}", namespace(ds), ds.name_any())
}

/// Inverse of [`identity`]
fn object_ref(identity: &str) -> Option<ObjectRef<DerivedSecret>> {
    let (namespace, name) = identity.split_once('/')?;
    Some(ObjectRef::new(name).within(namespace))
}

pub async fn reconcile(ds: Arc<DerivedSecret>, ctx: Arc<DerivedSecretReconciler>) -> Result<Action> {
    let api: Api<DerivedSecret> = Api::namespaced(ctx.client.clone(), &namespace(&ds));
    debug!("Reconciling DerivedSecret: {}", identity(&ds));

    match ds.lifecycle() {
        Lifecycle::Initializing => {
            ctx.add_finalizer(&api, &ds).await?;
            Ok(Action::requeue(Duration::ZERO))
        }
        Lifecycle::Terminating => ctx.cleanup(&api, &ds).await,
        Lifecycle::Active => {
            let mut status = ds.status.clone().unwrap_or_default();
            match ctx.materialize(&ds).await {
                Ok((key_hashes, written)) => {
                    status.secret_name = Some(ds.name_any());
                    status.ready = true;
                    if written {
                        status.last_updated = Some(Utc::now());
                    }
                    status.key_hashes = key_hashes;
                    status.conditions.set(Condition::new(
                        conditions::READY,
                        true,
                        ds.metadata.generation,
                        conditions::REASON_SECRET_READY,
                        "Secret is up to date",
                    ));
                    ctx.update_status(&ds, status).await?;
                    ctx.backoff.reset(&identity(&ds));
                    Ok(Action::await_change())
                }
                Err(e) if e.is_conflict() => Err(e),
                Err(e) => {
                    status.ready = false;
                    status.conditions.set(Condition::new(
                        conditions::READY,
                        false,
                        ds.metadata.generation,
                        e.reason(),
                        e.to_string(),
                    ));
                    if let Err(status_err) = ctx.update_status(&ds, status).await {
                        warn!(
                            "Failed to record failure on DerivedSecret {}: {}",
                            identity(&ds),
                            status_err
                        );
                    }
                    Err(e)
                }
            }
        }
    }
}

fn error_policy(ds: Arc<DerivedSecret>, error: &KeysmithError, ctx: Arc<DerivedSecretReconciler>) -> Action {
    ctx.backoff.action_for(&identity(&ds), error)
}
