// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! MasterSecret reconciler - keeps each master's backing secret present and
//! reports where it lives and how many DerivedSecrets depend on it.

use crate::config::Config;
use crate::constants::{conditions, labels, DEFAULT_SECRET_TYPE, MASTER_SECRET_KEY, OPERATOR_NAME};
use crate::crypto::generate_random_secret;
use crate::error::{KeysmithError, Result};
use crate::kubernetes::master_value_from_secret;
use crate::reconcilers::backoff::RetryBackoff;
use crate::reconcilers::mappers::{master_secrets_for_derived, master_secrets_for_secret};
use crate::types::{Condition, DerivedSecret, MasterSecret, MasterSecretStatus, SecretLocation};
use futures::StreamExt;
use kube::runtime::reflector::ObjectRef;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::{
    api::{ListParams, ObjectMeta, Patch, PatchParams, PostParams},
    runtime::{controller::Action, controller::Config as ControllerConfig, watcher, Controller},
    Api, Client, ResourceExt,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use zeroize::Zeroizing;

pub struct MasterSecretReconciler {
    client: Client,
    config: Config,
    backoff: RetryBackoff,
}

impl MasterSecretReconciler {
    pub fn new(client: Client, config: Config) -> Self {
        let backoff = RetryBackoff::new(config.retry_base, config.retry_max);
        Self {
            client,
            config,
            backoff,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let masters: Api<MasterSecret> = Api::all(self.client.clone());
        let derived: Api<DerivedSecret> = Api::all(self.client.clone());
        let secrets: Api<Secret> =
            Api::namespaced(self.client.clone(), &self.config.operator_namespace);
        let operator_namespace = self.config.operator_namespace.clone();
        let concurrency = self.config.concurrency;
        let context = Arc::new(self);
        let pruner = context.clone();

        let controller = Controller::new(masters, watcher::Config::default());
        let store = controller.store();
        let known = store.clone();

        controller
            .watches(secrets, watcher::Config::default(), move |secret: Secret| {
                master_secrets_for_secret(&secret, &store.state(), &operator_namespace)
            })
            .watches(derived, watcher::Config::default(), |ds: DerivedSecret| {
                master_secrets_for_derived(&ds)
            })
            .with_config(ControllerConfig::default().concurrency(concurrency))
            .shutdown_on_signal()
            .run(reconcile, error_policy, context)
            .for_each(|res| {
                pruner
                    .backoff
                    .retain(|name| known.get(&ObjectRef::new(name)).is_some());
                async move {
                    match res {
                        Ok(o) => debug!("Reconciled MasterSecret: {:?}", o),
                        Err(e) => warn!("MasterSecret reconciliation error: {:?}", e),
                    }
                }
            })
            .await;

        Ok(())
    }

    /// Make sure the backing secret exists and carries the expected key,
    /// merging spec annotations into it.
    #[instrument(skip(self, master), fields(master_secret = %master.name_any()))]
    async fn ensure_backing_secret(&self, master: &MasterSecret) -> Result<SecretLocation> {
        let name = master.name_any();
        let location = master.backing_secret_location(&self.config.operator_namespace);
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &location.namespace);

        let Some(existing) = secrets.get_opt(&location.name).await? else {
            if !master.should_create() {
                return Err(KeysmithError::SecretReconciliationFailed(format!(
                    "secret {}/{} does not exist and secretRef.create is false",
                    location.namespace, location.name
                )));
            }

            let value = Zeroizing::new(generate_random_secret(master.master_length())?);
            let secret = backing_secret(master, &location, &value);
            secrets.create(&PostParams::default(), &secret).await?;
            info!(
                "Created backing secret {}/{} for MasterSecret {}",
                location.namespace, location.name, name
            );
            return Ok(location);
        };

        if master_value_from_secret(&existing).is_none() {
            return Err(KeysmithError::SecretReconciliationFailed(format!(
                "secret {}/{} has no usable '{}' key",
                location.namespace, location.name, MASTER_SECRET_KEY
            )));
        }

        if let Some(updated) = merge_backing_metadata(master, &existing) {
            secrets
                .replace(&location.name, &PostParams::default(), &updated)
                .await?;
            info!(
                "Updated metadata of backing secret {}/{}",
                location.namespace, location.name
            );
        }

        Ok(location)
    }

    async fn count_dependents(&self, master_name: &str) -> Result<i32> {
        let derived: Api<DerivedSecret> = Api::all(self.client.clone());
        let count = derived
            .list(&ListParams::default())
            .await?
            .items
            .iter()
            .filter(|ds| ds.references_master(master_name))
            .count();
        Ok(i32::try_from(count).unwrap_or(i32::MAX))
    }

    async fn update_status(&self, master: &MasterSecret, status: MasterSecretStatus) -> Result<()> {
        if master.status.as_ref() == Some(&status) {
            debug!("Status of MasterSecret {} unchanged", master.name_any());
            return Ok(());
        }

        let api: Api<MasterSecret> = Api::all(self.client.clone());
        api.patch_status(
            &master.name_any(),
            &PatchParams::default(),
            &Patch::Merge(json!({ "status": status })),
        )
        .await?;
        Ok(())
    }
}

fn backing_secret(master: &MasterSecret, location: &SecretLocation, value: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(location.name.clone()),
            namespace: Some(location.namespace.clone()),
            labels: Some(BTreeMap::from([
                (labels::MANAGED_BY.to_string(), OPERATOR_NAME.to_string()),
                (labels::MASTER_SECRET.to_string(), master.name_any()),
            ])),
            annotations: master.spec.annotations.clone(),
            ..Default::default()
        },
        type_: Some(DEFAULT_SECRET_TYPE.to_string()),
        data: Some(BTreeMap::from([(
            MASTER_SECRET_KEY.to_string(),
            ByteString(value.as_bytes().to_vec()),
        )])),
        ..Default::default()
    }
}

/// The backing secret with spec annotations and the master label merged in,
/// or `None` when nothing is missing. Foreign metadata is left alone.
fn merge_backing_metadata(master: &MasterSecret, existing: &Secret) -> Option<Secret> {
    let mut updated = existing.clone();
    let mut changed = false;

    if let Some(wanted) = &master.spec.annotations {
        let annotations = updated.metadata.annotations.get_or_insert_with(BTreeMap::new);
        for (key, value) in wanted {
            if annotations.get(key) != Some(value) {
                annotations.insert(key.clone(), value.clone());
                changed = true;
            }
        }
    }

    let master_name = master.name_any();
    let secret_labels = updated.metadata.labels.get_or_insert_with(BTreeMap::new);
    if secret_labels.get(labels::MASTER_SECRET) != Some(&master_name) {
        secret_labels.insert(labels::MASTER_SECRET.to_string(), master_name);
        changed = true;
    }

    changed.then_some(updated)
}

pub async fn reconcile(master: Arc<MasterSecret>, ctx: Arc<MasterSecretReconciler>) -> Result<Action> {
    let name = master.name_any();
    debug!("Reconciling MasterSecret: {}", name);

    let mut status = master.status.clone().unwrap_or_default();

    let outcome = match ctx.ensure_backing_secret(&master).await {
        Ok(location) => ctx
            .count_dependents(&name)
            .await
            .map(|dependents| (location, dependents)),
        Err(e) => Err(e),
    };

    match outcome {
        Ok((location, dependents)) => {
            status.stored_at = Some(location);
            status.ready = true;
            status.dependent_count = dependents;
            status.conditions.set(Condition::new(
                conditions::READY,
                true,
                master.metadata.generation,
                conditions::REASON_SECRET_READY,
                "Backing secret is available",
            ));
            ctx.update_status(&master, status).await?;
            ctx.backoff.reset(&name);
            Ok(Action::await_change())
        }
        Err(e) if e.is_conflict() => Err(e),
        Err(e) => {
            status.ready = false;
            status.conditions.set(Condition::new(
                conditions::READY,
                false,
                master.metadata.generation,
                conditions::REASON_SECRET_RECONCILIATION_FAILED,
                e.to_string(),
            ));
            if let Err(status_err) = ctx.update_status(&master, status).await {
                warn!("Failed to record failure on MasterSecret {}: {}", name, status_err);
            }
            Err(e)
        }
    }
}

fn error_policy(master: Arc<MasterSecret>, error: &KeysmithError, ctx: Arc<MasterSecretReconciler>) -> Action {
    ctx.backoff.action_for(&master.name_any(), error)
}
