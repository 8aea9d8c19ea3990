// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Backing secret lookup and secret deletion helpers

use crate::constants::MASTER_SECRET_KEY;
use crate::error::{KeysmithError, Result};
use crate::types::MasterSecret;
use k8s_openapi::api::core::v1::Secret;
use kube::{api::DeleteParams, Api, Client};
use tracing::{debug, instrument};
use zeroize::Zeroizing;

/// Extract the master value from a backing secret, if present and non-empty
pub fn master_value_from_secret(secret: &Secret) -> Option<Zeroizing<String>> {
    secret
        .data
        .as_ref()?
        .get(MASTER_SECRET_KEY)
        .filter(|value| !value.0.is_empty())
        .and_then(|value| String::from_utf8(value.0.clone()).ok())
        .map(Zeroizing::new)
}

/// Fetch the current master value of the named MasterSecret.
///
/// A missing MasterSecret, backing secret or value is reported as
/// [`KeysmithError::MasterSecretUnavailable`] since it may appear later.
#[instrument(skip(client))]
pub async fn read_master_value(
    client: &Client,
    master_name: &str,
    operator_namespace: &str,
) -> Result<Zeroizing<String>> {
    let masters: Api<MasterSecret> = Api::all(client.clone());
    let Some(master) = masters.get_opt(master_name).await? else {
        return Err(KeysmithError::MasterSecretUnavailable(format!(
            "MasterSecret {} not found",
            master_name
        )));
    };

    let location = master.backing_secret_location(operator_namespace);
    let secrets: Api<Secret> = Api::namespaced(client.clone(), &location.namespace);
    let Some(secret) = secrets.get_opt(&location.name).await? else {
        return Err(KeysmithError::MasterSecretUnavailable(format!(
            "secret {}/{} of MasterSecret {} not found",
            location.namespace, location.name, master_name
        )));
    };

    master_value_from_secret(&secret).ok_or_else(|| {
        KeysmithError::MasterSecretUnavailable(format!(
            "secret {}/{} of MasterSecret {} has no usable '{}' key",
            location.namespace, location.name, master_name, MASTER_SECRET_KEY
        ))
    })
}

/// Delete a secret, treating "already gone" as success.
///
/// Returns whether a secret was deleted.
#[instrument(skip(secrets))]
pub async fn delete_secret_if_exists(secrets: &Api<Secret>, name: &str) -> Result<bool> {
    match secrets.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(true),
        Err(kube::Error::Api(err)) if err.code == 404 => {
            debug!("Secret {} already gone", name);
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
