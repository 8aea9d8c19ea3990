// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::{Context, Result};
use kube::Client;
use tracing::{info, warn};

use keysmith::config::Config;
use keysmith::kubernetes::wait_for_crds;
use keysmith::reconcilers::{DerivedSecretReconciler, MasterSecretReconciler};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    info!("Starting keysmith operator");

    let config = Config::from_env()?;
    info!(
        "Configuration loaded: operator_namespace={}, concurrency={}",
        config.operator_namespace, config.concurrency
    );

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    info!("Connected to Kubernetes cluster");

    info!("Waiting for keysmith CRDs to become available...");
    wait_for_crds(&client).await?;

    let master_reconciler = MasterSecretReconciler::new(client.clone(), config.clone());
    let derived_reconciler = DerivedSecretReconciler::new(client, config);

    info!("Starting reconcilers...");

    tokio::try_join!(master_reconciler.run(), derived_reconciler.run())?;

    warn!("Reconcilers stopped");
    Ok(())
}
