// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use keysmith::types::{DerivedSecret, MasterSecret};
use kube::CustomResourceExt;

/// Print the CustomResourceDefinitions as a multi-document YAML stream
fn main() -> Result<()> {
    print!("{}", serde_yaml::to_string(&MasterSecret::crd())?);
    println!("---");
    print!("{}", serde_yaml::to_string(&DerivedSecret::crd())?);
    Ok(())
}
