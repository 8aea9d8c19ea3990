// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for CRD discovery and secret access.

pub mod crd;
pub mod secrets;

pub use crd::wait_for_crds;
pub use secrets::{delete_secret_if_exists, master_value_from_secret, read_master_value};
