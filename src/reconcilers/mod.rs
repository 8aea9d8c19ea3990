// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Controllers for MasterSecret and DerivedSecret resources.

pub mod backoff;
pub mod derived_secret;
pub mod mappers;
pub mod master_secret;

pub use derived_secret::DerivedSecretReconciler;
pub use master_secret::MasterSecretReconciler;
