// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resources managed by keysmith.

pub mod condition;
pub mod derived_secret;
pub mod master_secret;

pub use condition::{Condition, Conditions};
pub use derived_secret::{
    DerivedKeySpec, DerivedSecret, DerivedSecretSpec, DerivedSecretStatus, Lifecycle, SecretType,
};
pub use master_secret::{
    MasterSecret, MasterSecretSpec, MasterSecretStatus, SecretLocation, SecretReference,
};
