// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Per-resource exponential retry delays for failed reconciles.

use crate::error::KeysmithError;
use kube::runtime::controller::Action;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

/// Tracks consecutive failures per resource identity.
///
/// The n-th consecutive failure waits `base * 2^(n-1)`, capped at `max`.
#[derive(Debug)]
pub struct RetryBackoff {
    base: Duration,
    max: Duration,
    failures: Mutex<HashMap<String, u32>>,
}

impl RetryBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failures: Mutex::new(HashMap::new()),
        }
    }

    /// Record a failure and return the delay before the next attempt
    pub fn next_delay(&self, identity: &str) -> Duration {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        let count = failures.entry(identity.to_string()).or_insert(0);
        let exponent = (*count).min(16);
        *count = count.saturating_add(1);

        self.base.saturating_mul(1 << exponent).min(self.max)
    }

    /// Forget failures after a successful reconcile
    pub fn reset(&self, identity: &str) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(identity);
    }

    /// Drop failure counts of identities that no longer exist
    pub fn retain(&self, exists: impl Fn(&str) -> bool) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|identity, _| exists(identity));
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.failures.lock().unwrap().len()
    }

    /// Requeue decision for a failed reconcile.
    ///
    /// Conflicts retry at once, permanent errors wait for the resource to
    /// change, everything else backs off.
    pub fn action_for(&self, identity: &str, error: &KeysmithError) -> Action {
        if error.is_conflict() {
            debug!("Conflict on {}, retrying immediately: {}", identity, error);
            Action::requeue(Duration::ZERO)
        } else if error.is_permanent() {
            warn!("Reconcile of {} failed permanently, waiting for a change: {}", identity, error);
            Action::await_change()
        } else {
            let delay = self.next_delay(identity);
            warn!(
                "Reconcile of {} failed, retrying in {}s: {}",
                identity,
                delay.as_secs(),
                error
            );
            Action::requeue(delay)
        }
    }
}
