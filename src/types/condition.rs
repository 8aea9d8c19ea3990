// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Status conditions keyed by type.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const STATUS_TRUE: &str = "True";
pub const STATUS_FALSE: &str = "False";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    /// "True" or "False"
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

impl Condition {
    pub fn new(
        condition_type: &str,
        status: bool,
        observed_generation: Option<i64>,
        reason: &str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            condition_type: condition_type.to_string(),
            status: if status { STATUS_TRUE } else { STATUS_FALSE }.to_string(),
            observed_generation,
            last_transition_time: Some(Utc::now()),
            reason: reason.to_string(),
            message: message.into(),
        }
    }

    pub fn is_true(&self) -> bool {
        self.status == STATUS_TRUE
    }
}

/// Conditions of a resource, at most one per type.
///
/// Serialized as a list ordered by type.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(from = "Vec<Condition>", into = "Vec<Condition>")]
pub struct Conditions(BTreeMap<String, Condition>);

impl Conditions {
    /// Insert or replace the condition of the same type.
    ///
    /// The transition time is carried over when the status did not change.
    pub fn set(&mut self, mut condition: Condition) {
        if let Some(existing) = self.0.get(&condition.condition_type) {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time;
            }
        }
        self.0.insert(condition.condition_type.clone(), condition);
    }

    pub fn get(&self, condition_type: &str) -> Option<&Condition> {
        self.0.get(condition_type)
    }

    pub fn is_true(&self, condition_type: &str) -> bool {
        self.get(condition_type).is_some_and(Condition::is_true)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.0.values()
    }
}

impl From<Vec<Condition>> for Conditions {
    fn from(list: Vec<Condition>) -> Self {
        let mut conditions = Conditions::default();
        for condition in list {
            conditions.0.insert(condition.condition_type.clone(), condition);
        }
        conditions
    }
}

impl From<Conditions> for Vec<Condition> {
    fn from(conditions: Conditions) -> Self {
        conditions.0.into_values().collect()
    }
}

impl JsonSchema for Conditions {
    fn schema_name() -> String {
        "Conditions".to_string()
    }

    fn json_schema(gen: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        <Vec<Condition>>::json_schema(gen)
    }

    fn is_referenceable() -> bool {
        false
    }
}
