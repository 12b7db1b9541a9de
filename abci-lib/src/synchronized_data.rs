// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::{
    content_store::content_hash,
    error::{AbciError, AbciResult},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

#[cfg(test)]
#[path = "unit_tests/synchronized_data_tests.rs"]
mod synchronized_data_tests;

/// The replicated key-value store that every honest agent holds identically.
/// Rounds only ever return updated copies: each accepted update bumps `version`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynchronizedData {
    period_count: u64,
    version: u64,
    data: BTreeMap<String, Value>,
    cross_period_persisted_keys: BTreeSet<String>,
}

impl SynchronizedData {
    pub fn new(cross_period_persisted_keys: BTreeSet<String>) -> Self {
        SynchronizedData {
            cross_period_persisted_keys,
            ..SynchronizedData::default()
        }
    }

    pub fn period_count(&self) -> u64 {
        self.period_count
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn cross_period_persisted_keys(&self) -> &BTreeSet<String> {
        &self.cross_period_persisted_keys
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.data.keys().map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Read a key that a previous round must have written.
    pub fn get_strict(&self, key: &str) -> AbciResult<&Value> {
        self.data
            .get(key)
            .ok_or_else(|| AbciError::MissingKey(key.to_string()))
    }

    pub fn get_strict_str(&self, key: &str) -> AbciResult<&str> {
        self.get_strict(key)?
            .as_str()
            .ok_or_else(|| AbciError::InvalidValue {
                key: key.to_string(),
                expected: "string",
            })
    }

    pub fn get_strict_bool(&self, key: &str) -> AbciResult<bool> {
        self.get_strict(key)?
            .as_bool()
            .ok_or_else(|| AbciError::InvalidValue {
                key: key.to_string(),
                expected: "boolean",
            })
    }

    pub fn get_strict_as<T: DeserializeOwned>(&self, key: &str) -> AbciResult<T> {
        let value = self.get_strict(key)?.clone();
        Ok(serde_json::from_value(value)?)
    }

    /// Return a new version with the given keys written.
    pub fn update<I, K>(&self, values: I) -> SynchronizedData
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut next = self.clone();
        for (key, value) in values {
            next.data.insert(key.into(), value);
        }
        next.version += 1;
        next
    }

    /// Start the next period: only the cross-period persisted keys survive.
    pub fn create_new_period(&self) -> SynchronizedData {
        let data = self
            .data
            .iter()
            .filter(|(key, _)| self.cross_period_persisted_keys.contains(*key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        SynchronizedData {
            period_count: self.period_count + 1,
            version: self.version + 1,
            data,
            cross_period_persisted_keys: self.cross_period_persisted_keys.clone(),
        }
    }

    /// Content hash of the canonical encoding, equal on agents that agree bit-for-bit.
    pub fn digest(&self) -> AbciResult<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(content_hash(&bytes))
    }
}
