// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::{
    base_types::Participant,
    payload::{values_key, Payload},
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[cfg(test)]
#[path = "unit_tests/collection_tests.rs"]
mod collection_tests;

/// The payloads received during one round instance, at most one per participant.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Collection {
    payloads: BTreeMap<Participant, Payload>,
}

/// Participants that sent the same values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValueGroup {
    pub values: Vec<Value>,
    pub count: usize,
}

impl Collection {
    pub fn new() -> Self {
        Collection::default()
    }

    /// Insert the payload of its sender, replacing (and returning) any previous one.
    pub fn add(&mut self, payload: Payload) -> Option<Payload> {
        self.payloads.insert(payload.sender.clone(), payload)
    }

    pub fn count(&self) -> usize {
        self.payloads.len()
    }

    pub fn has_threshold(&self, threshold: usize) -> bool {
        self.count() >= threshold
    }

    pub fn get(&self, sender: &Participant) -> Option<&Payload> {
        self.payloads.get(sender)
    }

    pub fn payloads(&self) -> impl Iterator<Item = &Payload> {
        self.payloads.values()
    }

    /// Whether a participant other than `sender` already sent these values.
    pub fn contains_value_from_other(&self, sender: &Participant, values: &[Value]) -> bool {
        let key = values_key(values);
        self.payloads
            .values()
            .any(|payload| payload.sender != *sender && payload.values_key() == key)
    }

    /// Group payloads by their values. Groups are sorted by decreasing size, then by the
    /// canonical encoding of their values, so the result does not depend on arrival order.
    pub fn tally(&self) -> Vec<ValueGroup> {
        let mut groups: BTreeMap<String, ValueGroup> = BTreeMap::new();
        for payload in self.payloads.values() {
            groups
                .entry(payload.values_key())
                .or_insert_with(|| ValueGroup {
                    values: payload.values.clone(),
                    count: 0,
                })
                .count += 1;
        }
        let mut groups: Vec<_> = groups.into_iter().collect();
        groups.sort_by(|(key1, group1), (key2, group2)| {
            group2.count.cmp(&group1.count).then_with(|| key1.cmp(key2))
        });
        groups.into_iter().map(|(_, group)| group).collect()
    }

    pub fn most_voted(&self) -> Option<ValueGroup> {
        self.tally().into_iter().next()
    }

    /// The values sent by at least `threshold` participants, if any. With a BFT quorum
    /// threshold at most one group can qualify.
    pub fn majority(&self, threshold: usize) -> Option<Vec<Value>> {
        self.most_voted()
            .filter(|group| group.count >= threshold)
            .map(|group| group.values)
    }

    /// Whether some group can still reach `threshold` once every participant that has not
    /// sent anything yet joins it.
    pub fn is_majority_possible(&self, num_participants: usize, threshold: usize) -> bool {
        let largest = self.most_voted().map_or(0, |group| group.count);
        let remaining = num_participants.saturating_sub(self.count());
        largest + remaining >= threshold
    }

    /// Number of payloads whose first value satisfies `predicate`.
    pub fn count_first_values<P>(&self, predicate: P) -> usize
    where
        P: Fn(&Value) -> bool,
    {
        self.payloads
            .values()
            .filter(|payload| payload.values.first().map_or(false, |value| predicate(value)))
            .count()
    }

    /// Snapshot written under a round's collection key.
    pub fn serialize(&self) -> Value {
        let map: Map<String, Value> = self
            .payloads
            .iter()
            .map(|(sender, payload)| (sender.0.clone(), Value::Array(payload.values.clone())))
            .collect();
        Value::Object(map)
    }
}
