// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::base_types::{Participant, RoundCount};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[cfg(test)]
#[path = "unit_tests/payload_tests.rs"]
mod payload_tests;

/// A value submitted by one participant for one round instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub sender: Participant,
    pub round_count: RoundCount,
    pub values: Vec<Value>,
}

impl Payload {
    pub fn new(sender: Participant, round_count: RoundCount, values: Vec<Value>) -> Self {
        Payload {
            sender,
            round_count,
            values,
        }
    }

    /// Canonical representation of the values, used to group identical payloads.
    pub fn values_key(&self) -> String {
        values_key(&self.values)
    }

    pub fn is_all_null(&self) -> bool {
        self.values.iter().all(Value::is_null)
    }
}

pub(crate) fn values_key(values: &[Value]) -> String {
    // Objects are backed by ordered maps, hence the encoding is canonical.
    Value::Array(values.to_vec()).to_string()
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AttributeKind {
    String,
    Bool,
    Integer,
    Float,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    pub name: &'static str,
    pub kind: AttributeKind,
    pub optional: bool,
}

/// Declared shape of the payloads of a round.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PayloadSchema {
    attributes: Vec<Attribute>,
}

impl Attribute {
    pub fn required(name: &'static str, kind: AttributeKind) -> Self {
        Attribute {
            name,
            kind,
            optional: false,
        }
    }

    pub fn optional(name: &'static str, kind: AttributeKind) -> Self {
        Attribute {
            name,
            kind,
            optional: true,
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return self.optional;
        }
        match self.kind {
            AttributeKind::String => value.is_string(),
            AttributeKind::Bool => value.is_boolean(),
            AttributeKind::Integer => value.is_i64() || value.is_u64(),
            AttributeKind::Float => value.is_number(),
            AttributeKind::Json => true,
        }
    }
}

impl PayloadSchema {
    pub fn new(attributes: Vec<Attribute>) -> Self {
        PayloadSchema { attributes }
    }

    /// A single tri-state vote.
    pub fn vote() -> Self {
        PayloadSchema::new(vec![Attribute::optional("vote", AttributeKind::Bool)])
    }

    pub fn arity(&self) -> usize {
        self.attributes.len()
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Return a description of the first violation, if any.
    pub fn check(&self, values: &[Value]) -> Option<String> {
        if values.len() != self.attributes.len() {
            return Some(format!(
                "expected {} attribute(s), got {}",
                self.attributes.len(),
                values.len()
            ));
        }
        self.attributes
            .iter()
            .zip(values)
            .find(|(attribute, value)| !attribute.accepts(value))
            .map(|(attribute, value)| {
                format!(
                    "attribute {:?} does not accept {} (expected {:?}{})",
                    attribute.name,
                    value,
                    attribute.kind,
                    if attribute.optional { " or null" } else { "" }
                )
            })
    }
}
