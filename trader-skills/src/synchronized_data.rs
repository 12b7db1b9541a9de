// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use abci_lib::{error::AbciResult, synchronized_data::SynchronizedData};
use serde_json::Value;

#[cfg(test)]
#[path = "unit_tests/synchronized_data_tests.rs"]
mod synchronized_data_tests;

pub const PARTICIPANTS: &str = "participants";
pub const SELECTED_STRATEGY: &str = "selected_strategy";
pub const DATA_HASH: &str = "data_hash";
pub const PARTICIPANT_TO_VERIFICATION: &str = "participant_to_verification";
pub const PORTFOLIO_HASH: &str = "portfolio_hash";
pub const ORDERS_HASH: &str = "orders_hash";
pub const INCOMPLETE_EXEC: &str = "incomplete_exec";
pub const PARTICIPANT_TO_BACKTESTING: &str = "participant_to_backtesting";
pub const INSTRUCTIONS_HASH: &str = "instructions_hash";
pub const INCOMPLETE_INSTRUCTIONS: &str = "incomplete_instructions";
pub const MOST_VOTED_INSTRUCTION_SET: &str = "most_voted_instruction_set";
pub const RESET_PERIOD: &str = "reset_period";

/// Typed access to the keys written by the trader rounds.
#[derive(Clone, Copy, Debug)]
pub struct TraderData<'a>(pub &'a SynchronizedData);

impl<'a> TraderData<'a> {
    pub fn selected_strategy(&self) -> AbciResult<&'a str> {
        self.0.get_strict_str(SELECTED_STRATEGY)
    }

    pub fn data_hash(&self) -> AbciResult<&'a str> {
        self.0.get_strict_str(DATA_HASH)
    }

    pub fn portfolio_hash(&self) -> AbciResult<&'a str> {
        self.0.get_strict_str(PORTFOLIO_HASH)
    }

    /// `None` when the strategy produced no orders.
    pub fn orders_hash(&self) -> AbciResult<Option<&'a str>> {
        nullable_str(self.0, ORDERS_HASH)
    }

    pub fn incomplete_exec(&self) -> AbciResult<bool> {
        self.0.get_strict_bool(INCOMPLETE_EXEC)
    }

    /// `None` when no order could be quoted.
    pub fn instructions_hash(&self) -> AbciResult<Option<&'a str>> {
        nullable_str(self.0, INSTRUCTIONS_HASH)
    }

    pub fn incomplete_instructions(&self) -> AbciResult<bool> {
        self.0.get_strict_bool(INCOMPLETE_INSTRUCTIONS)
    }

    /// Serialized instruction agreed upon last, empty once the queue is drained.
    pub fn most_voted_instruction_set(&self) -> AbciResult<&'a str> {
        self.0.get_strict_str(MOST_VOTED_INSTRUCTION_SET)
    }
}

fn nullable_str<'a>(data: &'a SynchronizedData, key: &str) -> AbciResult<Option<&'a str>> {
    match data.get_strict(key)? {
        Value::Null => Ok(None),
        _ => data.get_strict_str(key).map(Some),
    }
}
