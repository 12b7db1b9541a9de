// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(test)]
#[path = "unit_tests/base_type_tests.rs"]
mod base_type_tests;

/// Identity of an agent taking part in the service.
#[derive(Eq, PartialEq, Ord, PartialOrd, Clone, Hash, Debug, Serialize, Deserialize)]
pub struct Participant(pub String);

/// Monotonic sequence number of the round instances entered by a round sequence.
#[derive(
    Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Hash, Debug, Default, Serialize, Deserialize,
)]
pub struct RoundCount(pub u64);

/// Local time in milliseconds.
#[derive(Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Hash, Serialize, Deserialize)]
pub struct NodeTime(pub i64);

/// Duration in milliseconds.
#[derive(Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Hash, Debug, Serialize, Deserialize)]
pub struct Duration(pub i64);

/// Outcome of a round, used as a lookup key in transition tables. Events are compared
/// by name so that apps defined in different modules can be chained.
#[derive(Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Hash, Debug, Serialize)]
pub struct Event(pub &'static str);

/// Name of a round, i.e. a state of an app.
#[derive(Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Hash, Debug, Serialize)]
pub struct RoundId(pub &'static str);

impl Event {
    pub const DONE: Event = Event("done");
    pub const NONE: Event = Event("none");
    pub const NO_MAJORITY: Event = Event("no_majority");
    pub const ROUND_TIMEOUT: Event = Event("round_timeout");
}

impl Participant {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Participant(name.into())
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for RoundId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for NodeTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl std::ops::Add<u64> for RoundCount {
    type Output = RoundCount;

    fn add(self, rhs: u64) -> Self::Output {
        RoundCount(self.0 + rhs)
    }
}

impl NodeTime {
    pub fn never() -> Self {
        NodeTime(std::i64::MAX)
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn since(self, earlier: NodeTime) -> Duration {
        Duration(std::cmp::max(0, self.0.saturating_sub(earlier.0)))
    }
}

impl Default for NodeTime {
    fn default() -> Self {
        Self::never()
    }
}

impl std::ops::Add<Duration> for NodeTime {
    type Output = NodeTime;

    fn add(self, rhs: Duration) -> Self::Output {
        NodeTime(self.0.saturating_add(rhs.0))
    }
}

impl Duration {
    /// Convert a timeout expressed in seconds, as found in app definitions.
    pub fn from_secs_f64(seconds: f64) -> Self {
        Duration((seconds * 1000.0).round() as i64)
    }

    pub fn as_std(self) -> std::time::Duration {
        std::time::Duration::from_millis(std::cmp::max(0, self.0) as u64)
    }
}
