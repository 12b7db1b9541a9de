// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::base_types::{Duration, NodeTime, RoundCount, RoundId};
use serde::Serialize;

/// Timing of the two phases of one round instance, as seen by one agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct BenchmarkRecord {
    pub round: RoundId,
    pub round_count: RoundCount,
    /// Wall-clock time spent producing the payload, in microseconds.
    pub local_micros: u128,
    pub submitted_at: NodeTime,
    /// Time between the submission of the payload and the end of the round.
    pub consensus: Option<Duration>,
}

/// Records local and consensus spans per round instance.
#[derive(Clone, Debug, Default)]
pub struct BenchmarkTool {
    records: Vec<BenchmarkRecord>,
}

impl BenchmarkTool {
    pub fn new() -> Self {
        BenchmarkTool::default()
    }

    pub fn record_local(
        &mut self,
        round: RoundId,
        round_count: RoundCount,
        elapsed: std::time::Duration,
        submitted_at: NodeTime,
    ) {
        self.records.push(BenchmarkRecord {
            round,
            round_count,
            local_micros: elapsed.as_micros(),
            submitted_at,
            consensus: None,
        });
    }

    /// Close the consensus span of the round instance `round_count`, if a payload was
    /// submitted for it.
    pub fn record_consensus(&mut self, round_count: RoundCount, resolved_at: NodeTime) {
        if let Some(record) = self
            .records
            .iter_mut()
            .rev()
            .find(|record| record.round_count == round_count)
        {
            record.consensus = Some(resolved_at.since(record.submitted_at));
        }
    }

    pub fn records(&self) -> &[BenchmarkRecord] {
        &self.records
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(&self.records)
    }
}
