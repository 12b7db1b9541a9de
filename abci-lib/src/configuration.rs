// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::base_types::Participant;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256StarStar;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[cfg(test)]
#[path = "unit_tests/configuration_tests.rs"]
mod configuration_tests;

/// The agents taking part in a consensus period. Every participant carries one vote.
/// NOTE: participants are kept sorted, so that keeper selections based on `pick_keeper`
/// agree across agents regardless of how each agent listed them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantSet {
    participants: Vec<Participant>,
}

impl ParticipantSet {
    pub fn new<I>(participants: I) -> Self
    where
        I: IntoIterator<Item = Participant>,
    {
        let participants: BTreeSet<_> = participants.into_iter().collect();
        ParticipantSet {
            participants: participants.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn contains(&self, participant: &Participant) -> bool {
        self.participants.binary_search(participant).is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter()
    }

    pub fn quorum_threshold(&self) -> usize {
        // If N = 3f + 1 + k (0 <= k < 3)
        // then 2N/3 + 1 = 2f + 1 + k = ceil((2N + 1) / 3)
        2 * self.len() / 3 + 1
    }

    /// Deterministically pick one participant from a seed shared by all agents.
    pub fn pick_keeper(&self, seed: u64) -> Option<Participant> {
        if self.is_empty() {
            return None;
        }
        let mut rng = Xoshiro256StarStar::seed_from_u64(seed);
        let index = rng.gen_range(0..self.len());
        self.participants.get(index).cloned()
    }
}
