// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::{
    abci_app::AbciApp,
    base_types::RoundId,
    error::{AbciError, AbciResult},
    interfaces::Behaviour,
};
use std::collections::{BTreeMap, BTreeSet};

#[cfg(test)]
#[path = "unit_tests/behaviour_tests.rs"]
mod behaviour_tests;

/// The behaviours of an agent, exactly one per non-final round of its app.
pub struct RoundBehaviour<Context: Send> {
    behaviours: BTreeMap<RoundId, Box<dyn Behaviour<Context>>>,
}

impl<Context: Send> RoundBehaviour<Context> {
    pub fn new(app: &AbciApp, behaviours: Vec<Box<dyn Behaviour<Context>>>) -> AbciResult<Self> {
        let mut registry = BTreeMap::new();
        for behaviour in behaviours {
            let round = behaviour.matching_round();
            ensure!(
                app.round_spec(round).is_some(),
                AbciError::InvalidBehaviours(format!(
                    "round {} is not part of {}",
                    round,
                    app.name()
                ))
            );
            ensure!(
                !app.is_final(round),
                AbciError::InvalidBehaviours(format!("round {} is a final state", round))
            );
            ensure!(
                registry.insert(round, behaviour).is_none(),
                AbciError::InvalidBehaviours(format!("round {} has several behaviours", round))
            );
        }
        let missing: BTreeSet<RoundId> = app
            .rounds()
            .filter(|spec| !app.is_final(spec.id) && !registry.contains_key(&spec.id))
            .map(|spec| spec.id)
            .collect();
        ensure!(
            missing.is_empty(),
            AbciError::InvalidBehaviours(format!("no behaviour for rounds {:?}", missing))
        );
        Ok(RoundBehaviour {
            behaviours: registry,
        })
    }

    pub fn get_mut(&mut self, round: RoundId) -> Option<&mut Box<dyn Behaviour<Context>>> {
        self.behaviours.get_mut(&round)
    }

    pub fn rounds(&self) -> impl Iterator<Item = RoundId> + '_ {
        self.behaviours.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.behaviours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviours.is_empty()
    }
}
