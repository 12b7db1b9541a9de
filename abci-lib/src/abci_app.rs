// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::{
    base_types::{Duration, Event, RoundId},
    error::{AbciError, AbciResult},
    round::RoundSpec,
};
use std::{
    collections::{BTreeMap, BTreeSet, VecDeque},
    sync::Arc,
};

#[cfg(test)]
#[path = "unit_tests/abci_app_tests.rs"]
mod abci_app_tests;

pub type TransitionFunction = BTreeMap<RoundId, BTreeMap<Event, RoundId>>;

/// A validated, immutable finite-state machine over rounds.
#[derive(Clone, Debug)]
pub struct AbciApp {
    pub(crate) name: String,
    pub(crate) initial_round: RoundId,
    pub(crate) initial_states: BTreeSet<RoundId>,
    pub(crate) final_states: BTreeSet<RoundId>,
    pub(crate) rounds: BTreeMap<RoundId, Arc<RoundSpec>>,
    pub(crate) transition_function: TransitionFunction,
    pub(crate) event_to_timeout: BTreeMap<Event, Duration>,
    pub(crate) cross_period_persisted_keys: BTreeSet<String>,
    pub(crate) db_pre_conditions: BTreeMap<RoundId, BTreeSet<String>>,
    pub(crate) db_post_conditions: BTreeMap<RoundId, BTreeSet<String>>,
}

/// Collects the parts of an app, then validates them in `build`.
#[derive(Debug)]
pub struct AbciAppBuilder {
    app: AbciApp,
    errors: Vec<String>,
}

impl AbciApp {
    pub fn builder<S: Into<String>>(name: S, initial_round: RoundId) -> AbciAppBuilder {
        AbciAppBuilder {
            app: AbciApp::empty(name, initial_round),
            errors: Vec::new(),
        }
    }

    pub(crate) fn empty<S: Into<String>>(name: S, initial_round: RoundId) -> AbciApp {
        AbciApp {
            name: name.into(),
            initial_round,
            initial_states: BTreeSet::new(),
            final_states: BTreeSet::new(),
            rounds: BTreeMap::new(),
            transition_function: BTreeMap::new(),
            event_to_timeout: BTreeMap::new(),
            cross_period_persisted_keys: BTreeSet::new(),
            db_pre_conditions: BTreeMap::new(),
            db_post_conditions: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initial_round(&self) -> RoundId {
        self.initial_round
    }

    pub fn initial_states(&self) -> &BTreeSet<RoundId> {
        &self.initial_states
    }

    pub fn final_states(&self) -> &BTreeSet<RoundId> {
        &self.final_states
    }

    pub fn is_final(&self, round: RoundId) -> bool {
        self.final_states.contains(&round)
    }

    pub fn rounds(&self) -> impl Iterator<Item = &RoundSpec> {
        self.rounds.values().map(|spec| spec.as_ref())
    }

    pub fn round_spec(&self, round: RoundId) -> Option<&Arc<RoundSpec>> {
        self.rounds.get(&round)
    }

    pub fn transition_function(&self) -> &TransitionFunction {
        &self.transition_function
    }

    pub fn event_to_timeout(&self) -> &BTreeMap<Event, Duration> {
        &self.event_to_timeout
    }

    pub fn cross_period_persisted_keys(&self) -> &BTreeSet<String> {
        &self.cross_period_persisted_keys
    }

    pub fn db_pre_conditions(&self, round: RoundId) -> BTreeSet<String> {
        self.db_pre_conditions
            .get(&round)
            .cloned()
            .unwrap_or_default()
    }

    pub fn db_post_conditions(&self, round: RoundId) -> BTreeSet<String> {
        self.db_post_conditions
            .get(&round)
            .cloned()
            .unwrap_or_default()
    }

    pub fn next_round(&self, round: RoundId, event: Event) -> AbciResult<RoundId> {
        self.transition_function
            .get(&round)
            .and_then(|transitions| transitions.get(&event))
            .copied()
            .ok_or(AbciError::MissingTransition { round, event })
    }

    /// Timeout events that `round` reacts to, with their durations.
    pub fn timeouts(&self, round: RoundId) -> Vec<(Event, Duration)> {
        let transitions = match self.transition_function.get(&round) {
            Some(transitions) => transitions,
            None => return Vec::new(),
        };
        self.event_to_timeout
            .iter()
            .filter(|(event, _)| transitions.contains_key(event))
            .map(|(event, duration)| (*event, *duration))
            .collect()
    }

    /// Whether some round opens a new period, dropping the non-persisted keys.
    pub fn resets_period(&self) -> bool {
        self.rounds.values().any(|spec| spec.starts_new_period)
    }

    /// Final states reachable from `start` without leaving this app.
    pub fn reachable_final_states(&self, start: RoundId) -> BTreeSet<RoundId> {
        self.reachable_from(std::iter::once(start))
            .into_iter()
            .filter(|round| self.is_final(*round))
            .collect()
    }

    fn reachable_from<I>(&self, starts: I) -> BTreeSet<RoundId>
    where
        I: IntoIterator<Item = RoundId>,
    {
        let mut visited = BTreeSet::new();
        let mut queue: VecDeque<RoundId> = starts.into_iter().collect();
        while let Some(round) = queue.pop_front() {
            if !visited.insert(round) {
                continue;
            }
            if let Some(transitions) = self.transition_function.get(&round) {
                queue.extend(transitions.values().copied());
            }
        }
        visited
    }

    fn invalid<S: Into<String>>(&self, reason: S) -> AbciError {
        AbciError::InvalidApp {
            app: self.name.clone(),
            reason: reason.into(),
        }
    }

    /// Static checks that every well-formed app satisfies.
    pub fn validate(&self) -> AbciResult<()> {
        ensure!(
            self.rounds.contains_key(&self.initial_round),
            self.invalid(format!("unknown initial round {}", self.initial_round))
        );
        ensure!(
            self.initial_states.contains(&self.initial_round),
            self.invalid("the initial round must be an initial state")
        );
        for round in self.initial_states.iter().chain(self.final_states.iter()) {
            ensure!(
                self.rounds.contains_key(round),
                self.invalid(format!("unknown state {}", round))
            );
        }
        for (round, transitions) in &self.transition_function {
            ensure!(
                self.rounds.contains_key(round),
                self.invalid(format!("transitions from unknown round {}", round))
            );
            for (event, target) in transitions {
                ensure!(
                    self.rounds.contains_key(target),
                    self.invalid(format!(
                        "transition {} -[{}]-> unknown round {}",
                        round, event, target
                    ))
                );
            }
        }
        for spec in self.rounds.values() {
            self.validate_round(spec)?;
        }
        for event in self.event_to_timeout.keys() {
            ensure!(
                self.transition_function
                    .values()
                    .any(|transitions| transitions.contains_key(event)),
                self.invalid(format!("timeout event {} is never handled", event))
            );
        }
        for round in self.db_pre_conditions.keys() {
            ensure!(
                self.initial_states.contains(round),
                self.invalid(format!(
                    "pre-conditions declared on {} which is not an initial state",
                    round
                ))
            );
        }
        for round in self.db_post_conditions.keys() {
            ensure!(
                self.final_states.contains(round),
                self.invalid(format!(
                    "post-conditions declared on {} which is not a final state",
                    round
                ))
            );
        }
        for round in &self.final_states {
            ensure!(
                self.db_post_conditions.contains_key(round),
                self.invalid(format!("final state {} has no post-conditions", round))
            );
        }
        let reachable = self.reachable_from(self.initial_states.iter().copied());
        for round in self.rounds.keys() {
            ensure!(
                reachable.contains(round),
                self.invalid(format!("round {} is unreachable", round))
            );
        }
        Ok(())
    }

    fn validate_round(&self, spec: &RoundSpec) -> AbciResult<()> {
        let round = spec.id;
        let transitions = self.transition_function.get(&round);
        if self.final_states.contains(&round) {
            ensure!(
                spec.is_final(),
                self.invalid(format!("final state {} must be degenerate", round))
            );
            ensure!(
                transitions.map_or(true, BTreeMap::is_empty),
                self.invalid(format!("final state {} has outgoing transitions", round))
            );
            return Ok(());
        }
        ensure!(
            !spec.is_final(),
            self.invalid(format!(
                "degenerate round {} is not a final state",
                round
            ))
        );
        for event in spec.emitted_events() {
            ensure!(
                transitions.map_or(false, |t| t.contains_key(&event)),
                self.invalid(format!(
                    "round {} may emit {} but has no transition for it",
                    round, event
                ))
            );
        }
        if !spec.selection_keys.is_empty() {
            ensure!(
                spec.selection_keys.len() == spec.schema.arity(),
                self.invalid(format!(
                    "round {} selects {} key(s) from payloads of {} attribute(s)",
                    round,
                    spec.selection_keys.len(),
                    spec.schema.arity()
                ))
            );
        }
        Ok(())
    }
}

impl AbciAppBuilder {
    /// Add a round. Rounds added through `final_round` are degenerate final states.
    pub fn round(mut self, spec: RoundSpec) -> Self {
        let id = spec.id;
        if self.app.rounds.insert(id, Arc::new(spec)).is_some() {
            self.errors.push(format!("round {} defined twice", id));
        }
        self
    }

    /// Add a final state with the keys it guarantees.
    pub fn final_round(mut self, id: RoundId, post_conditions: &[&str]) -> Self {
        self.app.final_states.insert(id);
        self.app
            .db_post_conditions
            .insert(id, post_conditions.iter().map(|k| k.to_string()).collect());
        self.round(RoundSpec::degenerate(id))
    }

    pub fn initial_state(mut self, id: RoundId) -> Self {
        self.app.initial_states.insert(id);
        self
    }

    pub fn transition(mut self, from: RoundId, event: Event, to: RoundId) -> Self {
        let previous = self
            .app
            .transition_function
            .entry(from)
            .or_default()
            .insert(event, to);
        if let Some(previous) = previous {
            if previous != to {
                self.errors.push(format!(
                    "conflicting transitions {} -[{}]-> {} and {}",
                    from, event, previous, to
                ));
            }
        }
        self
    }

    pub fn timeout(mut self, event: Event, duration: Duration) -> Self {
        self.app.event_to_timeout.insert(event, duration);
        self
    }

    pub fn persisted_keys(mut self, keys: &[&str]) -> Self {
        self.app
            .cross_period_persisted_keys
            .extend(keys.iter().map(|k| k.to_string()));
        self
    }

    pub fn pre_conditions(mut self, id: RoundId, keys: &[&str]) -> Self {
        self.app
            .db_pre_conditions
            .insert(id, keys.iter().map(|k| k.to_string()).collect());
        self
    }

    pub fn build(mut self) -> AbciResult<AbciApp> {
        if let Some(reason) = self.errors.into_iter().next() {
            bail!(self.app.invalid(reason));
        }
        let initial_round = self.app.initial_round;
        self.app.initial_states.insert(initial_round);
        for round in &self.app.final_states {
            self.app.transition_function.entry(*round).or_default();
        }
        self.app.validate()?;
        Ok(self.app)
    }
}
