// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::{
    abci_app::AbciApp,
    base_types::{Event, NodeTime, RoundCount, RoundId},
    configuration::ParticipantSet,
    error::{AbciError, AbciResult},
    payload::Payload,
    round::Round,
    synchronized_data::SynchronizedData,
};
use log::debug;
use serde::Serialize;
use std::sync::Arc;

#[cfg(test)]
#[path = "unit_tests/round_sequence_tests.rs"]
mod round_sequence_tests;

/// A step taken by a round sequence.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub from: RoundId,
    pub event: Event,
    pub to: RoundId,
    /// Round count of the round entered.
    pub round_count: RoundCount,
    /// Period of the synchronized data passed to the round entered.
    pub period_count: u64,
    pub time: NodeTime,
}

/// Actions required by `RoundSequence::update`.
#[derive(Debug, Default)]
pub struct SequenceUpdateActions {
    /// Time at which to call `update` again, at the latest.
    pub next_scheduled_update: NodeTime,
    /// The transition taken during this update, if any.
    pub transition: Option<Transition>,
}

/// Drives an app: tracks the current round, feeds it payloads, and moves to the next
/// round when the current one resolves or one of its timeouts expires.
#[derive(Debug)]
pub struct RoundSequence {
    app: Arc<AbciApp>,
    participants: ParticipantSet,
    current_round: Round,
    round_count: RoundCount,
    round_start_time: NodeTime,
    history: Vec<Transition>,
}

/// Seed of the keeper selection, identical on all agents for a given round instance.
fn keeper_seed(period_count: u64, round_count: RoundCount) -> u64 {
    period_count.rotate_left(32) ^ round_count.0
}

impl RoundSequence {
    /// Enter the initial round of `app` at time `clock`.
    pub fn new(
        app: Arc<AbciApp>,
        participants: ParticipantSet,
        synchronized_data: SynchronizedData,
        clock: NodeTime,
    ) -> AbciResult<Self> {
        let round_count = RoundCount::default();
        let current_round = Self::make_round(
            &app,
            app.initial_round(),
            synchronized_data,
            &participants,
            round_count,
        )?;
        Ok(RoundSequence {
            app,
            participants,
            current_round,
            round_count,
            round_start_time: clock,
            history: Vec::new(),
        })
    }

    fn make_round(
        app: &AbciApp,
        round: RoundId,
        synchronized_data: SynchronizedData,
        participants: &ParticipantSet,
        round_count: RoundCount,
    ) -> AbciResult<Round> {
        let spec = app
            .round_spec(round)
            .ok_or_else(|| AbciError::InvalidApp {
                app: app.name().to_string(),
                reason: format!("unknown round {}", round),
            })?
            .clone();
        let seed = keeper_seed(synchronized_data.period_count(), round_count);
        Ok(Round::new(
            spec,
            synchronized_data,
            participants.clone(),
            seed,
        ))
    }

    pub fn app(&self) -> &Arc<AbciApp> {
        &self.app
    }

    pub fn participants(&self) -> &ParticipantSet {
        &self.participants
    }

    pub fn current_round(&self) -> &Round {
        &self.current_round
    }

    pub fn current_round_id(&self) -> RoundId {
        self.current_round.id()
    }

    pub fn round_count(&self) -> RoundCount {
        self.round_count
    }

    pub fn round_start_time(&self) -> NodeTime {
        self.round_start_time
    }

    /// Data as of the start of the current round.
    pub fn synchronized_data(&self) -> &SynchronizedData {
        self.current_round.synchronized_data()
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    /// Whether the sequence reached a final state, where it halts.
    pub fn is_finished(&self) -> bool {
        self.app.is_final(self.current_round.id())
    }

    pub fn check_payload(&self, payload: &Payload) -> AbciResult<()> {
        ensure!(
            payload.round_count == self.round_count,
            AbciError::StaleRound {
                sender: payload.sender.clone(),
                expected: self.round_count,
                found: payload.round_count,
            }
        );
        self.current_round.check_payload(payload)
    }

    pub fn process_payload(&mut self, payload: Payload) -> AbciResult<()> {
        self.check_payload(&payload)?;
        self.current_round.process_payload(payload);
        Ok(())
    }

    /// Deadlines of the timeouts of the current round, in the order of their events.
    fn deadlines(&self) -> Vec<(Event, NodeTime)> {
        self.app
            .timeouts(self.current_round.id())
            .into_iter()
            .map(|(event, duration)| (event, self.round_start_time + duration))
            .collect()
    }

    /// Move to the next round if the current one is resolved or timed out.
    pub fn update(&mut self, clock: NodeTime) -> AbciResult<SequenceUpdateActions> {
        let mut actions = SequenceUpdateActions::default();
        if self.is_finished() {
            return Ok(actions);
        }
        let resolution = match self.current_round.end_block() {
            Some(resolution) => Some(resolution),
            None => self
                .deadlines()
                .into_iter()
                .filter(|(_, deadline)| *deadline <= clock)
                .min_by_key(|(_, deadline)| *deadline)
                .map(|(event, _)| (self.synchronized_data().clone(), event)),
        };
        if let Some((synchronized_data, event)) = resolution {
            let from = self.current_round.id();
            let to = self.app.next_round(from, event)?;
            let round_count = self.round_count + 1;
            let period_count = synchronized_data.period_count();
            self.current_round = Self::make_round(
                &self.app,
                to,
                synchronized_data,
                &self.participants,
                round_count,
            )?;
            self.round_count = round_count;
            self.round_start_time = clock;
            let transition = Transition {
                from,
                event,
                to,
                round_count,
                period_count,
                time: clock,
            };
            debug!("{:?} Transition {:?}", clock, transition);
            self.history.push(transition.clone());
            actions.transition = Some(transition);
        }
        actions.next_scheduled_update = self.next_deadline();
        Ok(actions)
    }

    /// Earliest timeout of the current round, or never if it has none.
    pub fn next_deadline(&self) -> NodeTime {
        if self.is_finished() {
            return NodeTime::never();
        }
        self.deadlines()
            .into_iter()
            .map(|(_, deadline)| deadline)
            .min()
            .unwrap_or_else(NodeTime::never)
    }
}
