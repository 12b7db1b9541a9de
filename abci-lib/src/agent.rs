// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::{
    abci_app::AbciApp,
    base_types::{NodeTime, Participant, RoundCount},
    behaviour::RoundBehaviour,
    benchmark::BenchmarkTool,
    configuration::ParticipantSet,
    error::{AbciError, AbciResult},
    interfaces::{Behaviour, RoundView},
    payload::Payload,
    round_sequence::{RoundSequence, SequenceUpdateActions, Transition},
    synchronized_data::SynchronizedData,
};
use log::{debug, info, warn};
use std::{sync::Arc, time::Instant};

#[cfg(test)]
#[path = "unit_tests/agent_tests.rs"]
mod agent_tests;

/// One agent of the service: its copy of the round sequence, the behaviours producing its
/// payloads, and the context those behaviours run in.
pub struct Agent<Context: Send> {
    address: Participant,
    sequence: RoundSequence,
    behaviours: RoundBehaviour<Context>,
    context: Context,
    benchmark: BenchmarkTool,
    /// Last round instance this agent submitted a payload for.
    sent_round: Option<RoundCount>,
}

impl<Context: Send> Agent<Context> {
    pub fn new(
        address: Participant,
        app: Arc<AbciApp>,
        participants: ParticipantSet,
        synchronized_data: SynchronizedData,
        behaviours: Vec<Box<dyn Behaviour<Context>>>,
        context: Context,
        clock: NodeTime,
    ) -> AbciResult<Self> {
        let behaviours = RoundBehaviour::new(&app, behaviours)?;
        let sequence = RoundSequence::new(app, participants, synchronized_data, clock)?;
        Ok(Agent {
            address,
            sequence,
            behaviours,
            context,
            benchmark: BenchmarkTool::new(),
            sent_round: None,
        })
    }

    pub fn address(&self) -> &Participant {
        &self.address
    }

    pub fn sequence(&self) -> &RoundSequence {
        &self.sequence
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut Context {
        &mut self.context
    }

    pub fn benchmark(&self) -> &BenchmarkTool {
        &self.benchmark
    }

    pub fn synchronized_data(&self) -> &SynchronizedData {
        self.sequence.synchronized_data()
    }

    pub fn history(&self) -> &[Transition] {
        self.sequence.history()
    }

    pub fn is_finished(&self) -> bool {
        self.sequence.is_finished()
    }

    /// Whether the behaviour of the current round still has to produce a payload.
    pub fn pending_act(&self) -> bool {
        !self.sequence.is_finished() && self.sent_round != Some(self.sequence.round_count())
    }

    /// Local phase of the current round. Returns the payload to submit for consensus, or
    /// `None` if there is nothing to submit (yet).
    pub async fn act(&mut self, clock: NodeTime) -> AbciResult<Option<Payload>> {
        if !self.pending_act() {
            return Ok(None);
        }
        let round = self.sequence.current_round_id();
        let round_count = self.sequence.round_count();
        let behaviour = self
            .behaviours
            .get_mut(round)
            .ok_or_else(|| AbciError::InvalidBehaviours(format!("no behaviour for {}", round)))?;
        let view = RoundView {
            address: &self.address,
            round,
            round_count,
            participants: self.sequence.participants(),
            synchronized_data: self.sequence.synchronized_data(),
        };
        let start = Instant::now();
        let values = match behaviour.local_act(&mut self.context, view).await {
            Some(values) => values,
            None => {
                debug!("{:?} {} Nothing to send yet for {}", clock, self.address, round);
                return Ok(None);
            }
        };
        self.benchmark
            .record_local(round, round_count, start.elapsed(), clock);
        self.sent_round = Some(round_count);
        debug!(
            "{:?} {} Submitting {:?} for {} ({:?})",
            clock, self.address, values, round, round_count
        );
        Ok(Some(Payload::new(self.address.clone(), round_count, values)))
    }

    /// Hand a payload ordered by consensus to the current round.
    pub fn deliver(&mut self, payload: Payload) -> AbciResult<()> {
        let result = self.sequence.process_payload(payload);
        if let Err(e) = &result {
            warn!("{} Rejected payload: {}", self.address, e);
        }
        result
    }

    /// Resolve the current round if possible. See `RoundSequence::update`.
    pub fn update(&mut self, clock: NodeTime) -> AbciResult<SequenceUpdateActions> {
        let actions = self.sequence.update(clock)?;
        if let Some(transition) = &actions.transition {
            info!(
                "{:?} {} {} -[{}]-> {} (round count {}, period {})",
                clock,
                self.address,
                transition.from,
                transition.event,
                transition.to,
                transition.round_count.0,
                transition.period_count
            );
            let resolved = RoundCount(transition.round_count.0.saturating_sub(1));
            self.benchmark.record_consensus(resolved, clock);
        }
        Ok(actions)
    }
}
