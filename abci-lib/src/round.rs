// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::{
    base_types::{Event, Participant, RoundId},
    collection::Collection,
    configuration::ParticipantSet,
    error::{AbciError, AbciResult},
    payload::{Payload, PayloadSchema},
    synchronized_data::SynchronizedData,
};
use log::debug;
use serde_json::Value;
use std::{collections::BTreeSet, fmt, sync::Arc};

#[cfg(test)]
#[path = "unit_tests/round_tests.rs"]
mod round_tests;

/// Maps the done event of a resolved round to a more specific event, based on the
/// data the round just wrote.
pub type EventRefinement = fn(&SynchronizedData, Event) -> Event;

/// How a round turns its collection into a decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionPolicy {
    /// Identical values from a quorum of participants.
    SameUntilThreshold,
    /// Pairwise distinct values from every participant.
    DifferentUntilAll,
    /// Pairwise distinct values from a quorum of participants.
    DifferentUntilThreshold,
    /// Tri-state votes (true, false, null) from a quorum of participants.
    Voting,
    /// The payload of a single participant picked from a shared seed.
    OnlyKeeperSends,
    /// Final state: accepts nothing and never resolves.
    Degenerate,
}

/// Static description of a round.
#[derive(Clone, Debug)]
pub struct RoundSpec {
    pub id: RoundId,
    pub policy: ResolutionPolicy,
    pub schema: PayloadSchema,
    /// Keys receiving the resolved values, in the order of the payload attributes.
    pub selection_keys: Vec<&'static str>,
    /// Key receiving the serialized collection once the round resolves.
    pub collection_key: Option<&'static str>,
    pub done_event: Event,
    pub none_event: Event,
    pub negative_event: Event,
    pub no_majority_event: Option<Event>,
    /// Whether resolving with the done event opens a new period.
    pub starts_new_period: bool,
    refinement: Option<Refinement>,
}

#[derive(Clone)]
struct Refinement {
    events: Vec<Event>,
    refine: EventRefinement,
}

impl fmt::Debug for Refinement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Refinement")
            .field("events", &self.events)
            .finish()
    }
}

impl RoundSpec {
    pub fn new(id: RoundId, policy: ResolutionPolicy) -> Self {
        let no_majority_event = match policy {
            ResolutionPolicy::SameUntilThreshold => Some(Event::NO_MAJORITY),
            _ => None,
        };
        let schema = match policy {
            ResolutionPolicy::Voting => PayloadSchema::vote(),
            _ => PayloadSchema::default(),
        };
        RoundSpec {
            id,
            policy,
            schema,
            selection_keys: Vec::new(),
            collection_key: None,
            done_event: Event::DONE,
            none_event: Event::NONE,
            negative_event: Event::NONE,
            no_majority_event,
            starts_new_period: false,
            refinement: None,
        }
    }

    pub fn same_until_threshold(id: RoundId) -> Self {
        Self::new(id, ResolutionPolicy::SameUntilThreshold)
    }

    pub fn different_until_all(id: RoundId) -> Self {
        Self::new(id, ResolutionPolicy::DifferentUntilAll)
    }

    pub fn different_until_threshold(id: RoundId) -> Self {
        Self::new(id, ResolutionPolicy::DifferentUntilThreshold)
    }

    pub fn voting(id: RoundId) -> Self {
        Self::new(id, ResolutionPolicy::Voting)
    }

    pub fn only_keeper_sends(id: RoundId) -> Self {
        Self::new(id, ResolutionPolicy::OnlyKeeperSends)
    }

    pub fn degenerate(id: RoundId) -> Self {
        Self::new(id, ResolutionPolicy::Degenerate)
    }

    pub fn with_schema(mut self, schema: PayloadSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_selection_keys(mut self, keys: &[&'static str]) -> Self {
        self.selection_keys = keys.to_vec();
        self
    }

    pub fn with_collection_key(mut self, key: &'static str) -> Self {
        self.collection_key = Some(key);
        self
    }

    pub fn with_done_event(mut self, event: Event) -> Self {
        self.done_event = event;
        self
    }

    pub fn with_none_event(mut self, event: Event) -> Self {
        self.none_event = event;
        self
    }

    pub fn with_negative_event(mut self, event: Event) -> Self {
        self.negative_event = event;
        self
    }

    pub fn with_no_majority_event(mut self, event: Event) -> Self {
        self.no_majority_event = Some(event);
        self
    }

    /// `refine` may only return events listed in `events`.
    pub fn with_refinement(mut self, events: &[Event], refine: EventRefinement) -> Self {
        self.refinement = Some(Refinement {
            events: events.to_vec(),
            refine,
        });
        self
    }

    pub fn starting_new_period(mut self) -> Self {
        self.starts_new_period = true;
        self
    }

    pub fn is_final(&self) -> bool {
        self.policy == ResolutionPolicy::Degenerate
    }

    /// Every event `end_block` may return.
    pub fn emitted_events(&self) -> BTreeSet<Event> {
        let mut events = BTreeSet::new();
        if self.is_final() {
            return events;
        }
        match &self.refinement {
            Some(refinement) => events.extend(refinement.events.iter().copied()),
            None => {
                events.insert(self.done_event);
            }
        }
        match self.policy {
            ResolutionPolicy::SameUntilThreshold | ResolutionPolicy::OnlyKeeperSends => {
                events.insert(self.none_event);
            }
            ResolutionPolicy::Voting => {
                events.insert(self.negative_event);
                events.insert(self.none_event);
            }
            _ => (),
        }
        if let Some(event) = self.no_majority_event {
            events.insert(event);
        }
        events
    }

    fn no_majority(&self) -> Event {
        self.no_majority_event.unwrap_or(self.none_event)
    }
}

/// A state of the FSM, instantiated when an agent enters it and dropped once its
/// decision has been consumed.
#[derive(Clone, Debug)]
pub struct Round {
    spec: Arc<RoundSpec>,
    synchronized_data: SynchronizedData,
    participants: ParticipantSet,
    collection: Collection,
    keeper: Option<Participant>,
}

impl Round {
    /// `keeper_seed` must be identical on all agents for keeper rounds.
    pub fn new(
        spec: Arc<RoundSpec>,
        synchronized_data: SynchronizedData,
        participants: ParticipantSet,
        keeper_seed: u64,
    ) -> Self {
        let keeper = match spec.policy {
            ResolutionPolicy::OnlyKeeperSends => participants.pick_keeper(keeper_seed),
            _ => None,
        };
        Round {
            spec,
            synchronized_data,
            participants,
            collection: Collection::new(),
            keeper,
        }
    }

    pub fn id(&self) -> RoundId {
        self.spec.id
    }

    pub fn spec(&self) -> &RoundSpec {
        &self.spec
    }

    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    pub fn keeper(&self) -> Option<&Participant> {
        self.keeper.as_ref()
    }

    pub fn synchronized_data(&self) -> &SynchronizedData {
        &self.synchronized_data
    }

    pub fn threshold(&self) -> usize {
        self.participants.quorum_threshold()
    }

    pub fn check_payload(&self, payload: &Payload) -> AbciResult<()> {
        let round = self.spec.id;
        ensure!(!self.spec.is_final(), AbciError::FinalRound(round));
        ensure!(
            self.participants.contains(&payload.sender),
            AbciError::UnknownSender {
                sender: payload.sender.clone(),
                round,
            }
        );
        if let Some(reason) = self.spec.schema.check(&payload.values) {
            bail!(AbciError::MalformedPayload {
                sender: payload.sender.clone(),
                round,
                reason,
            });
        }
        match self.spec.policy {
            ResolutionPolicy::OnlyKeeperSends => ensure!(
                self.keeper.as_ref() == Some(&payload.sender),
                AbciError::NotKeeper {
                    sender: payload.sender.clone(),
                    round,
                }
            ),
            ResolutionPolicy::DifferentUntilAll | ResolutionPolicy::DifferentUntilThreshold => {
                ensure!(
                    !self
                        .collection
                        .contains_value_from_other(&payload.sender, &payload.values),
                    AbciError::DuplicateValue {
                        sender: payload.sender.clone(),
                        round,
                    }
                )
            }
            _ => (),
        }
        Ok(())
    }

    /// Record a payload that passed `check_payload`.
    pub fn process_payload(&mut self, payload: Payload) {
        debug!(
            "{} Accepting payload from {} for round {:?}: {:?}",
            self.spec.id, payload.sender, payload.round_count, payload.values
        );
        if let Some(previous) = self.collection.add(payload) {
            debug!(
                "{} Replaced previous payload of {}",
                self.spec.id, previous.sender
            );
        }
    }

    /// Decide whether the round is over, given the payloads received so far.
    pub fn end_block(&self) -> Option<(SynchronizedData, Event)> {
        let num_participants = self.participants.len();
        let threshold = self.threshold();
        match self.spec.policy {
            ResolutionPolicy::SameUntilThreshold => {
                if let Some(values) = self.collection.majority(threshold) {
                    if values.iter().all(Value::is_null) {
                        return Some((self.synchronized_data.clone(), self.spec.none_event));
                    }
                    return Some(self.resolve(&values));
                }
                if !self
                    .collection
                    .is_majority_possible(num_participants, threshold)
                {
                    return Some((self.synchronized_data.clone(), self.spec.no_majority()));
                }
                None
            }
            ResolutionPolicy::DifferentUntilAll => {
                if num_participants > 0 && self.collection.count() >= num_participants {
                    return Some(self.resolve(&[]));
                }
                None
            }
            ResolutionPolicy::DifferentUntilThreshold => {
                if self.collection.has_threshold(threshold) {
                    return Some(self.resolve(&[]));
                }
                None
            }
            ResolutionPolicy::Voting => {
                let positive = self.collection.count_first_values(|v| v == &Value::Bool(true));
                let negative = self
                    .collection
                    .count_first_values(|v| v == &Value::Bool(false));
                let none = self.collection.count_first_values(Value::is_null);
                if positive >= threshold {
                    return Some(self.resolve(&[]));
                }
                if negative >= threshold {
                    return Some((self.synchronized_data.clone(), self.spec.negative_event));
                }
                if none >= threshold {
                    return Some((self.synchronized_data.clone(), self.spec.none_event));
                }
                if !self
                    .collection
                    .is_majority_possible(num_participants, threshold)
                {
                    return Some((self.synchronized_data.clone(), self.spec.no_majority()));
                }
                None
            }
            ResolutionPolicy::OnlyKeeperSends => {
                let payload = self.collection.get(self.keeper.as_ref()?)?;
                if payload.is_all_null() {
                    return Some((self.synchronized_data.clone(), self.spec.none_event));
                }
                Some(self.resolve(&payload.values))
            }
            ResolutionPolicy::Degenerate => None,
        }
    }

    fn resolve(&self, values: &[Value]) -> (SynchronizedData, Event) {
        let mut updates: Vec<(&str, Value)> = self
            .spec
            .selection_keys
            .iter()
            .copied()
            .zip(values.iter().cloned())
            .collect();
        if let Some(key) = self.spec.collection_key {
            updates.push((key, self.collection.serialize()));
        }
        let mut data = self.synchronized_data.update(updates);
        let event = match &self.spec.refinement {
            Some(refinement) => (refinement.refine)(&data, self.spec.done_event),
            None => self.spec.done_event,
        };
        if self.spec.starts_new_period && event == self.spec.done_event {
            data = data.create_new_period();
        }
        (data, event)
    }
}
