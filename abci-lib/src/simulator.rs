// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::{
    agent::Agent,
    base_types::{Duration, NodeTime, RoundCount},
    data_writer::DataWriter,
    payload::Payload,
    round_sequence::SequenceUpdateActions,
};
use futures::executor::block_on;
use log::{debug, trace, warn};
use rand::SeedableRng;
use rand_distr::{Distribution, LogNormal};
use rand_xoshiro::Xoshiro256StarStar;
use std::{cmp::Reverse, collections::BinaryHeap};

#[cfg(test)]
#[path = "unit_tests/simulator_tests.rs"]
mod simulator_tests;

/// Simulate the execution of a replicated service over a randomized network.
///
/// Payloads travel to the ordering layer with a random delay, then are delivered to all
/// agents at the same instant, as the consensus engine would do with a block. The clock
/// of the ordering layer is the clock of every agent, so that all agents observe the same
/// round timeouts.
pub struct Simulator<Context: Send> {
    clock: GlobalTime,
    network_delay: RandomDelay,
    retry_delay: Duration,
    rng: Xoshiro256StarStar,
    pending_events: PendingEvents,
    next_event_index: u64,
    /// Scheduled timer updates up to this time are obsolete.
    ignore_scheduled_updates_until: GlobalTime,
    agents: Vec<SimulatedAgent<Context>>,
}

/// Simulated global clock
#[derive(Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Debug)]
pub struct GlobalTime(pub i64);

#[derive(Copy, Clone, Debug)]
pub struct RandomDelay {
    distribution: LogNormal<f64>,
}

/// Events are popped by increasing time, then in scheduling order.
struct ScheduledEvent(Reverse<GlobalTime>, Reverse<u64>, Event);

pub struct SimulatedAgent<Context: Send> {
    /// Crashed agents receive payloads but never send any.
    silent: bool,
    agent: Agent<Context>,
}

#[derive(Debug)]
pub enum Event {
    /// Run the local phase of an agent for the given round instance.
    ActEvent {
        agent: usize,
        round_count: RoundCount,
    },
    /// A payload reaches the ordering layer and is delivered to every agent.
    SubmitEvent { payload: Payload },
    /// Let every agent check the timeouts of its current round.
    UpdateTimerEvent,
}

impl PartialEq for ScheduledEvent {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0 && self.1 == other.1
    }
}

impl Eq for ScheduledEvent {}

impl PartialOrd for ScheduledEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledEvent {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.0, self.1).cmp(&(other.0, other.1))
    }
}

impl std::ops::Add<Duration> for GlobalTime {
    type Output = GlobalTime;

    fn add(self, rhs: Duration) -> Self::Output {
        GlobalTime(self.0.saturating_add(rhs.0))
    }
}

impl RandomDelay {
    /// Log-normal delays with the given mean and variance (in milliseconds).
    pub fn new(mean: f64, variance: f64) -> Option<RandomDelay> {
        // https://en.wikipedia.org/wiki/Log-normal_distribution
        let mu = f64::ln(mean / f64::sqrt(1.0 + variance / (mean * mean)));
        let sigma = f64::sqrt(f64::ln(1.0 + variance / (mean * mean)));
        let distribution = LogNormal::new(mu, sigma).ok()?;
        Some(RandomDelay { distribution })
    }
}

impl GlobalTime {
    fn add_delay(self, delay: RandomDelay, rng: &mut Xoshiro256StarStar) -> GlobalTime {
        let v = delay.distribution.sample(rng);
        GlobalTime(self.0 + (v as i64))
    }

    pub fn to_node_time(self) -> NodeTime {
        NodeTime(self.0)
    }

    pub fn from_node_time(node_time: NodeTime) -> GlobalTime {
        GlobalTime(node_time.0)
    }
}

type PendingEvents = BinaryHeap<ScheduledEvent>;

impl<Context: Send> SimulatedAgent<Context> {
    pub fn agent(&self) -> &Agent<Context> {
        &self.agent
    }

    pub fn is_silent(&self) -> bool {
        self.silent
    }
}

impl<Context: Send> Simulator<Context> {
    /// Start the given agents at time 0. Each agent runs its first local phase after a
    /// random startup delay.
    pub fn new(
        agents: Vec<Agent<Context>>,
        network_delay: RandomDelay,
        retry_delay: Duration,
        seed: u64,
    ) -> Simulator<Context> {
        let mut simulator = Simulator {
            clock: GlobalTime(0),
            network_delay,
            retry_delay,
            rng: Xoshiro256StarStar::seed_from_u64(seed),
            pending_events: BinaryHeap::new(),
            next_event_index: 0,
            ignore_scheduled_updates_until: GlobalTime(-1),
            agents: agents
                .into_iter()
                .map(|agent| SimulatedAgent {
                    silent: false,
                    agent,
                })
                .collect(),
        };
        for index in 0..simulator.agents.len() {
            let deadline =
                simulator.clock.add_delay(network_delay, &mut simulator.rng) + Duration(1);
            let round_count = simulator.agents[index].agent.sequence().round_count();
            simulator.schedule_event(
                deadline,
                Event::ActEvent {
                    agent: index,
                    round_count,
                },
            );
        }
        simulator.reschedule_timer(GlobalTime(0));
        simulator
    }

    /// Make the agent at `index` crash: it keeps following the ordered payloads but never
    /// sends anything.
    pub fn silence(&mut self, index: usize) {
        if let Some(agent) = self.agents.get_mut(index) {
            agent.silent = true;
        }
    }

    pub fn clock(&self) -> GlobalTime {
        self.clock
    }

    pub fn num_agents(&self) -> usize {
        self.agents.len()
    }

    pub fn simulated_agent(&self, index: usize) -> Option<&SimulatedAgent<Context>> {
        self.agents.get(index)
    }

    fn schedule_event(&mut self, deadline: GlobalTime, event: Event) {
        trace!("Scheduling event {:?} for {:?}", event, deadline);
        let index = self.next_event_index;
        self.next_event_index += 1;
        self.pending_events
            .push(ScheduledEvent(Reverse(deadline), Reverse(index), event));
    }

    fn schedule_network_event(&mut self, event: Event) {
        let deadline = self.clock.add_delay(self.network_delay, &mut self.rng);
        self.schedule_event(deadline, event);
    }

    /// Schedule the next timer update at the earliest deadline of all agents.
    fn reschedule_timer(&mut self, clock: GlobalTime) {
        let deadline = self
            .agents
            .iter()
            .map(|agent| agent.agent.sequence().next_deadline())
            .min()
            .filter(|deadline| *deadline != NodeTime::never());
        if let Some(deadline) = deadline {
            let new_deadline = std::cmp::max(
                GlobalTime::from_node_time(deadline),
                // Make sure we schedule the update strictly in the future so it does not get
                // ignored by `ignore_scheduled_updates_until` below.
                clock + Duration(1),
            );
            // We don't remove the previously scheduled updates but this will cancel them.
            self.ignore_scheduled_updates_until = new_deadline + Duration(-1);
            self.schedule_event(new_deadline, Event::UpdateTimerEvent);
        }
    }

    fn process_agent_actions(
        &mut self,
        clock: GlobalTime,
        index: usize,
        actions: SequenceUpdateActions,
    ) {
        if let Some(transition) = actions.transition {
            // The local phase of the new round starts right away.
            self.schedule_event(
                clock,
                Event::ActEvent {
                    agent: index,
                    round_count: transition.round_count,
                },
            );
        }
    }

    /// Update every agent, as the ordering layer does at the end of a block.
    fn update_all(&mut self, clock: GlobalTime) {
        for index in 0..self.agents.len() {
            let result = self.agents[index].agent.update(clock.to_node_time());
            match result {
                Ok(actions) => self.process_agent_actions(clock, index, actions),
                Err(e) => warn!("{:?} Agent {} failed to update: {}", clock, index, e),
            }
        }
        self.reschedule_timer(clock);
    }

    fn act(&mut self, clock: GlobalTime, index: usize, round_count: RoundCount) {
        let retry_delay = self.retry_delay;
        let simulated = &mut self.agents[index];
        if simulated.silent || simulated.agent.sequence().round_count() != round_count {
            debug!("{:?} Dropping local phase of agent {}", clock, index);
            return;
        }
        match block_on(simulated.agent.act(clock.to_node_time())) {
            Ok(Some(payload)) => self.schedule_network_event(Event::SubmitEvent { payload }),
            Ok(None) => {
                if simulated.agent.pending_act() {
                    self.schedule_event(
                        clock + retry_delay,
                        Event::ActEvent {
                            agent: index,
                            round_count,
                        },
                    );
                }
            }
            Err(e) => warn!("{:?} Agent {} failed to act: {}", clock, index, e),
        }
    }

    /// Run the simulation until `max_clock` or until no more events are pending.
    /// Round switches and payload counts are written to `csv_path` when given.
    pub fn loop_until(
        &mut self,
        max_clock: GlobalTime,
        csv_path: Option<String>,
    ) -> anyhow::Result<Vec<&Agent<Context>>> {
        let mut data_writer = match csv_path {
            Some(path) => Some(DataWriter::new(self.agents.len(), path)?),
            None => None,
        };

        while let Some(ScheduledEvent(Reverse(clock), _, event)) = self.pending_events.pop() {
            if clock > max_clock {
                break;
            }

            if let Some(data_writer_val) = data_writer.as_mut() {
                data_writer_val.update_round_number(&self, clock);
                data_writer_val.add_payload_counter(&event);
            }

            // Events scheduled in the past are fine but they do not move the clock.
            let clock = std::cmp::max(clock, self.clock);
            self.clock = clock;
            debug!("{:?} Processing event {:?}", clock, event);
            match event {
                Event::ActEvent { agent, round_count } => self.act(clock, agent, round_count),
                Event::SubmitEvent { payload } => {
                    for simulated in self.agents.iter_mut() {
                        // Rejections are logged by the agent.
                        let _ = simulated.agent.deliver(payload.clone());
                    }
                    self.update_all(clock);
                }
                Event::UpdateTimerEvent => {
                    if clock <= self.ignore_scheduled_updates_until {
                        // This scheduled update was invalidated in the meantime.
                        debug!("{:?} Timer was cancelled", clock);
                        continue;
                    }
                    self.update_all(clock);
                }
            }
        }

        if let Some(data_writer_val) = data_writer {
            data_writer_val.write_to_file()?;
        }

        Ok(self.agents.iter().map(|simulated| &simulated.agent).collect())
    }
}
