// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use abci_lib::{agent::Agent, base_types::Duration, simulator};
use std::sync::Arc;
use trader_skills::{
    context::TraderContext,
    decision_maker::DECISION_MAKER_ROUND,
    params::TraderParams,
    registration::REGISTRATION_STARTUP_ROUND,
    reset_pause::RESET_AND_PAUSE_ROUND,
    simulated_context::{make_agents, SimulatedMarket},
    strategy_evaluator::{SWAPS_QUEUE_EMPTY, SWAP_QUEUE_ROUND},
};

fn make_simulator(
    seed: u64,
    nodes: usize,
    failure_every: Option<usize>,
) -> simulator::Simulator<TraderContext> {
    let mut params = TraderParams::default();
    params.market_data.retry_policy.retry_delay = Duration(10);
    let agents = make_agents(Arc::new(params), nodes, |_| {
        let market = SimulatedMarket::new(seed);
        match failure_every {
            Some(n) => market.with_failure_every(n),
            None => market,
        }
    })
    .unwrap();
    let delay_distribution = simulator::RandomDelay::new(10.0, 4.0).unwrap();
    simulator::Simulator::new(agents, delay_distribution, Duration(100), seed)
}

fn assert_agreement(agents: &[&Agent<TraderContext>]) {
    let first = agents[0];
    for agent in &agents[1..] {
        assert_eq!(agent.history(), first.history());
        assert_eq!(
            agent.synchronized_data().digest().unwrap(),
            first.synchronized_data().digest().unwrap()
        );
    }
}

#[test]
fn test_simulated_run_4_agents() {
    let mut sim = make_simulator(/* seed */ 52, /* agents */ 4, None);
    let agents = sim.loop_until(simulator::GlobalTime(60_000), None).unwrap();
    assert_agreement(&agents);

    let history = agents[0].history();
    assert_eq!(history[0].from, REGISTRATION_STARTUP_ROUND);
    assert_eq!(history[0].to, DECISION_MAKER_ROUND);
    assert!(agents[0].synchronized_data().period_count() >= 1);
    // Every period goes through the decision maker again.
    let decisions = history
        .iter()
        .filter(|transition| transition.to == DECISION_MAKER_ROUND)
        .count() as u64;
    assert!(decisions > agents[0].synchronized_data().period_count());
}

#[test]
fn test_simulated_run_with_flaky_apis() {
    let mut sim = make_simulator(/* seed */ 7, /* agents */ 4, Some(3));
    let agents = sim.loop_until(simulator::GlobalTime(60_000), None).unwrap();
    assert_agreement(&agents);
    assert!(agents[0].synchronized_data().period_count() >= 1);
}

#[test]
fn test_drained_queue_ends_the_period() {
    let mut sim = make_simulator(/* seed */ 52, /* agents */ 4, None);
    let agents = sim.loop_until(simulator::GlobalTime(60_000), None).unwrap();
    for transition in agents[0].history() {
        if transition.from == SWAP_QUEUE_ROUND {
            let expected = if transition.event == SWAPS_QUEUE_EMPTY {
                RESET_AND_PAUSE_ROUND
            } else {
                SWAP_QUEUE_ROUND
            };
            assert_eq!(transition.to, expected);
        }
        if transition.to == RESET_AND_PAUSE_ROUND {
            assert_ne!(transition.from, RESET_AND_PAUSE_ROUND);
        }
    }
}

#[test]
fn test_registration_waits_for_every_agent() {
    let mut sim = make_simulator(/* seed */ 52, /* agents */ 4, None);
    sim.silence(3);
    let agents = sim.loop_until(simulator::GlobalTime(10_000), None).unwrap();
    assert_agreement(&agents);
    for agent in agents {
        assert!(agent.history().is_empty());
        assert_eq!(agent.sequence().current_round_id(), REGISTRATION_STARTUP_ROUND);
    }
}
