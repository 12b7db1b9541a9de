// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::{
    context::TraderContext, params::TraderParams, simulated_context::SimulatedMarket,
    strategy::StrategyRegistry,
};
use abci_lib::{
    base_types::{Duration, Participant, RoundCount, RoundId},
    content_store::MemoryContentStore,
    interfaces::RoundView,
    io::RetryPolicy,
    synchronized_data::SynchronizedData,
    ParticipantSet,
};
use serde_json::Value;
use std::{collections::BTreeSet, sync::Arc};

/// Default parameters with fast retries.
pub fn test_params() -> TraderParams {
    let mut params = TraderParams::default();
    let fast = RetryPolicy {
        max_retries: 1,
        retry_delay: Duration(1),
    };
    params.market_data.retry_policy = fast;
    params.store.retry_policy = fast;
    params
}

pub fn context_with(params: TraderParams, market: SimulatedMarket) -> TraderContext {
    TraderContext::new(
        Arc::new(params),
        Arc::new(market),
        Arc::new(MemoryContentStore::new()),
        Arc::new(StrategyRegistry::with_builtins()),
    )
}

pub fn context(market: SimulatedMarket) -> TraderContext {
    context_with(test_params(), market)
}

/// Synchronized data holding the given keys.
pub fn data(values: Vec<(&str, Value)>) -> SynchronizedData {
    SynchronizedData::new(BTreeSet::new()).update(values)
}

/// Owns what a `RoundView` borrows.
pub struct Fixture {
    pub address: Participant,
    pub participants: ParticipantSet,
}

impl Fixture {
    pub fn new() -> Self {
        let address = Participant::new("agent_0");
        let participants = ParticipantSet::new(vec![
            address.clone(),
            Participant::new("agent_1"),
            Participant::new("agent_2"),
            Participant::new("agent_3"),
        ]);
        Fixture {
            address,
            participants,
        }
    }

    pub fn view<'a>(&'a self, round: RoundId, data: &'a SynchronizedData) -> RoundView<'a> {
        RoundView {
            address: &self.address,
            round,
            round_count: RoundCount(0),
            participants: &self.participants,
            synchronized_data: data,
        }
    }
}
