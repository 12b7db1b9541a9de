// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

//! Agents register their address before the service starts, and again after an error.

use crate::{context::TraderContext, synchronized_data::PARTICIPANTS};
use abci_lib::{
    abci_app::AbciApp,
    base_types::{Duration, Event, RoundId},
    error::AbciResult,
    interfaces::{Behaviour, RoundView},
    payload::{Attribute, AttributeKind, PayloadSchema},
    round::RoundSpec,
};
use async_trait::async_trait;
use serde_json::Value;

#[cfg(test)]
#[path = "unit_tests/registration_tests.rs"]
mod registration_tests;

pub const REGISTRATION_STARTUP_ROUND: RoundId = RoundId("RegistrationStartupRound");
pub const REGISTRATION_ROUND: RoundId = RoundId("RegistrationRound");
pub const FINISHED_REGISTRATION_ROUND: RoundId = RoundId("FinishedRegistrationRound");

fn address_schema() -> PayloadSchema {
    PayloadSchema::new(vec![Attribute::required("address", AttributeKind::String)])
}

/// At startup every agent must register. Later registrations, after an error, only need
/// a quorum and are retried when they time out.
pub fn registration_app(round_timeout: Duration) -> AbciResult<AbciApp> {
    AbciApp::builder("AgentRegistrationAbciApp", REGISTRATION_STARTUP_ROUND)
        .round(
            RoundSpec::different_until_all(REGISTRATION_STARTUP_ROUND)
                .with_schema(address_schema())
                .with_collection_key(PARTICIPANTS),
        )
        .round(
            RoundSpec::different_until_threshold(REGISTRATION_ROUND)
                .with_schema(address_schema())
                .with_collection_key(PARTICIPANTS),
        )
        .final_round(FINISHED_REGISTRATION_ROUND, &[PARTICIPANTS])
        .initial_state(REGISTRATION_ROUND)
        .transition(
            REGISTRATION_STARTUP_ROUND,
            Event::DONE,
            FINISHED_REGISTRATION_ROUND,
        )
        .transition(REGISTRATION_ROUND, Event::DONE, FINISHED_REGISTRATION_ROUND)
        .transition(REGISTRATION_ROUND, Event::ROUND_TIMEOUT, REGISTRATION_ROUND)
        .timeout(Event::ROUND_TIMEOUT, round_timeout)
        .persisted_keys(&[PARTICIPANTS])
        .build()
}

fn register(view: &RoundView<'_>) -> Option<Vec<Value>> {
    Some(vec![Value::from(view.address.0.clone())])
}

pub struct RegistrationStartupBehaviour;

#[async_trait]
impl Behaviour<TraderContext> for RegistrationStartupBehaviour {
    fn matching_round(&self) -> RoundId {
        REGISTRATION_STARTUP_ROUND
    }

    async fn local_act(
        &mut self,
        _context: &mut TraderContext,
        view: RoundView<'_>,
    ) -> Option<Vec<Value>> {
        register(&view)
    }
}

pub struct RegistrationBehaviour;

#[async_trait]
impl Behaviour<TraderContext> for RegistrationBehaviour {
    fn matching_round(&self) -> RoundId {
        REGISTRATION_ROUND
    }

    async fn local_act(
        &mut self,
        _context: &mut TraderContext,
        view: RoundView<'_>,
    ) -> Option<Vec<Value>> {
        register(&view)
    }
}
