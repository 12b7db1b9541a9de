// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

//! Agents pause, then open a new period together.

use crate::{context::TraderContext, synchronized_data::RESET_PERIOD};
use abci_lib::{
    abci_app::AbciApp,
    base_types::{Duration, Event, RoundId},
    error::AbciResult,
    interfaces::{Behaviour, RoundView},
    payload::{Attribute, AttributeKind, PayloadSchema},
    round::RoundSpec,
};
use async_trait::async_trait;
use log::info;
use serde_json::Value;

pub const RESET_AND_PAUSE_ROUND: RoundId = RoundId("ResetAndPauseRound");
pub const FINISHED_RESET_AND_PAUSE_ROUND: RoundId = RoundId("FinishedResetAndPauseRound");
pub const FINISHED_RESET_AND_PAUSE_ERROR_ROUND: RoundId =
    RoundId("FinishedResetAndPauseErrorRound");

pub const RESET_AND_PAUSE_TIMEOUT: Event = Event("reset_and_pause_timeout");

pub fn reset_pause_app(reset_pause_timeout: Duration) -> AbciResult<AbciApp> {
    AbciApp::builder("ResetPauseAbciApp", RESET_AND_PAUSE_ROUND)
        .round(
            RoundSpec::same_until_threshold(RESET_AND_PAUSE_ROUND)
                .with_schema(PayloadSchema::new(vec![Attribute::required(
                    RESET_PERIOD,
                    AttributeKind::Integer,
                )]))
                .with_selection_keys(&[RESET_PERIOD])
                .starting_new_period(),
        )
        .final_round(FINISHED_RESET_AND_PAUSE_ROUND, &[])
        .final_round(FINISHED_RESET_AND_PAUSE_ERROR_ROUND, &[])
        .transition(
            RESET_AND_PAUSE_ROUND,
            Event::DONE,
            FINISHED_RESET_AND_PAUSE_ROUND,
        )
        .transition(
            RESET_AND_PAUSE_ROUND,
            Event::NONE,
            FINISHED_RESET_AND_PAUSE_ERROR_ROUND,
        )
        .transition(
            RESET_AND_PAUSE_ROUND,
            Event::NO_MAJORITY,
            FINISHED_RESET_AND_PAUSE_ERROR_ROUND,
        )
        .transition(
            RESET_AND_PAUSE_ROUND,
            RESET_AND_PAUSE_TIMEOUT,
            FINISHED_RESET_AND_PAUSE_ERROR_ROUND,
        )
        .timeout(RESET_AND_PAUSE_TIMEOUT, reset_pause_timeout)
        .build()
}

/// Waits for the observation interval, then proposes to close the current period.
pub struct ResetAndPauseBehaviour;

#[async_trait]
impl Behaviour<TraderContext> for ResetAndPauseBehaviour {
    fn matching_round(&self) -> RoundId {
        RESET_AND_PAUSE_ROUND
    }

    async fn local_act(
        &mut self,
        context: &mut TraderContext,
        view: RoundView<'_>,
    ) -> Option<Vec<Value>> {
        let period = view.synchronized_data.period_count();
        info!(
            "Period {} ended, pausing for {:?}",
            period,
            context.params.observation_interval()
        );
        context
            .http
            .sleep(context.params.observation_interval())
            .await;
        Some(vec![Value::from(period)])
    }
}
