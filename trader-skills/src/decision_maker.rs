// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

//! Agents agree on the strategy to trade with during the period.

use crate::{context::TraderContext, synchronized_data::SELECTED_STRATEGY};
use abci_lib::{
    abci_app::AbciApp,
    base_types::{Duration, Event, RoundId},
    error::AbciResult,
    interfaces::{Behaviour, RoundView},
    payload::{Attribute, AttributeKind, PayloadSchema},
    round::RoundSpec,
};
use async_trait::async_trait;
use log::{error, info};
use serde_json::Value;

pub const DECISION_MAKER_ROUND: RoundId = RoundId("TraderDecisionMakerRound");
pub const FINISHED_DECISION_MAKER_ROUND: RoundId = RoundId("FinishedTraderDecisionMakerRound");
pub const FAILED_DECISION_MAKER_ROUND: RoundId = RoundId("FailedTraderDecisionMakerRound");

pub fn decision_maker_app(round_timeout: Duration) -> AbciResult<AbciApp> {
    AbciApp::builder("TraderDecisionMakerAbciApp", DECISION_MAKER_ROUND)
        .round(
            RoundSpec::same_until_threshold(DECISION_MAKER_ROUND)
                .with_schema(PayloadSchema::new(vec![Attribute::optional(
                    SELECTED_STRATEGY,
                    AttributeKind::String,
                )]))
                .with_selection_keys(&[SELECTED_STRATEGY]),
        )
        .final_round(FINISHED_DECISION_MAKER_ROUND, &[SELECTED_STRATEGY])
        .final_round(FAILED_DECISION_MAKER_ROUND, &[])
        .transition(
            DECISION_MAKER_ROUND,
            Event::DONE,
            FINISHED_DECISION_MAKER_ROUND,
        )
        .transition(DECISION_MAKER_ROUND, Event::NONE, FAILED_DECISION_MAKER_ROUND)
        .transition(
            DECISION_MAKER_ROUND,
            Event::NO_MAJORITY,
            FAILED_DECISION_MAKER_ROUND,
        )
        .transition(
            DECISION_MAKER_ROUND,
            Event::ROUND_TIMEOUT,
            FAILED_DECISION_MAKER_ROUND,
        )
        .timeout(Event::ROUND_TIMEOUT, round_timeout)
        .build()
}

/// Proposes the configured strategy, or nothing if it cannot be verified.
pub struct DecisionMakerBehaviour;

#[async_trait]
impl Behaviour<TraderContext> for DecisionMakerBehaviour {
    fn matching_round(&self) -> RoundId {
        DECISION_MAKER_ROUND
    }

    async fn local_act(
        &mut self,
        context: &mut TraderContext,
        _view: RoundView<'_>,
    ) -> Option<Vec<Value>> {
        let strategy = &context.params.strategy;
        let name = strategy.trading_strategy.as_str();
        let expected = strategy.strategy_packages.get(name).map(String::as_str);
        match context.strategies.load(name, expected) {
            Ok(_) => {
                info!("Selected strategy {}", name);
                Some(vec![Value::from(name)])
            }
            Err(e) => {
                error!("Cannot select strategy {}: {}", name, e);
                Some(vec![Value::Null])
            }
        }
    }
}
