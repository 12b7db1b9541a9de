// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::{
    context::TraderContext,
    decision_maker::{self, DecisionMakerBehaviour},
    market_data_fetcher::{self, FetchMarketDataBehaviour, VerifyMarketDataBehaviour},
    params::TraderParams,
    portfolio_tracker::{self, PortfolioTrackerBehaviour},
    registration::{self, RegistrationBehaviour, RegistrationStartupBehaviour},
    reset_pause::{self, ResetAndPauseBehaviour},
    strategy_evaluator::{
        self, BacktestBehaviour, PrepareSwapBehaviour, StrategyExecBehaviour,
        SwapQueueBehaviour,
    },
};
use abci_lib::{
    abci_app::AbciApp,
    chain::{chain, AbciAppTransitionMapping},
    error::AbciResult,
    interfaces::Behaviour,
};

#[cfg(test)]
#[path = "unit_tests/composition_tests.rs"]
mod composition_tests;

/// How the final states of the trader apps lead into each other. Transaction settlement
/// happens outside of the service, so a prepared swap goes straight back to the queue.
/// Every outcome of the strategy evaluation other than a prepared swap ends the period.
/// A failed reset goes through registration again.
pub fn transition_mapping() -> AbciAppTransitionMapping {
    use decision_maker::*;
    use market_data_fetcher::*;
    use portfolio_tracker::*;
    use registration::*;
    use reset_pause::*;
    use strategy_evaluator::*;

    let mut mapping = AbciAppTransitionMapping::new();
    mapping.insert(FINISHED_REGISTRATION_ROUND, DECISION_MAKER_ROUND);
    mapping.insert(FINISHED_DECISION_MAKER_ROUND, FETCH_MARKET_DATA_ROUND);
    mapping.insert(FAILED_DECISION_MAKER_ROUND, DECISION_MAKER_ROUND);
    mapping.insert(FINISHED_MARKET_FETCH_ROUND, PORTFOLIO_TRACKER_ROUND);
    mapping.insert(FAILED_MARKET_FETCH_ROUND, DECISION_MAKER_ROUND);
    mapping.insert(FINISHED_PORTFOLIO_TRACKER_ROUND, STRATEGY_EXEC_ROUND);
    mapping.insert(FAILED_PORTFOLIO_TRACKER_ROUND, DECISION_MAKER_ROUND);
    mapping.insert(SWAP_TX_PREPARED_ROUND, SWAP_QUEUE_ROUND);
    for last in &[
        NO_MORE_SWAPS_ROUND,
        HODL_ROUND,
        BACKTESTING_NEGATIVE_ROUND,
        BACKTESTING_FAILED_ROUND,
        STRATEGY_EXECUTION_FAILED_ROUND,
        INSTRUCTION_PREPARATION_FAILED_ROUND,
    ] {
        mapping.insert(*last, RESET_AND_PAUSE_ROUND);
    }
    mapping.insert(FINISHED_RESET_AND_PAUSE_ROUND, DECISION_MAKER_ROUND);
    mapping.insert(FINISHED_RESET_AND_PAUSE_ERROR_ROUND, REGISTRATION_ROUND);
    mapping
}

/// The whole trader service, built once from the parameters.
pub fn trader_app(params: &TraderParams) -> AbciResult<AbciApp> {
    let round_timeout = params.round_timeout();
    chain(
        "TraderAbciApp",
        vec![
            registration::registration_app(round_timeout)?,
            decision_maker::decision_maker_app(round_timeout)?,
            market_data_fetcher::market_data_fetcher_app(round_timeout)?,
            portfolio_tracker::portfolio_tracker_app(round_timeout)?,
            strategy_evaluator::strategy_evaluator_app(round_timeout)?,
            reset_pause::reset_pause_app(params.reset_pause_timeout())?,
        ],
        &transition_mapping(),
    )
}

/// One behaviour per non-final round of `trader_app`.
pub fn trader_behaviours() -> Vec<Box<dyn Behaviour<TraderContext>>> {
    vec![
        Box::new(RegistrationStartupBehaviour),
        Box::new(RegistrationBehaviour),
        Box::new(DecisionMakerBehaviour),
        Box::new(FetchMarketDataBehaviour),
        Box::new(VerifyMarketDataBehaviour),
        Box::new(PortfolioTrackerBehaviour),
        Box::new(StrategyExecBehaviour),
        Box::new(BacktestBehaviour),
        Box::new(PrepareSwapBehaviour),
        Box::new(SwapQueueBehaviour),
        Box::new(ResetAndPauseBehaviour),
    ]
}
