// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

//! Agents run the selected strategy on the agreed market data and portfolio, backtest the
//! resulting orders, quote them, then go through the queue of swap instructions.

use crate::synchronized_data::{
    TraderData, INCOMPLETE_EXEC, INCOMPLETE_INSTRUCTIONS, INSTRUCTIONS_HASH,
    MOST_VOTED_INSTRUCTION_SET, ORDERS_HASH, PARTICIPANT_TO_BACKTESTING, PORTFOLIO_HASH,
    DATA_HASH, SELECTED_STRATEGY,
};
use abci_lib::{
    abci_app::AbciApp,
    base_types::{Duration, Event, RoundId},
    error::AbciResult,
    payload::{Attribute, AttributeKind, PayloadSchema},
    round::RoundSpec,
    synchronized_data::SynchronizedData,
};
use serde::{Deserialize, Serialize};

#[cfg(test)]
#[path = "../unit_tests/strategy_evaluator_tests.rs"]
mod strategy_evaluator_tests;

mod backtest;
mod prepare_swap;
mod strategy_exec;
mod swap_queue;

pub use backtest::BacktestBehaviour;
pub use prepare_swap::PrepareSwapBehaviour;
pub use strategy_exec::StrategyExecBehaviour;
pub use swap_queue::SwapQueueBehaviour;

pub const STRATEGY_EXEC_ROUND: RoundId = RoundId("StrategyExecRound");
pub const BACKTEST_ROUND: RoundId = RoundId("BacktestRound");
pub const PREPARE_SWAP_ROUND: RoundId = RoundId("PrepareSwapRound");
pub const SWAP_QUEUE_ROUND: RoundId = RoundId("SwapQueueRound");

pub const SWAP_TX_PREPARED_ROUND: RoundId = RoundId("SwapTxPreparedRound");
pub const NO_MORE_SWAPS_ROUND: RoundId = RoundId("NoMoreSwapsRound");
pub const STRATEGY_EXECUTION_FAILED_ROUND: RoundId = RoundId("StrategyExecutionFailedRound");
pub const INSTRUCTION_PREPARATION_FAILED_ROUND: RoundId =
    RoundId("InstructionPreparationFailedRound");
pub const HODL_ROUND: RoundId = RoundId("HodlRound");
pub const BACKTESTING_NEGATIVE_ROUND: RoundId = RoundId("BacktestingNegativeRound");
pub const BACKTESTING_FAILED_ROUND: RoundId = RoundId("BacktestingFailedRound");

pub const PREPARE_SWAP: Event = Event("prepare_swap");
pub const PREPARE_INCOMPLETE_SWAP: Event = Event("prepare_incomplete_swap");
pub const NO_ORDERS: Event = Event("no_orders");
pub const ERROR_PREPARING_SWAPS: Event = Event("error_preparing_swaps");
pub const BACKTEST_POSITIVE: Event = Event("backtest_positive");
pub const BACKTEST_NEGATIVE: Event = Event("backtest_negative");
pub const BACKTEST_FAILED: Event = Event("backtest_failed");
pub const INSTRUCTIONS_PREPARED: Event = Event("instructions_prepared");
pub const INCOMPLETE_INSTRUCTIONS_PREPARED: Event = Event("incomplete_instructions_prepared");
pub const NO_INSTRUCTIONS: Event = Event("no_instructions");
pub const ERROR_PREPARING_INSTRUCTIONS: Event = Event("error_preparing_instructions");
pub const SWAP_TX_PREPARED: Event = Event("swap_tx_prepared");
pub const SWAPS_QUEUE_EMPTY: Event = Event("swaps_queue_empty");
pub const TX_PREPARATION_FAILED: Event = Event("tx_preparation_failed");

/// A swap decided by the strategy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub input_mint: String,
    pub output_mint: String,
    pub amount: u64,
}

/// A quoted order, ready to be turned into a swap transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInstruction {
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: u64,
    pub out_amount: u64,
    pub slippage_bps: u64,
}

/// Orders were resolved: none, some of them, or all of them.
fn orders_event(data: &SynchronizedData, done: Event) -> Event {
    let data = TraderData(data);
    match (data.orders_hash(), data.incomplete_exec()) {
        (Ok(None), _) => NO_ORDERS,
        (Ok(Some(_)), Ok(true)) => PREPARE_INCOMPLETE_SWAP,
        _ => done,
    }
}

fn instructions_event(data: &SynchronizedData, done: Event) -> Event {
    let data = TraderData(data);
    match (data.instructions_hash(), data.incomplete_instructions()) {
        (Ok(None), _) => NO_INSTRUCTIONS,
        (Ok(Some(_)), Ok(true)) => INCOMPLETE_INSTRUCTIONS_PREPARED,
        _ => done,
    }
}

/// An empty instruction marks the end of the queue.
fn swap_queue_event(data: &SynchronizedData, done: Event) -> Event {
    match TraderData(data).most_voted_instruction_set() {
        Ok("") => SWAPS_QUEUE_EMPTY,
        _ => done,
    }
}

pub fn strategy_evaluator_app(round_timeout: Duration) -> AbciResult<AbciApp> {
    let strategy_exec = RoundSpec::same_until_threshold(STRATEGY_EXEC_ROUND)
        .with_schema(PayloadSchema::new(vec![
            Attribute::optional(ORDERS_HASH, AttributeKind::String),
            Attribute::optional(INCOMPLETE_EXEC, AttributeKind::Bool),
        ]))
        .with_selection_keys(&[ORDERS_HASH, INCOMPLETE_EXEC])
        .with_done_event(PREPARE_SWAP)
        .with_none_event(ERROR_PREPARING_SWAPS)
        .with_refinement(
            &[PREPARE_SWAP, PREPARE_INCOMPLETE_SWAP, NO_ORDERS],
            orders_event,
        );
    let backtest = RoundSpec::voting(BACKTEST_ROUND)
        .with_collection_key(PARTICIPANT_TO_BACKTESTING)
        .with_done_event(BACKTEST_POSITIVE)
        .with_negative_event(BACKTEST_NEGATIVE)
        .with_none_event(BACKTEST_FAILED)
        .with_no_majority_event(Event::NO_MAJORITY);
    let prepare_swap = RoundSpec::same_until_threshold(PREPARE_SWAP_ROUND)
        .with_schema(PayloadSchema::new(vec![
            Attribute::optional(INSTRUCTIONS_HASH, AttributeKind::String),
            Attribute::optional(INCOMPLETE_INSTRUCTIONS, AttributeKind::Bool),
        ]))
        .with_selection_keys(&[INSTRUCTIONS_HASH, INCOMPLETE_INSTRUCTIONS])
        .with_done_event(INSTRUCTIONS_PREPARED)
        .with_none_event(ERROR_PREPARING_INSTRUCTIONS)
        .with_refinement(
            &[
                INSTRUCTIONS_PREPARED,
                INCOMPLETE_INSTRUCTIONS_PREPARED,
                NO_INSTRUCTIONS,
            ],
            instructions_event,
        );
    let swap_queue = RoundSpec::same_until_threshold(SWAP_QUEUE_ROUND)
        .with_schema(PayloadSchema::new(vec![Attribute::optional(
            MOST_VOTED_INSTRUCTION_SET,
            AttributeKind::String,
        )]))
        .with_selection_keys(&[MOST_VOTED_INSTRUCTION_SET])
        .with_done_event(SWAP_TX_PREPARED)
        .with_none_event(TX_PREPARATION_FAILED)
        .with_refinement(&[SWAP_TX_PREPARED, SWAPS_QUEUE_EMPTY], swap_queue_event);

    AbciApp::builder("StrategyEvaluatorAbciApp", STRATEGY_EXEC_ROUND)
        .round(strategy_exec)
        .round(backtest)
        .round(prepare_swap)
        .round(swap_queue)
        .initial_state(SWAP_QUEUE_ROUND)
        .final_round(
            SWAP_TX_PREPARED_ROUND,
            &[INSTRUCTIONS_HASH, MOST_VOTED_INSTRUCTION_SET],
        )
        .final_round(NO_MORE_SWAPS_ROUND, &[])
        .final_round(STRATEGY_EXECUTION_FAILED_ROUND, &[])
        .final_round(INSTRUCTION_PREPARATION_FAILED_ROUND, &[])
        .final_round(HODL_ROUND, &[])
        .final_round(BACKTESTING_NEGATIVE_ROUND, &[])
        .final_round(BACKTESTING_FAILED_ROUND, &[])
        .transition(STRATEGY_EXEC_ROUND, PREPARE_SWAP, BACKTEST_ROUND)
        .transition(STRATEGY_EXEC_ROUND, PREPARE_INCOMPLETE_SWAP, BACKTEST_ROUND)
        .transition(STRATEGY_EXEC_ROUND, NO_ORDERS, HODL_ROUND)
        .transition(
            STRATEGY_EXEC_ROUND,
            ERROR_PREPARING_SWAPS,
            STRATEGY_EXECUTION_FAILED_ROUND,
        )
        .transition(STRATEGY_EXEC_ROUND, Event::NO_MAJORITY, STRATEGY_EXEC_ROUND)
        .transition(STRATEGY_EXEC_ROUND, Event::ROUND_TIMEOUT, STRATEGY_EXEC_ROUND)
        .transition(BACKTEST_ROUND, BACKTEST_POSITIVE, PREPARE_SWAP_ROUND)
        .transition(BACKTEST_ROUND, BACKTEST_NEGATIVE, BACKTESTING_NEGATIVE_ROUND)
        .transition(BACKTEST_ROUND, BACKTEST_FAILED, BACKTESTING_FAILED_ROUND)
        .transition(BACKTEST_ROUND, Event::NO_MAJORITY, BACKTEST_ROUND)
        .transition(BACKTEST_ROUND, Event::ROUND_TIMEOUT, BACKTEST_ROUND)
        .transition(PREPARE_SWAP_ROUND, INSTRUCTIONS_PREPARED, SWAP_QUEUE_ROUND)
        .transition(
            PREPARE_SWAP_ROUND,
            INCOMPLETE_INSTRUCTIONS_PREPARED,
            SWAP_QUEUE_ROUND,
        )
        .transition(PREPARE_SWAP_ROUND, NO_INSTRUCTIONS, HODL_ROUND)
        .transition(
            PREPARE_SWAP_ROUND,
            ERROR_PREPARING_INSTRUCTIONS,
            INSTRUCTION_PREPARATION_FAILED_ROUND,
        )
        .transition(PREPARE_SWAP_ROUND, Event::NO_MAJORITY, PREPARE_SWAP_ROUND)
        .transition(PREPARE_SWAP_ROUND, Event::ROUND_TIMEOUT, PREPARE_SWAP_ROUND)
        .transition(SWAP_QUEUE_ROUND, SWAP_TX_PREPARED, SWAP_TX_PREPARED_ROUND)
        .transition(SWAP_QUEUE_ROUND, SWAPS_QUEUE_EMPTY, NO_MORE_SWAPS_ROUND)
        .transition(SWAP_QUEUE_ROUND, TX_PREPARATION_FAILED, SWAP_QUEUE_ROUND)
        .transition(SWAP_QUEUE_ROUND, Event::NO_MAJORITY, SWAP_QUEUE_ROUND)
        .transition(SWAP_QUEUE_ROUND, Event::ROUND_TIMEOUT, SWAP_QUEUE_ROUND)
        .timeout(Event::ROUND_TIMEOUT, round_timeout)
        .pre_conditions(
            STRATEGY_EXEC_ROUND,
            &[SELECTED_STRATEGY, DATA_HASH, PORTFOLIO_HASH],
        )
        .pre_conditions(SWAP_QUEUE_ROUND, &[INSTRUCTIONS_HASH])
        .build()
}
