// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

//! Skills of the trader service: agents agree on a strategy, fetch market data and the
//! portfolio, run the strategy, backtest and quote the resulting orders, then queue the
//! swap instructions, period after period.

/// Parameters of the service, composed from one sub-config per concern.
pub mod params;
/// Keys of the synchronized data and a typed view over them.
pub mod synchronized_data;
/// The strategy plugin interface and the verified registry.
pub mod strategy;
/// Strategies shipped with the service.
pub mod strategies;
/// What behaviours can access locally.
pub mod context;

pub mod decision_maker;
pub mod market_data_fetcher;
pub mod portfolio_tracker;
pub mod registration;
pub mod reset_pause;
pub mod strategy_evaluator;

/// The chained service-level app and its behaviours.
pub mod composition;
/// Deterministic market APIs and agent factories for simulations.
pub mod simulated_context;

#[cfg(test)]
#[path = "unit_tests/test_utils.rs"]
mod test_utils;
