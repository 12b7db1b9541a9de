// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use super::{
    strategy_exec::{load_portfolio, load_strategy, strategy_input, Portfolio},
    Order, BACKTEST_ROUND,
};
use crate::{
    context::TraderContext,
    params::{TraderParams, SOL},
    strategy::{evaluate_guarded, Strategy},
    synchronized_data::TraderData,
};
use abci_lib::{
    base_types::RoundId,
    interfaces::{Behaviour, RoundView},
};
use async_trait::async_trait;
use log::{error, info};
use serde_json::Value;

/// Replay the strategy on the traded tokens. `None` if some token cannot be evaluated.
pub(super) fn backtest(
    params: &TraderParams,
    strategy: &dyn Strategy,
    orders: &[Order],
    market: &Value,
    portfolio: &Portfolio,
) -> Option<bool> {
    let mut positive = true;
    for order in orders {
        let token = if order.input_mint == SOL {
            &order.output_mint
        } else {
            &order.input_mint
        };
        let input = strategy_input(params, token, market, portfolio)?;
        match evaluate_guarded(strategy, &input) {
            Ok(evaluation) => {
                info!(
                    "Backtest of {} on {}: return {:.4} over {} trade(s)",
                    strategy.name(),
                    token,
                    evaluation.total_return,
                    evaluation.trades
                );
                positive &= evaluation.total_return >= params.strategy.min_backtest_return;
            }
            Err(e) => {
                error!("Could not backtest {} on {}: {}", strategy.name(), token, e);
                return None;
            }
        }
    }
    Some(positive)
}

/// Votes for the orders if the strategy performed well enough on their tokens.
pub struct BacktestBehaviour;

#[async_trait]
impl Behaviour<TraderContext> for BacktestBehaviour {
    fn matching_round(&self) -> RoundId {
        BACKTEST_ROUND
    }

    async fn local_act(
        &mut self,
        context: &mut TraderContext,
        view: RoundView<'_>,
    ) -> Option<Vec<Value>> {
        let strategy = match load_strategy(context, &view) {
            Some(strategy) => strategy,
            None => return Some(vec![Value::Null]),
        };
        let data = TraderData(view.synchronized_data);
        let hashes = (data.orders_hash(), data.data_hash(), data.portfolio_hash());
        let (orders_hash, data_hash, portfolio_hash) = match hashes {
            (Ok(Some(orders)), Ok(market), Ok(portfolio)) => (orders, market, portfolio),
            _ => {
                error!("Backtesting requires orders, market data and a portfolio");
                return Some(vec![Value::Null]);
            }
        };
        let orders = match context.load(orders_hash).await {
            Some(orders) => orders,
            None => return Some(vec![Value::Null]),
        };
        let orders: Vec<Order> = match serde_json::from_value(orders) {
            Ok(orders) => orders,
            Err(e) => {
                error!("Orders {} are malformed: {}", orders_hash, e);
                return Some(vec![Value::Null]);
            }
        };
        let (market, portfolio) = match (
            context.load(data_hash).await,
            load_portfolio(context, portfolio_hash).await,
        ) {
            (Some(market), Some(portfolio)) => (market, portfolio),
            _ => return Some(vec![Value::Null]),
        };

        let vote = backtest(
            &context.params,
            strategy.as_ref(),
            &orders,
            &market,
            &portfolio,
        );
        Some(vec![vote.map_or(Value::Null, Value::Bool)])
    }
}
