// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use super::{Order, STRATEGY_EXEC_ROUND};
use crate::{
    context::TraderContext,
    market_data_fetcher::TokenMarketData,
    params::{TraderParams, SOL},
    strategy::{run_guarded, Signal, Strategy, StrategyInput},
    synchronized_data::TraderData,
};
use abci_lib::{
    base_types::RoundId,
    interfaces::{Behaviour, RoundView},
};
use async_trait::async_trait;
use log::{error, info, warn};
use serde_json::Value;
use std::{collections::BTreeMap, sync::Arc};

/// Balances of the vault, as stored by the portfolio tracker.
pub(super) type Portfolio = BTreeMap<String, u64>;

pub(super) async fn load_portfolio(context: &TraderContext, hash: &str) -> Option<Portfolio> {
    let value = context.load(hash).await?;
    match serde_json::from_value(value) {
        Ok(portfolio) => Some(portfolio),
        Err(e) => {
            error!("Portfolio {} is malformed: {}", hash, e);
            None
        }
    }
}

/// Load the strategy recorded in the synchronized data, if it is verified.
pub(super) fn load_strategy(
    context: &TraderContext,
    view: &RoundView<'_>,
) -> Option<Arc<dyn Strategy>> {
    let name = match TraderData(view.synchronized_data).selected_strategy() {
        Ok(name) => name,
        Err(e) => {
            error!("{}", e);
            return None;
        }
    };
    let expected = context
        .params
        .strategy
        .strategy_packages
        .get(name)
        .map(String::as_str);
    match context.strategies.load(name, expected) {
        Ok(strategy) => Some(strategy),
        Err(e) => {
            error!("No executable was found for {}: {}", name, e);
            None
        }
    }
}

/// Everything the strategy needs to decide on `token`, or `None` if its market data is
/// unusable.
pub(super) fn strategy_input(
    params: &TraderParams,
    token: &str,
    market: &Value,
    portfolio: &Portfolio,
) -> Option<StrategyInput> {
    let data = TokenMarketData::from_chart(market.get(token)?)?;
    let native_price = market
        .get(SOL)
        .and_then(TokenMarketData::from_chart)
        .and_then(|native| native.prices.last().copied());
    Some(StrategyInput {
        token: token.to_string(),
        prices: data.prices,
        volumes: data.volumes,
        token_balance: portfolio.get(token).copied().unwrap_or(0),
        native_balance: portfolio.get(SOL).copied().unwrap_or(0),
        native_price,
        kwargs: params.strategy.strategies_kwargs.clone(),
    })
}

/// Run the strategy on every whitelisted token. Returns the orders and whether some
/// token could not be decided on or lacked the balance for its order.
pub(super) fn get_orders(
    params: &TraderParams,
    strategy: &dyn Strategy,
    market: &Value,
    portfolio: &Portfolio,
) -> (Vec<Order>, bool) {
    let mut orders = Vec::new();
    let mut incomplete = false;
    for token in &params.market_data.token_symbol_whitelist {
        let token = token.address.as_str();
        if token == SOL {
            continue;
        }
        let input = match strategy_input(params, token, market, portfolio) {
            Some(input) => input,
            None => {
                error!("No usable market data for {}", token);
                incomplete = true;
                continue;
            }
        };
        let signal = match run_guarded(strategy, &input) {
            Ok(signal) => signal,
            Err(e) => {
                error!(
                    "Strategy {} failed on {}: {}. Not taking any actions.",
                    strategy.name(),
                    token,
                    e
                );
                incomplete = true;
                continue;
            }
        };
        info!("Decision for {}: {:?}", token, signal);
        let (input_mint, output_mint) = match signal {
            Signal::Buy => (SOL, token),
            Signal::Sell => (token, SOL),
            Signal::Hold => continue,
        };
        let balance = portfolio.get(input_mint).copied().unwrap_or(0);
        let required = params.required_balance();
        if balance < required {
            warn!(
                "There is not enough balance ({} < {}) of {} to perform a swap",
                balance, required, input_mint
            );
            incomplete = true;
            continue;
        }
        orders.push(Order {
            input_mint: input_mint.to_string(),
            output_mint: output_mint.to_string(),
            amount: params.swap.swap_amount,
        });
    }
    (orders, incomplete)
}

pub struct StrategyExecBehaviour;

#[async_trait]
impl Behaviour<TraderContext> for StrategyExecBehaviour {
    fn matching_round(&self) -> RoundId {
        STRATEGY_EXEC_ROUND
    }

    async fn local_act(
        &mut self,
        context: &mut TraderContext,
        view: RoundView<'_>,
    ) -> Option<Vec<Value>> {
        let failure = vec![Value::Null, Value::Null];
        let strategy = match load_strategy(context, &view) {
            Some(strategy) => strategy,
            None => return Some(failure),
        };
        let data = TraderData(view.synchronized_data);
        let (data_hash, portfolio_hash) = match (data.data_hash(), data.portfolio_hash()) {
            (Ok(data_hash), Ok(portfolio_hash)) => (data_hash, portfolio_hash),
            (Err(e), _) | (_, Err(e)) => {
                error!("{}", e);
                return Some(failure);
            }
        };
        let (market, portfolio) = match (
            context.load(data_hash).await,
            load_portfolio(context, portfolio_hash).await,
        ) {
            (Some(market), Some(portfolio)) => (market, portfolio),
            _ => return Some(failure),
        };

        let (orders, incomplete) =
            get_orders(&context.params, strategy.as_ref(), &market, &portfolio);
        if orders.is_empty() {
            info!("No orders (incomplete: {})", incomplete);
            return Some(vec![Value::Null, Value::Bool(incomplete)]);
        }
        let orders = match serde_json::to_value(&orders) {
            Ok(orders) => orders,
            Err(e) => {
                error!("Could not serialize the orders: {}", e);
                return Some(failure);
            }
        };
        match context.save(&orders).await {
            Some(hash) => Some(vec![Value::from(hash), Value::Bool(incomplete)]),
            None => Some(failure),
        }
    }
}
