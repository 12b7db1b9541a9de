// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

//! Agents fetch the balances of the vault, store them, and agree on their address.

use crate::{
    context::TraderContext,
    params::{TraderParams, SOL},
    synchronized_data::PORTFOLIO_HASH,
};
use abci_lib::{
    abci_app::AbciApp,
    base_types::{Duration, Event, RoundId},
    error::AbciResult,
    interfaces::{ApiRequest, Behaviour, HttpCollaborator, RoundView},
    io::fetch_json_with_retries,
    payload::{Attribute, AttributeKind, PayloadSchema},
    round::RoundSpec,
};
use async_trait::async_trait;
use log::{error, info};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

#[cfg(test)]
#[path = "unit_tests/portfolio_tracker_tests.rs"]
mod portfolio_tracker_tests;

pub const PORTFOLIO_TRACKER_ROUND: RoundId = RoundId("PortfolioTrackerRound");
pub const FINISHED_PORTFOLIO_TRACKER_ROUND: RoundId = RoundId("FinishedPortfolioTrackerRound");
pub const FAILED_PORTFOLIO_TRACKER_ROUND: RoundId = RoundId("FailedPortfolioTrackerRound");

const BALANCE_METHOD: &str = "getBalance";
const TOKEN_ACCOUNTS_METHOD: &str = "getTokenAccountsByOwner";
const TOKEN_AMOUNT_PATH: [&str; 6] = [
    "account",
    "data",
    "parsed",
    "info",
    "tokenAmount",
    "amount",
];

pub fn portfolio_tracker_app(round_timeout: Duration) -> AbciResult<AbciApp> {
    AbciApp::builder("PortfolioTrackerAbciApp", PORTFOLIO_TRACKER_ROUND)
        .round(
            RoundSpec::same_until_threshold(PORTFOLIO_TRACKER_ROUND)
                .with_schema(PayloadSchema::new(vec![Attribute::optional(
                    PORTFOLIO_HASH,
                    AttributeKind::String,
                )]))
                .with_selection_keys(&[PORTFOLIO_HASH]),
        )
        .final_round(FINISHED_PORTFOLIO_TRACKER_ROUND, &[PORTFOLIO_HASH])
        .final_round(FAILED_PORTFOLIO_TRACKER_ROUND, &[])
        .transition(
            PORTFOLIO_TRACKER_ROUND,
            Event::DONE,
            FINISHED_PORTFOLIO_TRACKER_ROUND,
        )
        .transition(
            PORTFOLIO_TRACKER_ROUND,
            Event::NONE,
            FAILED_PORTFOLIO_TRACKER_ROUND,
        )
        .transition(
            PORTFOLIO_TRACKER_ROUND,
            Event::NO_MAJORITY,
            PORTFOLIO_TRACKER_ROUND,
        )
        .transition(
            PORTFOLIO_TRACKER_ROUND,
            Event::ROUND_TIMEOUT,
            PORTFOLIO_TRACKER_ROUND,
        )
        .timeout(Event::ROUND_TIMEOUT, round_timeout)
        .build()
}

fn rpc_request(params: &TraderParams, method: &str, rpc_params: Value) -> ApiRequest {
    ApiRequest::post(
        params.portfolio.rpc_endpoint.clone(),
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": rpc_params,
        }),
    )
}

/// Parse a base-unit amount, sent either as a number or as a decimal string.
pub fn parse_amount(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Amount held by the first token account of a `getTokenAccountsByOwner` response. Owners
/// without an account hold nothing.
pub fn token_amount(response: &Value) -> Option<u64> {
    let accounts = response.get("result")?.get("value")?.as_array()?;
    let account = match accounts.first() {
        Some(account) => account,
        None => return Some(0),
    };
    let amount = TOKEN_AMOUNT_PATH
        .iter()
        .try_fold(account, |value, key| value.get(*key))?;
    parse_amount(amount)
}

pub async fn native_balance(http: &dyn HttpCollaborator, params: &TraderParams) -> Option<u64> {
    let request = rpc_request(params, BALANCE_METHOD, json!([params.portfolio.squad_vault]));
    let response =
        fetch_json_with_retries(http, &request, &params.market_data.retry_policy).await?;
    parse_amount(response.get("result")?.get("value")?)
}

pub async fn token_balance(
    http: &dyn HttpCollaborator,
    params: &TraderParams,
    mint: &str,
) -> Option<u64> {
    let request = rpc_request(
        params,
        TOKEN_ACCOUNTS_METHOD,
        json!([
            params.portfolio.squad_vault,
            { "mint": mint },
            { "encoding": "jsonParsed" },
        ]),
    );
    let response =
        fetch_json_with_retries(http, &request, &params.market_data.retry_policy).await?;
    let amount = token_amount(&response);
    if amount.is_none() {
        error!(
            "Unexpected response format from {:?}: {}",
            TOKEN_ACCOUNTS_METHOD, response
        );
    }
    amount
}

/// Balances of every whitelisted token, keyed by mint address.
pub async fn fetch_portfolio(
    http: &dyn HttpCollaborator,
    params: &TraderParams,
) -> Option<BTreeMap<String, u64>> {
    let mut portfolio = BTreeMap::new();
    for token in &params.market_data.token_symbol_whitelist {
        let balance = if token.address == SOL {
            native_balance(http, params).await
        } else {
            token_balance(http, params, &token.address).await
        };
        match balance {
            Some(balance) => {
                portfolio.insert(token.address.clone(), balance);
            }
            None => {
                error!("Failed to get the balance of {}", token.address);
                return None;
            }
        }
    }
    Some(portfolio)
}

pub struct PortfolioTrackerBehaviour;

#[async_trait]
impl Behaviour<TraderContext> for PortfolioTrackerBehaviour {
    fn matching_round(&self) -> RoundId {
        PORTFOLIO_TRACKER_ROUND
    }

    async fn local_act(
        &mut self,
        context: &mut TraderContext,
        _view: RoundView<'_>,
    ) -> Option<Vec<Value>> {
        let params = context.params.clone();
        let portfolio = match fetch_portfolio(context.http.as_ref(), &params).await {
            Some(portfolio) => portfolio,
            None => return Some(vec![Value::Null]),
        };
        let portfolio: Map<String, Value> = portfolio
            .into_iter()
            .map(|(token, balance)| (token, Value::from(balance)))
            .collect();
        let hash = context.save(&Value::Object(portfolio)).await;
        if let Some(hash) = &hash {
            info!("Portfolio stored under {}", hash);
        }
        Some(vec![hash.map_or(Value::Null, Value::from)])
    }
}
