// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

//! Agents fetch the market chart of every whitelisted token, store it, agree on its
//! address, then vote on whether the stored data is usable.

use crate::{
    context::TraderContext,
    synchronized_data::{TraderData, DATA_HASH, PARTICIPANT_TO_VERIFICATION},
};
use abci_lib::{
    abci_app::AbciApp,
    base_types::{Duration, Event, RoundId},
    error::AbciResult,
    interfaces::{ApiRequest, Behaviour, RoundView},
    io::fetch_json_with_retries,
    payload::{Attribute, AttributeKind, PayloadSchema},
    round::RoundSpec,
};
use async_trait::async_trait;
use log::{error, info, warn};
use serde_json::{json, Map, Value};

#[cfg(test)]
#[path = "unit_tests/market_data_fetcher_tests.rs"]
mod market_data_fetcher_tests;

pub const FETCH_MARKET_DATA_ROUND: RoundId = RoundId("FetchMarketDataRound");
pub const VERIFY_MARKET_DATA_ROUND: RoundId = RoundId("VerifyMarketDataRound");
pub const FINISHED_MARKET_FETCH_ROUND: RoundId = RoundId("FinishedMarketFetchRound");
pub const FAILED_MARKET_FETCH_ROUND: RoundId = RoundId("FailedMarketFetchRound");

pub fn market_data_fetcher_app(round_timeout: Duration) -> AbciResult<AbciApp> {
    AbciApp::builder("MarketDataFetcherAbciApp", FETCH_MARKET_DATA_ROUND)
        .round(
            RoundSpec::same_until_threshold(FETCH_MARKET_DATA_ROUND)
                .with_schema(PayloadSchema::new(vec![Attribute::optional(
                    DATA_HASH,
                    AttributeKind::String,
                )]))
                .with_selection_keys(&[DATA_HASH]),
        )
        .round(
            RoundSpec::voting(VERIFY_MARKET_DATA_ROUND)
                .with_collection_key(PARTICIPANT_TO_VERIFICATION),
        )
        .final_round(
            FINISHED_MARKET_FETCH_ROUND,
            &[DATA_HASH, PARTICIPANT_TO_VERIFICATION],
        )
        .final_round(FAILED_MARKET_FETCH_ROUND, &[])
        .transition(
            FETCH_MARKET_DATA_ROUND,
            Event::DONE,
            VERIFY_MARKET_DATA_ROUND,
        )
        .transition(
            FETCH_MARKET_DATA_ROUND,
            Event::NONE,
            FAILED_MARKET_FETCH_ROUND,
        )
        .transition(
            FETCH_MARKET_DATA_ROUND,
            Event::NO_MAJORITY,
            FETCH_MARKET_DATA_ROUND,
        )
        .transition(
            FETCH_MARKET_DATA_ROUND,
            Event::ROUND_TIMEOUT,
            FETCH_MARKET_DATA_ROUND,
        )
        .transition(
            VERIFY_MARKET_DATA_ROUND,
            Event::DONE,
            FINISHED_MARKET_FETCH_ROUND,
        )
        .transition(
            VERIFY_MARKET_DATA_ROUND,
            Event::NONE,
            FAILED_MARKET_FETCH_ROUND,
        )
        .transition(
            VERIFY_MARKET_DATA_ROUND,
            Event::ROUND_TIMEOUT,
            FETCH_MARKET_DATA_ROUND,
        )
        .timeout(Event::ROUND_TIMEOUT, round_timeout)
        .build()
}

/// Price and volume history of one token, oldest first.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TokenMarketData {
    pub prices: Vec<f64>,
    pub volumes: Vec<f64>,
}

impl TokenMarketData {
    /// Parse a market chart of the form `{"prices": [[ts, p], ..], "total_volumes": [[ts, v], ..]}`.
    pub fn from_chart(chart: &Value) -> Option<TokenMarketData> {
        let prices = series(chart.get("prices")?)?;
        let volumes = series(chart.get("total_volumes")?)?;
        if prices.is_empty() {
            return None;
        }
        Some(TokenMarketData { prices, volumes })
    }
}

fn series(value: &Value) -> Option<Vec<f64>> {
    value
        .as_array()?
        .iter()
        .map(|point| match point.as_array().map(Vec::as_slice) {
            Some([timestamp, value]) if timestamp.is_number() => value.as_f64(),
            _ => None,
        })
        .collect()
}

pub struct FetchMarketDataBehaviour;

#[async_trait]
impl Behaviour<TraderContext> for FetchMarketDataBehaviour {
    fn matching_round(&self) -> RoundId {
        FETCH_MARKET_DATA_ROUND
    }

    async fn local_act(
        &mut self,
        context: &mut TraderContext,
        _view: RoundView<'_>,
    ) -> Option<Vec<Value>> {
        let params = context.params.clone();
        let mut market = Map::new();
        for token in &params.market_data.token_symbol_whitelist {
            let mut request = ApiRequest::get(params.market_chart_url(token));
            if let Some(key) = &params.market_data.coingecko_api_key {
                request = request.with_header("x-cg-pro-api-key", key.clone());
            }
            let chart = match fetch_json_with_retries(
                context.http.as_ref(),
                &request,
                &params.market_data.retry_policy,
            )
            .await
            {
                Some(chart) => chart,
                None => {
                    error!("Could not fetch the market data of {}", token.coingecko_id);
                    return Some(vec![Value::Null]);
                }
            };
            let entry = json!({
                "prices": chart.get("prices").cloned().unwrap_or(Value::Null),
                "total_volumes": chart.get("total_volumes").cloned().unwrap_or(Value::Null),
            });
            market.insert(token.address.clone(), entry);
        }
        let hash = context.save(&Value::Object(market)).await;
        if let Some(hash) = &hash {
            info!("Market data stored under {}", hash);
        }
        Some(vec![hash.map_or(Value::Null, Value::from)])
    }
}

/// Votes for the fetched data if every whitelisted token has a usable chart.
pub struct VerifyMarketDataBehaviour;

#[async_trait]
impl Behaviour<TraderContext> for VerifyMarketDataBehaviour {
    fn matching_round(&self) -> RoundId {
        VERIFY_MARKET_DATA_ROUND
    }

    async fn local_act(
        &mut self,
        context: &mut TraderContext,
        view: RoundView<'_>,
    ) -> Option<Vec<Value>> {
        let hash = match TraderData(view.synchronized_data).data_hash() {
            Ok(hash) => hash,
            Err(e) => {
                error!("{}", e);
                return Some(vec![Value::Null]);
            }
        };
        let market = match context.load(hash).await {
            Some(market) => market,
            None => return Some(vec![Value::Null]),
        };
        let missing: Vec<_> = context
            .params
            .market_data
            .token_symbol_whitelist
            .iter()
            .filter(|token| {
                market
                    .get(&token.address)
                    .and_then(TokenMarketData::from_chart)
                    .is_none()
            })
            .map(|token| token.coingecko_id.as_str())
            .collect();
        if !missing.is_empty() {
            warn!("No usable market data for {:?}", missing);
        }
        Some(vec![Value::Bool(missing.is_empty())])
    }
}
