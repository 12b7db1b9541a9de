// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::{
    composition::{trader_app, trader_behaviours},
    context::TraderContext,
    params::TraderParams,
    strategy::StrategyRegistry,
};
use abci_lib::{
    agent::Agent,
    base_types::{Duration, NodeTime, Participant},
    content_store::MemoryContentStore,
    error::AbciResult,
    interfaces::{ApiRequest, ApiResponse, HttpCollaborator, Method},
    synchronized_data::SynchronizedData,
    ParticipantSet,
};
use async_trait::async_trait;
use log::{debug, trace};
use serde_json::{json, Value};
use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

#[cfg(test)]
#[path = "unit_tests/simulated_context_tests.rs"]
mod simulated_context_tests;

/// Timestamp of the first point of every chart, in milliseconds.
const CHART_START: i64 = 1_700_000_000_000;
/// Interval between two points of a chart.
const CHART_STEP: i64 = 300_000;

/// Deterministic stand-in for the market data, RPC and quote APIs. Two markets created
/// with the same seed answer every request identically.
#[derive(Debug)]
pub struct SimulatedMarket {
    seed: u64,
    chart_points: usize,
    native_balance: u64,
    /// Every n-th request fails with a 503.
    failure_every: Option<usize>,
    requests: AtomicUsize,
}

impl SimulatedMarket {
    pub fn new(seed: u64) -> Self {
        SimulatedMarket {
            seed,
            chart_points: 96,
            native_balance: 5_000_000_000,
            failure_every: None,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn with_failure_every(mut self, n: usize) -> Self {
        self.failure_every = Some(n);
        self
    }

    pub fn with_chart_points(mut self, n: usize) -> Self {
        self.chart_points = n;
        self
    }

    pub fn with_native_balance(mut self, balance: u64) -> Self {
        self.native_balance = balance;
        self
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn key_seed(&self, key: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.seed.hash(&mut hasher);
        key.hash(&mut hasher);
        hasher.finish()
    }

    /// Market chart of a token: a trend plus an oscillation around a base price.
    pub fn chart(&self, token_id: &str) -> Value {
        let seed = self.key_seed(token_id);
        let base = 0.5 + (seed % 1000) as f64 / 10.0;
        let phase = ((seed >> 10) % 628) as f64 / 100.0;
        let trend = (((seed >> 20) % 21) as f64 - 10.0) / 2000.0;
        let (prices, volumes): (Vec<Value>, Vec<Value>) = (0..self.chart_points)
            .map(|i| {
                let timestamp = CHART_START + i as i64 * CHART_STEP;
                let x = i as f64;
                let price = base * (1.0 + trend * x + 0.05 * (x / 6.0 + phase).sin());
                let volume = base * 1e6 * (1.0 + 0.3 * (x / 4.0 + phase).cos());
                (json!([timestamp, price]), json!([timestamp, volume]))
            })
            .unzip();
        json!({
            "prices": prices,
            "market_caps": [],
            "total_volumes": volumes,
        })
    }

    pub fn token_balance(&self, mint: &str) -> u64 {
        (self.key_seed(mint) % 10_000) * 1_000_000
    }

    fn quote(&self, query: &[(String, String)]) -> Option<Value> {
        let param = |name: &str| {
            query
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        };
        let input_mint = param("inputMint")?;
        let output_mint = param("outputMint")?;
        let amount: u64 = param("amount")?.parse().ok()?;
        let rate = self.key_seed(&format!("{}/{}", input_mint, output_mint)) % 1000 + 1;
        let out_amount = amount.saturating_mul(rate) / 1000;
        Some(json!({
            "inputMint": input_mint,
            "outputMint": output_mint,
            "inAmount": amount.to_string(),
            "outAmount": out_amount.to_string(),
            "slippageBps": param("slippageBps").unwrap_or("0"),
        }))
    }

    fn rpc(&self, body: &Value) -> Option<Value> {
        let result = match body.get("method")?.as_str()? {
            "getBalance" => json!({ "value": self.native_balance }),
            "getTokenAccountsByOwner" => {
                let mint = body.get("params")?.get(1)?.get("mint")?.as_str()?;
                let amount = self.token_balance(mint).to_string();
                json!({
                    "value": [{
                        "account": {
                            "data": {
                                "parsed": { "info": { "tokenAmount": { "amount": amount } } }
                            }
                        }
                    }]
                })
            }
            _ => return None,
        };
        Some(json!({ "jsonrpc": "2.0", "id": body.get("id"), "result": result }))
    }

    fn route(&self, request: &ApiRequest) -> Option<Value> {
        let (path, query) = split_url(&request.url);
        match request.method {
            Method::Get if path.ends_with("/market_chart") => {
                let token_id = path
                    .trim_end_matches("/market_chart")
                    .rsplit('/')
                    .next()?;
                Some(self.chart(token_id))
            }
            Method::Get if path.ends_with("/quote") => self.quote(&query),
            Method::Post => self.rpc(request.body.as_ref()?),
            _ => None,
        }
    }
}

fn split_url(url: &str) -> (&str, Vec<(String, String)>) {
    let mut parts = url.splitn(2, '?');
    let path = parts.next().unwrap_or("");
    let query = parts
        .next()
        .map(|query| {
            query
                .split('&')
                .filter_map(|pair| {
                    let mut kv = pair.splitn(2, '=');
                    Some((kv.next()?.to_string(), kv.next().unwrap_or("").to_string()))
                })
                .collect()
        })
        .unwrap_or_default();
    (path, query)
}

#[async_trait]
impl HttpCollaborator for SimulatedMarket {
    async fn send(&self, request: &ApiRequest) -> AbciResult<ApiResponse> {
        let count = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(n) = self.failure_every {
            if n > 0 && count % n == 0 {
                debug!("Injected failure for {}", request.url);
                return Ok(ApiResponse {
                    status: 503,
                    body: Vec::new(),
                });
            }
        }
        trace!("Simulated request {:?}", request);
        let response = match self.route(request) {
            Some(body) => ApiResponse {
                status: 200,
                body: serde_json::to_vec(&body)?,
            },
            None => ApiResponse {
                status: 404,
                body: Vec::new(),
            },
        };
        Ok(response)
    }

    /// Simulated time does not advance during a local phase.
    async fn sleep(&self, _duration: Duration) {}
}

/// Create `num_agents` trader agents sharing one content store. Each agent gets its
/// own market from `market_factory(index)`.
pub fn make_agents<F>(
    params: Arc<TraderParams>,
    num_agents: usize,
    market_factory: F,
) -> AbciResult<Vec<Agent<TraderContext>>>
where
    F: Fn(usize) -> SimulatedMarket,
{
    let app = Arc::new(trader_app(&params)?);
    let store = Arc::new(MemoryContentStore::new());
    let strategies = Arc::new(StrategyRegistry::with_builtins());
    let names: Vec<_> = (0..num_agents)
        .map(|index| Participant::new(format!("agent_{}", index)))
        .collect();
    let participants = ParticipantSet::new(names.clone());
    names
        .into_iter()
        .enumerate()
        .map(|(index, name)| {
            let context = TraderContext::new(
                params.clone(),
                Arc::new(market_factory(index)),
                store.clone(),
                strategies.clone(),
            );
            Agent::new(
                name,
                app.clone(),
                participants.clone(),
                SynchronizedData::new(app.cross_period_persisted_keys().clone()),
                trader_behaviours(),
                context,
                NodeTime(0),
            )
        })
        .collect()
}
