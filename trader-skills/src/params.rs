// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::strategy::StrategyRegistry;
use abci_lib::{base_types::Duration, io::RetryPolicy};
use anyhow::{ensure, Context as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{collections::BTreeMap, convert::TryFrom, fmt, fs, path::Path, str::FromStr};

#[cfg(test)]
#[path = "unit_tests/params_tests.rs"]
mod params_tests;

/// Mint address of the native token.
pub const SOL: &str = "So11111111111111111111111111111111111111112";

/// All the parameters of an agent. Loaded once at startup and shared read-only.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraderParams {
    pub round: RoundParams,
    pub market_data: MarketDataParams,
    pub portfolio: PortfolioParams,
    pub strategy: StrategyParams,
    pub swap: SwapParams,
    pub reset: ResetParams,
    pub store: StoreParams,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundParams {
    /// Timeout of every round, in seconds.
    pub round_timeout: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketDataParams {
    pub token_symbol_whitelist: Vec<TokenConfig>,
    /// Url of the market chart of a token. `{token_id}` is replaced by its coingecko id.
    pub coingecko_market_endpoint: String,
    pub coingecko_api_key: Option<String>,
    pub retry_policy: RetryPolicy,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioParams {
    pub rpc_endpoint: String,
    /// Account holding the funds of the service.
    pub squad_vault: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyParams {
    pub trading_strategy: String,
    /// Expected manifest hash of each strategy that may be selected.
    pub strategy_packages: BTreeMap<String, String>,
    /// Extra arguments handed to every strategy.
    pub strategies_kwargs: BTreeMap<String, Value>,
    /// Backtests returning less than this vote against the orders.
    pub min_backtest_return: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwapParams {
    pub swap_quotes_endpoint: String,
    /// Amount sold by each order, in base units of the input token.
    pub swap_amount: u64,
    pub slippage_bps: u64,
    pub expected_swap_tx_cost: u64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetParams {
    /// Pause before a new period, in seconds.
    pub observation_interval: f64,
    /// Timeout of the reset round, in seconds.
    pub reset_pause_timeout: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreParams {
    /// Applies to every read and write of the content store.
    pub retry_policy: RetryPolicy,
}

/// A whitelisted token. Also parsed from `coingecko_id=<id>&address=<address>`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TokenConfigRepr")]
pub struct TokenConfig {
    pub coingecko_id: String,
    pub address: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TokenConfigRepr {
    Compact(String),
    Full { coingecko_id: String, address: String },
}

impl TryFrom<TokenConfigRepr> for TokenConfig {
    type Error = String;

    fn try_from(repr: TokenConfigRepr) -> Result<Self, Self::Error> {
        match repr {
            TokenConfigRepr::Compact(s) => s.parse(),
            TokenConfigRepr::Full {
                coingecko_id,
                address,
            } => Ok(TokenConfig {
                coingecko_id,
                address,
            }),
        }
    }
}

impl FromStr for TokenConfig {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut coingecko_id = None;
        let mut address = None;
        for pair in s.split('&') {
            let mut parts = pair.splitn(2, '=');
            match (parts.next(), parts.next()) {
                (Some("coingecko_id"), Some(value)) => coingecko_id = Some(value.to_string()),
                (Some("address"), Some(value)) => address = Some(value.to_string()),
                _ => return Err(format!("invalid token config entry {:?} in {:?}", pair, s)),
            }
        }
        match (coingecko_id, address) {
            (Some(coingecko_id), Some(address)) => Ok(TokenConfig {
                coingecko_id,
                address,
            }),
            _ => Err(format!(
                "token config {:?} needs both a coingecko_id and an address",
                s
            )),
        }
    }
}

impl fmt::Display for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "coingecko_id={}&address={}",
            self.coingecko_id, self.address
        )
    }
}

impl Default for RoundParams {
    fn default() -> Self {
        RoundParams {
            round_timeout: 30.0,
        }
    }
}

impl Default for MarketDataParams {
    fn default() -> Self {
        let whitelist = [
            ("solana", SOL),
            (
                "jupiter-exchange-solana",
                "JUPyiwrYJFskUPiHa7hkeR8VUtAeFoSYbKedZNsDvCN",
            ),
            ("bonk", "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263"),
        ];
        MarketDataParams {
            token_symbol_whitelist: whitelist
                .iter()
                .map(|(id, address)| TokenConfig {
                    coingecko_id: id.to_string(),
                    address: address.to_string(),
                })
                .collect(),
            coingecko_market_endpoint:
                "https://api.coingecko.com/api/v3/coins/{token_id}/market_chart?vs_currency=usd&days=1"
                    .to_string(),
            coingecko_api_key: None,
            retry_policy: RetryPolicy::default(),
        }
    }
}

impl Default for PortfolioParams {
    fn default() -> Self {
        PortfolioParams {
            rpc_endpoint: "https://api.mainnet-beta.solana.com".to_string(),
            squad_vault: "39Nf5uHmVyjGUvmTbpE4NvDbQGFGSoA8XXjSRUeGXBpZ".to_string(),
        }
    }
}

impl Default for StrategyParams {
    fn default() -> Self {
        let mut strategies_kwargs = BTreeMap::new();
        strategies_kwargs.insert("ma_period".to_string(), Value::from(20));
        strategies_kwargs.insert("rsi_period".to_string(), Value::from(14));
        StrategyParams {
            trading_strategy: "trend_following".to_string(),
            strategy_packages: StrategyRegistry::with_builtins().manifest_hashes(),
            strategies_kwargs,
            min_backtest_return: -0.1,
        }
    }
}

impl Default for SwapParams {
    fn default() -> Self {
        SwapParams {
            swap_quotes_endpoint: "https://quote-api.jup.ag/v6/quote".to_string(),
            swap_amount: 100_000_000,
            slippage_bps: 50,
            expected_swap_tx_cost: 5_000,
        }
    }
}

impl Default for ResetParams {
    fn default() -> Self {
        ResetParams {
            observation_interval: 10.0,
            reset_pause_timeout: 60.0,
        }
    }
}

impl TraderParams {
    /// Load parameters from a JSON file. Missing fields take their default values.
    pub fn read<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("could not read parameters from {}", path.display()))?;
        let params: TraderParams = serde_json::from_str(&content)
            .with_context(|| format!("invalid parameters in {}", path.display()))?;
        params.check()?;
        Ok(params)
    }

    pub fn check(&self) -> anyhow::Result<()> {
        ensure!(
            self.round.round_timeout > 0.0,
            "round_timeout must be positive"
        );
        ensure!(
            self.reset.reset_pause_timeout > self.reset.observation_interval,
            "reset_pause_timeout must exceed the observation interval"
        );
        ensure!(
            !self.market_data.token_symbol_whitelist.is_empty(),
            "the token whitelist is empty"
        );
        ensure!(
            self.strategy
                .strategy_packages
                .contains_key(&self.strategy.trading_strategy),
            "no package hash for the trading strategy {:?}",
            self.strategy.trading_strategy
        );
        Ok(())
    }

    pub fn round_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.round.round_timeout)
    }

    pub fn reset_pause_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.reset.reset_pause_timeout)
    }

    pub fn observation_interval(&self) -> Duration {
        Duration::from_secs_f64(self.reset.observation_interval)
    }

    /// Url of the market chart of `token`.
    pub fn market_chart_url(&self, token: &TokenConfig) -> String {
        self.market_data
            .coingecko_market_endpoint
            .replace("{token_id}", &token.coingecko_id)
    }

    /// Balance needed on the input token of an order.
    pub fn required_balance(&self) -> u64 {
        self.swap
            .swap_amount
            .saturating_add(self.swap.expected_swap_tx_cost)
    }
}
