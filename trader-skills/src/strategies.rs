// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::strategy::{Signal, Strategy, StrategyError, StrategyInput};
use serde_json::{json, Value};
use std::sync::Arc;

#[cfg(test)]
#[path = "unit_tests/strategies_tests.rs"]
mod strategies_tests;

pub fn builtins() -> Vec<Arc<dyn Strategy>> {
    vec![Arc::new(TrendFollowing), Arc::new(PortfolioBalancer)]
}

/// Buy when the price is above its moving average and the RSI is not overbought, sell
/// when it is below and the RSI is not oversold.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrendFollowing;

const DEFAULT_MA_PERIOD: usize = 20;
const DEFAULT_RSI_PERIOD: usize = 14;
const DEFAULT_RSI_OVERBOUGHT: f64 = 70.0;
const DEFAULT_RSI_OVERSOLD: f64 = 30.0;

impl TrendFollowing {
    /// Average gain over average loss of the last `period` price changes, mapped to 0..100.
    /// `prices` must hold at least `period + 1` points.
    pub(crate) fn rsi(prices: &[f64], period: usize) -> f64 {
        let (gains, losses) = prices[prices.len() - period - 1..]
            .windows(2)
            .map(|w| w[1] - w[0])
            .fold((0.0, 0.0), |(gains, losses), delta| {
                if delta > 0.0 {
                    (gains + delta, losses)
                } else {
                    (gains, losses - delta)
                }
            });
        let avg_gain = gains / period as f64;
        let avg_loss = losses / period as f64;
        if avg_loss == 0.0 {
            return 100.0;
        }
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

impl Strategy for TrendFollowing {
    fn name(&self) -> &str {
        "trend_following"
    }

    fn manifest(&self) -> Value {
        json!({
            "name": self.name(),
            "version": "0.1.0",
            "signals": ["buy", "sell", "hold"],
            "defaults": {
                "ma_period": DEFAULT_MA_PERIOD,
                "rsi_period": DEFAULT_RSI_PERIOD,
                "rsi_overbought_threshold": DEFAULT_RSI_OVERBOUGHT,
                "rsi_oversold_threshold": DEFAULT_RSI_OVERSOLD,
            },
        })
    }

    fn run(&self, input: &StrategyInput) -> Result<Signal, StrategyError> {
        let ma_period = input.kwarg_usize("ma_period", DEFAULT_MA_PERIOD)?;
        let rsi_period = input.kwarg_usize("rsi_period", DEFAULT_RSI_PERIOD)?;
        let overbought = input.kwarg_f64("rsi_overbought_threshold", DEFAULT_RSI_OVERBOUGHT)?;
        let oversold = input.kwarg_f64("rsi_oversold_threshold", DEFAULT_RSI_OVERSOLD)?;

        let prices = &input.prices;
        let needed = std::cmp::max(ma_period, rsi_period + 1);
        if prices.len() < needed {
            return Err(StrategyError::InsufficientData {
                needed,
                found: prices.len(),
            });
        }
        let ma = prices[prices.len() - ma_period..].iter().sum::<f64>() / ma_period as f64;
        let rsi = Self::rsi(prices, rsi_period);
        let last = prices[prices.len() - 1];
        if last > ma && rsi < overbought {
            return Ok(Signal::Buy);
        }
        if last < ma && rsi > oversold {
            return Ok(Signal::Sell);
        }
        Ok(Signal::Hold)
    }
}

/// Keep the value held in a token close to a target share of the portfolio.
#[derive(Debug, Default, Clone, Copy)]
pub struct PortfolioBalancer;

const DEFAULT_TARGET_SHARE: f64 = 0.5;
const DEFAULT_TOLERANCE: f64 = 0.05;

impl Strategy for PortfolioBalancer {
    fn name(&self) -> &str {
        "portfolio_balancer"
    }

    fn manifest(&self) -> Value {
        json!({
            "name": self.name(),
            "version": "0.1.0",
            "signals": ["buy", "sell", "hold"],
            "defaults": {
                "target_share": DEFAULT_TARGET_SHARE,
                "tolerance": DEFAULT_TOLERANCE,
            },
        })
    }

    fn run(&self, input: &StrategyInput) -> Result<Signal, StrategyError> {
        let target = input.kwarg_f64("target_share", DEFAULT_TARGET_SHARE)?;
        let tolerance = input.kwarg_f64("tolerance", DEFAULT_TOLERANCE)?;
        let price = *input.prices.last().ok_or(StrategyError::InsufficientData {
            needed: 1,
            found: 0,
        })?;
        let native_price = input
            .native_price
            .ok_or_else(|| StrategyError::MissingArgument("native_price".to_string()))?;

        let token_value = input.token_balance as f64 * price;
        let total = token_value + input.native_balance as f64 * native_price;
        if total <= 0.0 {
            return Ok(Signal::Hold);
        }
        let share = token_value / total;
        if share < target - tolerance {
            Ok(Signal::Buy)
        } else if share > target + tolerance {
            Ok(Signal::Sell)
        } else {
            Ok(Signal::Hold)
        }
    }
}
