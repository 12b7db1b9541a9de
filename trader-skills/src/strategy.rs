// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use abci_lib::content_store::content_hash;
use log::{debug, error};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{
    any::Any,
    collections::BTreeMap,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};
use thiserror::Error;

#[cfg(test)]
#[path = "unit_tests/strategy_tests.rs"]
mod strategy_tests;

/// Trading decision for one token.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

/// Outcome of replaying a strategy over past prices.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Return of following the signals, relative to the starting value.
    pub total_return: f64,
    pub trades: usize,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StrategyError {
    #[error("Unknown strategy {0:?}")]
    UnknownStrategy(String),

    #[error("Strategy {name:?} has manifest hash {found} but {expected:?} was expected")]
    UnverifiedStrategy {
        name: String,
        expected: Option<String>,
        found: String,
    },

    #[error("Strategy {0:?} is registered twice")]
    DuplicateStrategy(String),

    #[error("Required argument {0:?} was not provided")]
    MissingArgument(String),

    #[error("Argument {name:?} is invalid: {value}")]
    InvalidArgument { name: String, value: Value },

    #[error("Not enough data: {needed} points needed, {found} available")]
    InsufficientData { needed: usize, found: usize },

    #[error("Strategy panicked: {0}")]
    Panicked(String),
}

/// Everything a strategy may look at to decide on one token.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyInput {
    /// Mint address of the token.
    pub token: String,
    pub prices: Vec<f64>,
    pub volumes: Vec<f64>,
    /// Balance of the token, in base units.
    pub token_balance: u64,
    /// Balance of the native token, in base units.
    pub native_balance: u64,
    /// Last price of the native token, if known.
    pub native_price: Option<f64>,
    pub kwargs: BTreeMap<String, Value>,
}

impl StrategyInput {
    pub fn kwarg_usize(&self, name: &str, default: usize) -> Result<usize, StrategyError> {
        match self.kwargs.get(name) {
            None => Ok(default),
            Some(value) => value
                .as_u64()
                .filter(|n| *n > 0)
                .map(|n| n as usize)
                .ok_or_else(|| StrategyError::InvalidArgument {
                    name: name.to_string(),
                    value: value.clone(),
                }),
        }
    }

    pub fn kwarg_f64(&self, name: &str, default: f64) -> Result<f64, StrategyError> {
        match self.kwargs.get(name) {
            None => Ok(default),
            Some(value) => value
                .as_f64()
                .ok_or_else(|| StrategyError::InvalidArgument {
                    name: name.to_string(),
                    value: value.clone(),
                }),
        }
    }

    /// The same input, restricted to the first `len` data points.
    pub fn truncated(&self, len: usize) -> StrategyInput {
        let mut input = self.clone();
        input.prices.truncate(len);
        input.volumes.truncate(len);
        input
    }
}

/// A trading strategy, selected at runtime by name and identified by the content hash of
/// its manifest.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    /// Canonical description of the strategy: name, version and default arguments.
    fn manifest(&self) -> Value;

    fn run(&self, input: &StrategyInput) -> Result<Signal, StrategyError>;

    /// Replay the strategy over the price history: hold the token after a buy signal, the
    /// native token after a sell signal.
    fn evaluate(&self, input: &StrategyInput) -> Result<Evaluation, StrategyError> {
        let mut holding = false;
        let mut value = 1.0;
        let mut trades = 0;
        let mut decided = false;
        for len in 1..input.prices.len() {
            if holding && input.prices[len - 1] > 0.0 {
                value *= input.prices[len] / input.prices[len - 1];
            }
            let signal = match self.run(&input.truncated(len + 1)) {
                Ok(signal) => signal,
                Err(StrategyError::InsufficientData { .. }) => continue,
                Err(e) => return Err(e),
            };
            decided = true;
            let next = match signal {
                Signal::Buy => true,
                Signal::Sell => false,
                Signal::Hold => holding,
            };
            if next != holding {
                trades += 1;
                holding = next;
            }
        }
        if !decided {
            return Err(StrategyError::InsufficientData {
                needed: input.prices.len() + 1,
                found: input.prices.len(),
            });
        }
        Ok(Evaluation {
            total_return: value - 1.0,
            trades,
        })
    }
}

/// The strategies an agent may execute. Strategies are only handed out once their
/// manifest matches the hash configured for them.
#[derive(Default)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Arc<dyn Strategy>>,
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.strategies.keys()).finish()
    }
}

/// Content hash identifying a strategy.
pub fn manifest_hash(strategy: &dyn Strategy) -> String {
    content_hash(strategy.manifest().to_string().as_bytes())
}

impl StrategyRegistry {
    pub fn new() -> Self {
        StrategyRegistry::default()
    }

    /// Registry holding the strategies shipped with the service.
    pub fn with_builtins() -> Self {
        let mut registry = StrategyRegistry::new();
        for strategy in crate::strategies::builtins() {
            let name = strategy.name().to_string();
            registry.strategies.insert(name, strategy);
        }
        registry
    }

    pub fn register(&mut self, strategy: Arc<dyn Strategy>) -> Result<(), StrategyError> {
        let name = strategy.name().to_string();
        if self.strategies.contains_key(&name) {
            return Err(StrategyError::DuplicateStrategy(name));
        }
        self.strategies.insert(name, strategy);
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }

    pub fn manifest_hashes(&self) -> BTreeMap<String, String> {
        self.strategies
            .iter()
            .map(|(name, strategy)| (name.clone(), manifest_hash(strategy.as_ref())))
            .collect()
    }

    /// Return the strategy `name` if its manifest hash is `expected_hash`.
    pub fn load(
        &self,
        name: &str,
        expected_hash: Option<&str>,
    ) -> Result<Arc<dyn Strategy>, StrategyError> {
        let strategy = self
            .strategies
            .get(name)
            .ok_or_else(|| StrategyError::UnknownStrategy(name.to_string()))?;
        let found = manifest_hash(strategy.as_ref());
        if expected_hash != Some(found.as_str()) {
            return Err(StrategyError::UnverifiedStrategy {
                name: name.to_string(),
                expected: expected_hash.map(str::to_string),
                found,
            });
        }
        debug!("Loaded strategy {} ({})", name, found);
        Ok(strategy.clone())
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return message.to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}

/// Run a strategy, turning panics into errors.
pub fn run_guarded(strategy: &dyn Strategy, input: &StrategyInput) -> Result<Signal, StrategyError> {
    match panic::catch_unwind(AssertUnwindSafe(|| strategy.run(input))) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload);
            error!("Strategy {} panicked on {}: {}", strategy.name(), input.token, message);
            Err(StrategyError::Panicked(message))
        }
    }
}

/// Evaluate a strategy, turning panics into errors.
pub fn evaluate_guarded(
    strategy: &dyn Strategy,
    input: &StrategyInput,
) -> Result<Evaluation, StrategyError> {
    match panic::catch_unwind(AssertUnwindSafe(|| strategy.evaluate(input))) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload);
            error!(
                "Strategy {} panicked while evaluating {}: {}",
                strategy.name(),
                input.token,
                message
            );
            Err(StrategyError::Panicked(message))
        }
    }
}
