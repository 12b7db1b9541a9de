// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use super::*;
use std::collections::BTreeMap;

fn trend_input(prices: Vec<f64>) -> StrategyInput {
    trend_input_with(prices, 5, 5)
}

fn trend_input_with(prices: Vec<f64>, ma_period: usize, rsi_period: usize) -> StrategyInput {
    let mut kwargs = BTreeMap::new();
    kwargs.insert("ma_period".to_string(), json!(ma_period));
    kwargs.insert("rsi_period".to_string(), json!(rsi_period));
    StrategyInput {
        token: "token".to_string(),
        volumes: vec![1.0; prices.len()],
        prices,
        kwargs,
        ..StrategyInput::default()
    }
}

#[test]
fn test_trend_following_needs_enough_prices() {
    assert_eq!(
        TrendFollowing.run(&trend_input(vec![1.0; 5])),
        Err(StrategyError::InsufficientData {
            needed: 6,
            found: 5
        })
    );
}

#[test]
fn test_trend_following_signals() {
    // Mostly rising with a dip: above average, RSI below the overbought threshold.
    let rising = vec![10.0, 11.0, 10.0, 11.0, 10.0, 12.0];
    assert_eq!(TrendFollowing.run(&trend_input(rising)), Ok(Signal::Buy));

    // Steadily falling: below average, RSI at 0 is oversold.
    let falling = vec![12.0, 11.0, 10.0, 9.0, 8.0, 7.0];
    assert_eq!(
        TrendFollowing.run(&trend_input(falling.clone())),
        Ok(Signal::Hold)
    );

    // Falling with a bounce: below average, RSI above the oversold threshold.
    let bouncing = vec![12.0, 11.0, 12.0, 10.0, 11.5, 10.0];
    assert_eq!(TrendFollowing.run(&trend_input(bouncing)), Ok(Signal::Sell));

    // Steadily rising: RSI at 100 is overbought.
    let mut steep: Vec<f64> = falling;
    steep.reverse();
    assert_eq!(TrendFollowing.run(&trend_input(steep)), Ok(Signal::Hold));
}

#[test]
fn test_rsi_uses_the_trailing_window() {
    let prices = [100.0, 50.0, 25.0, 12.0, 6.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    assert_eq!(TrendFollowing::rsi(&prices, 5), 100.0);
    // One loss of 5 against five gains of 1.
    let rsi = TrendFollowing::rsi(&prices, 6);
    assert!((rsi - 100.0 * 5.0 / 10.0).abs() < 1e-9);
    assert!(TrendFollowing::rsi(&prices, 10) < 10.0);
}

#[test]
fn test_trend_following_on_long_histories() {
    // A crash followed by a steady recovery: the last 5 changes are all gains.
    let recovering = vec![100.0, 50.0, 25.0, 12.0, 6.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    assert_eq!(
        TrendFollowing.run(&trend_input(recovering.clone())),
        Ok(Signal::Hold)
    );
    // Over the whole history the RSI is low, and the price is above its short average.
    assert_eq!(
        TrendFollowing.run(&trend_input_with(recovering.clone(), 3, 10)),
        Ok(Signal::Buy)
    );
    // The long average is far above the last price, but the RSI is not above oversold.
    assert_eq!(
        TrendFollowing.run(&trend_input_with(recovering, 11, 10)),
        Ok(Signal::Hold)
    );

    // Different periods need different history lengths.
    assert_eq!(
        TrendFollowing.run(&trend_input_with(vec![1.0; 8], 9, 3)),
        Err(StrategyError::InsufficientData {
            needed: 9,
            found: 8
        })
    );
    assert_eq!(
        TrendFollowing.run(&trend_input_with(vec![1.0; 8], 3, 8)),
        Err(StrategyError::InsufficientData {
            needed: 9,
            found: 8
        })
    );
}

#[test]
fn test_trend_following_rejects_bad_arguments() {
    let mut input = trend_input(vec![1.0; 30]);
    input.kwargs.insert("ma_period".to_string(), json!(-3));
    assert!(matches!(
        TrendFollowing.run(&input),
        Err(StrategyError::InvalidArgument { .. })
    ));
}

fn balancer_input(token_balance: u64, native_balance: u64) -> StrategyInput {
    StrategyInput {
        token: "token".to_string(),
        prices: vec![2.0],
        volumes: vec![1.0],
        token_balance,
        native_balance,
        native_price: Some(1.0),
        ..StrategyInput::default()
    }
}

#[test]
fn test_portfolio_balancer_signals() {
    assert_eq!(PortfolioBalancer.run(&balancer_input(10, 100)), Ok(Signal::Buy));
    assert_eq!(PortfolioBalancer.run(&balancer_input(100, 10)), Ok(Signal::Sell));
    assert_eq!(PortfolioBalancer.run(&balancer_input(50, 100)), Ok(Signal::Hold));
    assert_eq!(PortfolioBalancer.run(&balancer_input(0, 0)), Ok(Signal::Hold));

    let mut input = balancer_input(10, 100);
    input.kwargs.insert("target_share".to_string(), json!(0.1));
    assert_eq!(PortfolioBalancer.run(&input), Ok(Signal::Sell));
}

#[test]
fn test_portfolio_balancer_needs_the_native_price() {
    let mut input = balancer_input(10, 100);
    input.native_price = None;
    assert_eq!(
        PortfolioBalancer.run(&input),
        Err(StrategyError::MissingArgument("native_price".to_string()))
    );
    input.prices.clear();
    assert!(matches!(
        PortfolioBalancer.run(&input),
        Err(StrategyError::InsufficientData { .. })
    ));
}

#[test]
fn test_builtin_manifests_are_distinct() {
    let names: Vec<_> = builtins()
        .iter()
        .map(|strategy| strategy.manifest()["name"].clone())
        .collect();
    assert_eq!(names, vec![json!("trend_following"), json!("portfolio_balancer")]);
}
