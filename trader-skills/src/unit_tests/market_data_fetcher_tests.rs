// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::{
    simulated_context::SimulatedMarket,
    test_utils::{context, data, Fixture},
};
use futures::executor::block_on;
use std::collections::BTreeSet;

#[test]
fn test_chart_parsing() {
    let chart = json!({
        "prices": [[1, 10.0], [2, 11.5]],
        "market_caps": [],
        "total_volumes": [[1, 100.0], [2, 90.0]],
    });
    assert_eq!(
        TokenMarketData::from_chart(&chart),
        Some(TokenMarketData {
            prices: vec![10.0, 11.5],
            volumes: vec![100.0, 90.0],
        })
    );

    assert_eq!(
        TokenMarketData::from_chart(&json!({"prices": [], "total_volumes": []})),
        None
    );
    assert_eq!(
        TokenMarketData::from_chart(&json!({"prices": [[1, "x"]], "total_volumes": []})),
        None
    );
    assert_eq!(TokenMarketData::from_chart(&json!({"prices": [[1, 2.0]]})), None);
}

#[test]
fn test_fetch_then_verify() {
    let mut context = context(SimulatedMarket::new(7));
    let fixture = Fixture::new();
    let empty = data(vec![]);

    let values = block_on(
        FetchMarketDataBehaviour.local_act(
            &mut context,
            fixture.view(FETCH_MARKET_DATA_ROUND, &empty),
        ),
    )
    .unwrap();
    let hash = values[0].as_str().unwrap().to_string();

    let market = block_on(context.load(&hash)).unwrap();
    for token in &context.params.market_data.token_symbol_whitelist {
        let token_data = TokenMarketData::from_chart(&market[&token.address]).unwrap();
        assert_eq!(token_data.prices.len(), 96);
    }

    let fetched = data(vec![(DATA_HASH, Value::from(hash))]);
    let vote = block_on(
        VerifyMarketDataBehaviour.local_act(
            &mut context,
            fixture.view(VERIFY_MARKET_DATA_ROUND, &fetched),
        ),
    );
    assert_eq!(vote, Some(vec![Value::Bool(true)]));
}

#[test]
fn test_fetch_failure_sends_null() {
    let mut context = context(SimulatedMarket::new(7).with_failure_every(1));
    let fixture = Fixture::new();
    let empty = data(vec![]);
    let values = block_on(
        FetchMarketDataBehaviour.local_act(
            &mut context,
            fixture.view(FETCH_MARKET_DATA_ROUND, &empty),
        ),
    );
    assert_eq!(values, Some(vec![Value::Null]));
}

#[test]
fn test_verify_rejects_incomplete_data() {
    let mut context = context(SimulatedMarket::new(7));
    let fixture = Fixture::new();
    let whitelist = context.params.market_data.token_symbol_whitelist.clone();
    let mut market = Map::new();
    market.insert(
        whitelist[0].address.clone(),
        json!({"prices": [[1, 1.0]], "total_volumes": [[1, 1.0]]}),
    );
    let hash = block_on(context.save(&Value::Object(market))).unwrap();

    let stored = data(vec![(DATA_HASH, Value::from(hash))]);
    let vote = block_on(
        VerifyMarketDataBehaviour.local_act(
            &mut context,
            fixture.view(VERIFY_MARKET_DATA_ROUND, &stored),
        ),
    );
    assert_eq!(vote, Some(vec![Value::Bool(false)]));

    let unknown = data(vec![(DATA_HASH, Value::from("unknown"))]);
    let vote = block_on(
        VerifyMarketDataBehaviour.local_act(
            &mut context,
            fixture.view(VERIFY_MARKET_DATA_ROUND, &unknown),
        ),
    );
    assert_eq!(vote, Some(vec![Value::Null]));
}

#[test]
fn test_app_transitions() {
    let app = market_data_fetcher_app(Duration(1_000)).unwrap();
    assert_eq!(
        app.next_round(FETCH_MARKET_DATA_ROUND, Event::NO_MAJORITY).unwrap(),
        FETCH_MARKET_DATA_ROUND
    );
    assert_eq!(
        app.next_round(VERIFY_MARKET_DATA_ROUND, Event::NONE).unwrap(),
        FAILED_MARKET_FETCH_ROUND
    );
    let expected: BTreeSet<String> = vec![DATA_HASH, PARTICIPANT_TO_VERIFICATION]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(app.db_post_conditions(FINISHED_MARKET_FETCH_ROUND), expected);
}
