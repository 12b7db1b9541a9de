// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::{
    base_types::RoundCount,
    payload::{Attribute, AttributeKind},
};
use serde_json::json;

const FETCH: RoundId = RoundId("FetchRound");

fn participants(n: usize) -> ParticipantSet {
    ParticipantSet::new((0..n).map(|i| Participant(format!("agent_{}", i))))
}

fn agent(i: usize) -> Participant {
    Participant(format!("agent_{}", i))
}

fn payload(i: usize, values: Vec<Value>) -> Payload {
    Payload::new(agent(i), RoundCount(0), values)
}

fn hash_round(n: usize) -> Round {
    let spec = RoundSpec::same_until_threshold(FETCH)
        .with_schema(PayloadSchema::new(vec![Attribute::optional(
            "data_hash",
            AttributeKind::String,
        )]))
        .with_selection_keys(&["data_hash"])
        .with_collection_key("participant_to_data");
    Round::new(
        Arc::new(spec),
        SynchronizedData::default(),
        participants(n),
        0,
    )
}

fn submit(round: &mut Round, payload: Payload) {
    round.check_payload(&payload).unwrap();
    round.process_payload(payload);
}

#[test]
fn test_quorum_of_identical_hashes() {
    let mut round = hash_round(4);
    submit(&mut round, payload(0, vec![json!("Qm123")]));
    submit(&mut round, payload(1, vec![json!("Qm123")]));
    assert!(round.end_block().is_none());
    submit(&mut round, payload(2, vec![json!("Qm123")]));
    let (data, event) = round.end_block().unwrap();
    assert_eq!(event, Event::DONE);
    assert_eq!(data.get_strict_str("data_hash").unwrap(), "Qm123");
    assert_eq!(
        data.get_strict("participant_to_data").unwrap(),
        &json!({"agent_0": ["Qm123"], "agent_1": ["Qm123"], "agent_2": ["Qm123"]})
    );

    // A late conflicting payload does not change the decision.
    submit(&mut round, payload(3, vec![json!("QmXYZ")]));
    let (data, event) = round.end_block().unwrap();
    assert_eq!(event, Event::DONE);
    assert_eq!(data.get_strict_str("data_hash").unwrap(), "Qm123");
}

#[test]
fn test_decision_does_not_depend_on_arrival_order() {
    let payloads = vec![
        payload(0, vec![json!("Qm123")]),
        payload(1, vec![json!("QmXYZ")]),
        payload(2, vec![json!("Qm123")]),
        payload(3, vec![json!("Qm123")]),
    ];
    let orders: Vec<Vec<usize>> = vec![
        vec![0, 1, 2, 3],
        vec![3, 2, 1, 0],
        vec![1, 3, 0, 2],
        vec![2, 0, 3, 1],
    ];
    let mut outcomes = Vec::new();
    for order in orders {
        let mut round = hash_round(4);
        for index in order {
            submit(&mut round, payloads[index].clone());
        }
        let (data, event) = round.end_block().unwrap();
        outcomes.push((data.digest().unwrap(), event));
    }
    outcomes.dedup();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].1, Event::DONE);
}

#[test]
fn test_no_majority_early_exit() {
    let mut round = hash_round(4);
    submit(&mut round, payload(0, vec![json!("a")]));
    submit(&mut round, payload(1, vec![json!("b")]));
    assert!(round.end_block().is_none());
    submit(&mut round, payload(2, vec![json!("c")]));
    let (data, event) = round.end_block().unwrap();
    assert_eq!(event, Event::NO_MAJORITY);
    assert!(data.get("data_hash").is_none());
}

#[test]
fn test_idempotent_resubmission() {
    let mut round = hash_round(4);
    submit(&mut round, payload(0, vec![json!("a")]));
    submit(&mut round, payload(0, vec![json!("b")]));
    assert_eq!(round.collection().count(), 1);
    assert_eq!(
        round.collection().get(&agent(0)).unwrap().values,
        vec![json!("b")]
    );
}

#[test]
fn test_null_majority_is_none_event() {
    let mut round = hash_round(4);
    for i in 0..3 {
        submit(&mut round, payload(i, vec![Value::Null]));
    }
    let (data, event) = round.end_block().unwrap();
    assert_eq!(event, Event::NONE);
    assert_eq!(data.version(), 0);
}

#[test]
fn test_check_payload_rejections() {
    let round = hash_round(4);
    let stranger = Payload::new(Participant::new("mallory"), RoundCount(0), vec![json!("a")]);
    let error = round.check_payload(&stranger).unwrap_err();
    assert!(matches!(error, AbciError::UnknownSender { .. }));
    assert!(error.is_payload_validation());

    let wrong_arity = payload(0, vec![json!("a"), json!("b")]);
    assert!(matches!(
        round.check_payload(&wrong_arity),
        Err(AbciError::MalformedPayload { .. })
    ));
    let wrong_type = payload(0, vec![json!(42)]);
    assert!(matches!(
        round.check_payload(&wrong_type),
        Err(AbciError::MalformedPayload { .. })
    ));

    let final_round = Round::new(
        Arc::new(RoundSpec::degenerate(RoundId("FinishedRound"))),
        SynchronizedData::default(),
        participants(4),
        0,
    );
    assert!(matches!(
        final_round.check_payload(&payload(0, Vec::new())),
        Err(AbciError::FinalRound(_))
    ));
    assert!(final_round.end_block().is_none());
}

#[test]
fn test_different_until_all() {
    let spec = RoundSpec::different_until_all(RoundId("RegistrationRound"))
        .with_schema(PayloadSchema::new(vec![Attribute::required(
            "address",
            AttributeKind::String,
        )]))
        .with_collection_key("participants");
    let mut round = Round::new(
        Arc::new(spec),
        SynchronizedData::default(),
        participants(3),
        0,
    );
    submit(&mut round, payload(0, vec![json!("agent_0")]));
    let duplicate = payload(1, vec![json!("agent_0")]);
    assert!(matches!(
        round.check_payload(&duplicate),
        Err(AbciError::DuplicateValue { .. })
    ));
    // Resending one's own value is fine.
    submit(&mut round, payload(0, vec![json!("agent_0")]));
    submit(&mut round, payload(1, vec![json!("agent_1")]));
    assert!(round.end_block().is_none());
    submit(&mut round, payload(2, vec![json!("agent_2")]));
    let (data, event) = round.end_block().unwrap();
    assert_eq!(event, Event::DONE);
    assert_eq!(
        data.get_strict("participants").unwrap(),
        &json!({"agent_0": ["agent_0"], "agent_1": ["agent_1"], "agent_2": ["agent_2"]})
    );
}

#[test]
fn test_different_until_threshold() {
    let spec = RoundSpec::different_until_threshold(RoundId("CollectRound"))
        .with_schema(PayloadSchema::new(vec![Attribute::required(
            "value",
            AttributeKind::Integer,
        )]));
    let mut round = Round::new(
        Arc::new(spec),
        SynchronizedData::default(),
        participants(4),
        0,
    );
    submit(&mut round, payload(0, vec![json!(1)]));
    submit(&mut round, payload(1, vec![json!(2)]));
    assert!(round.end_block().is_none());
    submit(&mut round, payload(2, vec![json!(3)]));
    assert_eq!(round.end_block().unwrap().1, Event::DONE);
}

fn voting_round(no_majority: Option<Event>) -> Round {
    let mut spec = RoundSpec::voting(RoundId("BacktestRound"))
        .with_done_event(Event("backtest_positive"))
        .with_negative_event(Event("backtest_negative"))
        .with_none_event(Event("backtest_failed"))
        .with_collection_key("participant_to_backtest");
    if let Some(event) = no_majority {
        spec = spec.with_no_majority_event(event);
    }
    Round::new(
        Arc::new(spec),
        SynchronizedData::default(),
        participants(4),
        0,
    )
}

#[test]
fn test_voting_outcomes() {
    let mut round = voting_round(None);
    for i in 0..3 {
        submit(&mut round, payload(i, vec![json!(true)]));
    }
    let (data, event) = round.end_block().unwrap();
    assert_eq!(event, Event("backtest_positive"));
    assert!(data.contains("participant_to_backtest"));

    let mut round = voting_round(None);
    for i in 0..3 {
        submit(&mut round, payload(i, vec![json!(false)]));
    }
    assert_eq!(round.end_block().unwrap().1, Event("backtest_negative"));

    let mut round = voting_round(None);
    for i in 0..3 {
        submit(&mut round, payload(i, vec![Value::Null]));
    }
    assert_eq!(round.end_block().unwrap().1, Event("backtest_failed"));
}

#[test]
fn test_voting_without_possible_majority() {
    let votes = vec![json!(true), json!(false), Value::Null];

    let mut round = voting_round(None);
    for (i, vote) in votes.iter().enumerate() {
        submit(&mut round, payload(i, vec![vote.clone()]));
    }
    assert_eq!(round.end_block().unwrap().1, Event("backtest_failed"));

    let mut round = voting_round(Some(Event::NO_MAJORITY));
    for (i, vote) in votes.into_iter().enumerate() {
        submit(&mut round, payload(i, vec![vote]));
    }
    assert_eq!(round.end_block().unwrap().1, Event::NO_MAJORITY);
    assert!(round
        .spec()
        .emitted_events()
        .contains(&Event::NO_MAJORITY));
}

#[test]
fn test_only_keeper_sends() {
    let spec = RoundSpec::only_keeper_sends(RoundId("KeeperRound"))
        .with_schema(PayloadSchema::new(vec![Attribute::optional(
            "tx",
            AttributeKind::String,
        )]))
        .with_selection_keys(&["tx"]);
    let spec = Arc::new(spec);
    let mut round = Round::new(spec.clone(), SynchronizedData::default(), participants(4), 7);
    let keeper = round.keeper().cloned().unwrap();
    assert_eq!(participants(4).pick_keeper(7), Some(keeper.clone()));

    let other = (0..4).map(agent).find(|p| *p != keeper).unwrap();
    let rejected = Payload::new(other, RoundCount(0), vec![json!("0xabc")]);
    assert!(matches!(
        round.check_payload(&rejected),
        Err(AbciError::NotKeeper { .. })
    ));
    assert!(round.end_block().is_none());

    let accepted = Payload::new(keeper.clone(), RoundCount(0), vec![json!("0xabc")]);
    submit(&mut round, accepted);
    let (data, event) = round.end_block().unwrap();
    assert_eq!(event, Event::DONE);
    assert_eq!(data.get_strict_str("tx").unwrap(), "0xabc");

    let mut round = Round::new(spec, SynchronizedData::default(), participants(4), 7);
    submit(&mut round, Payload::new(keeper, RoundCount(0), vec![Value::Null]));
    assert_eq!(round.end_block().unwrap().1, Event::NONE);
}

fn refine_orders(data: &SynchronizedData, event: Event) -> Event {
    match data.get("orders_hash") {
        Some(Value::Null) | None => Event("no_orders"),
        Some(_) => event,
    }
}

#[test]
fn test_refinement_and_emitted_events() {
    let spec = RoundSpec::same_until_threshold(RoundId("StrategyExecRound"))
        .with_schema(PayloadSchema::new(vec![
            Attribute::optional("orders_hash", AttributeKind::String),
            Attribute::optional("incomplete", AttributeKind::Bool),
        ]))
        .with_selection_keys(&["orders_hash", "incomplete"])
        .with_refinement(&[Event("prepare_swap"), Event("no_orders")], refine_orders)
        .with_done_event(Event("prepare_swap"));
    let events = spec.emitted_events();
    assert_eq!(
        events.into_iter().collect::<Vec<_>>(),
        vec![
            Event("no_majority"),
            Event("no_orders"),
            Event("none"),
            Event("prepare_swap")
        ]
    );
    let spec = Arc::new(spec);

    let mut round = Round::new(spec.clone(), SynchronizedData::default(), participants(1), 0);
    submit(&mut round, payload(0, vec![Value::Null, json!(false)]));
    assert_eq!(round.end_block().unwrap().1, Event("no_orders"));

    let mut round = Round::new(spec, SynchronizedData::default(), participants(1), 0);
    submit(&mut round, payload(0, vec![json!("Qm1"), json!(false)]));
    assert_eq!(round.end_block().unwrap().1, Event("prepare_swap"));
}

#[test]
fn test_new_period() {
    let spec = RoundSpec::same_until_threshold(RoundId("ResetAndPauseRound"))
        .with_schema(PayloadSchema::new(vec![Attribute::required(
            "period_count",
            AttributeKind::Integer,
        )]))
        .starting_new_period();
    let initial = SynchronizedData::new(vec!["kept".to_string()].into_iter().collect())
        .update(vec![("kept", json!(1)), ("dropped", json!(2))]);
    let mut round = Round::new(Arc::new(spec), initial, participants(1), 0);
    submit(&mut round, payload(0, vec![json!(1)]));
    let (data, event) = round.end_block().unwrap();
    assert_eq!(event, Event::DONE);
    assert_eq!(data.period_count(), 1);
    assert!(data.contains("kept"));
    assert!(!data.contains("dropped"));
}
