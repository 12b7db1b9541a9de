// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::{
    base_types::{Duration, Participant},
    payload::{Attribute, AttributeKind, PayloadSchema},
    round::RoundSpec,
};
use serde_json::{json, Value};

const FETCH: RoundId = RoundId("FetchMarketDataRound");
const FINISHED: RoundId = RoundId("FinishedMarketFetchRound");
const FAILED: RoundId = RoundId("FailedMarketFetchRound");

fn app() -> Arc<AbciApp> {
    let app = AbciApp::builder("MarketDataFetcherAbciApp", FETCH)
        .round(
            RoundSpec::same_until_threshold(FETCH)
                .with_schema(PayloadSchema::new(vec![Attribute::optional(
                    "data_hash",
                    AttributeKind::String,
                )]))
                .with_selection_keys(&["data_hash"]),
        )
        .final_round(FINISHED, &["data_hash"])
        .final_round(FAILED, &[])
        .transition(FETCH, Event::DONE, FINISHED)
        .transition(FETCH, Event::NONE, FAILED)
        .transition(FETCH, Event::NO_MAJORITY, FETCH)
        .transition(FETCH, Event::ROUND_TIMEOUT, FETCH)
        .timeout(Event::ROUND_TIMEOUT, Duration::from_secs_f64(30.0))
        .build()
        .unwrap();
    Arc::new(app)
}

fn participants() -> ParticipantSet {
    ParticipantSet::new(["a", "b", "c", "d"].iter().map(|name| Participant::new(*name)))
}

fn payload(sender: &str, round_count: u64, value: Value) -> Payload {
    Payload::new(
        Participant::new(sender),
        RoundCount(round_count),
        vec![value],
    )
}

fn sequence() -> RoundSequence {
    RoundSequence::new(
        app(),
        participants(),
        SynchronizedData::default(),
        NodeTime(0),
    )
    .unwrap()
}

#[test]
fn test_timeout_fallback() {
    let mut sequence = sequence();
    sequence
        .process_payload(payload("a", 0, json!("Qm123")))
        .unwrap();

    let actions = sequence.update(NodeTime(29_999)).unwrap();
    assert!(actions.transition.is_none());
    assert_eq!(actions.next_scheduled_update, NodeTime(30_000));

    let actions = sequence.update(NodeTime(30_000)).unwrap();
    let transition = actions.transition.unwrap();
    assert_eq!(transition.from, FETCH);
    assert_eq!(transition.event, Event::ROUND_TIMEOUT);
    assert_eq!(transition.to, FETCH);
    assert_eq!(transition.round_count, RoundCount(1));
    // Partial progress is discarded.
    assert_eq!(sequence.current_round().collection().count(), 0);
    assert_eq!(sequence.round_start_time(), NodeTime(30_000));
    assert_eq!(actions.next_scheduled_update, NodeTime(60_000));
}

#[test]
fn test_stale_payloads_are_rejected() {
    let mut sequence = sequence();
    sequence.update(NodeTime(30_000)).unwrap();
    let error = sequence
        .process_payload(payload("a", 0, json!("Qm123")))
        .unwrap_err();
    assert!(matches!(error, AbciError::StaleRound { .. }));
    assert!(error.is_payload_validation());
    sequence
        .process_payload(payload("a", 1, json!("Qm123")))
        .unwrap();
}

#[test]
fn test_resolution_halts_in_final_state() {
    let mut sequence = sequence();
    for sender in &["a", "b", "c"] {
        sequence
            .process_payload(payload(sender, 0, json!("Qm123")))
            .unwrap();
    }
    let actions = sequence.update(NodeTime(10)).unwrap();
    assert_eq!(actions.transition.unwrap().event, Event::DONE);
    assert!(sequence.is_finished());
    assert_eq!(sequence.current_round_id(), FINISHED);
    assert_eq!(actions.next_scheduled_update, NodeTime::never());
    assert_eq!(
        sequence.synchronized_data().get_strict_str("data_hash").unwrap(),
        "Qm123"
    );

    // Final states ignore payloads, time and timeouts.
    assert!(sequence
        .process_payload(payload("d", 1, json!("Qm123")))
        .is_err());
    let actions = sequence.update(NodeTime(1_000_000)).unwrap();
    assert!(actions.transition.is_none());
    assert_eq!(sequence.history().len(), 1);
}

#[test]
fn test_rejected_payload_keeps_collecting() {
    let mut sequence = sequence();
    let error = sequence
        .process_payload(payload("mallory", 0, json!("Qm123")))
        .unwrap_err();
    assert!(matches!(error, AbciError::UnknownSender { .. }));
    let error = sequence
        .process_payload(payload("a", 0, json!(42)))
        .unwrap_err();
    assert!(matches!(error, AbciError::MalformedPayload { .. }));
    assert_eq!(sequence.current_round().collection().count(), 0);

    sequence
        .process_payload(payload("a", 0, Value::Null))
        .unwrap();
    sequence
        .process_payload(payload("b", 0, Value::Null))
        .unwrap();
    assert!(sequence.update(NodeTime(5)).unwrap().transition.is_none());
    sequence
        .process_payload(payload("c", 0, Value::Null))
        .unwrap();
    let transition = sequence.update(NodeTime(6)).unwrap().transition.unwrap();
    assert_eq!(transition.event, Event::NONE);
    assert_eq!(transition.to, FAILED);
}
