// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::round::RoundSpec;

const REGISTRATION: RoundId = RoundId("RegistrationRound");
const FINISHED_REGISTRATION: RoundId = RoundId("FinishedRegistrationRound");
const FETCH: RoundId = RoundId("FetchRound");
const FINISHED_FETCH: RoundId = RoundId("FinishedFetchRound");
const RESET: RoundId = RoundId("ResetRound");
const FINISHED_RESET: RoundId = RoundId("FinishedResetRound");

fn registration() -> AbciApp {
    AbciApp::builder("RegistrationAbciApp", REGISTRATION)
        .round(RoundSpec::different_until_all(REGISTRATION))
        .final_round(FINISHED_REGISTRATION, &["participants"])
        .transition(REGISTRATION, Event::DONE, FINISHED_REGISTRATION)
        .persisted_keys(&["participants"])
        .build()
        .unwrap()
}

fn fetch(timeout: Duration) -> AbciApp {
    AbciApp::builder("FetchAbciApp", FETCH)
        .round(RoundSpec::different_until_all(FETCH))
        .final_round(FINISHED_FETCH, &["data_hash"])
        .transition(FETCH, Event::DONE, FINISHED_FETCH)
        .transition(FETCH, Event::ROUND_TIMEOUT, FETCH)
        .timeout(Event::ROUND_TIMEOUT, timeout)
        .pre_conditions(FETCH, &["participants"])
        .build()
        .unwrap()
}

fn reset() -> AbciApp {
    AbciApp::builder("ResetAbciApp", RESET)
        .round(RoundSpec::different_until_all(RESET).starting_new_period())
        .final_round(FINISHED_RESET, &[])
        .transition(RESET, Event::DONE, FINISHED_RESET)
        .build()
        .unwrap()
}

fn mapping(pairs: &[(RoundId, RoundId)]) -> AbciAppTransitionMapping {
    pairs.iter().copied().collect()
}

fn reason(error: AbciError) -> String {
    match error {
        AbciError::InvalidApp { reason, .. } => reason,
        other => panic!("unexpected error {:?}", other),
    }
}

#[test]
fn test_chain_redirects_final_states() {
    let app = chain(
        "ServiceAbciApp",
        vec![registration(), fetch(Duration(30_000)), reset()],
        &mapping(&[
            (FINISHED_REGISTRATION, FETCH),
            (FINISHED_FETCH, RESET),
            (FINISHED_RESET, FETCH),
        ]),
    )
    .unwrap();
    assert_eq!(app.name(), "ServiceAbciApp");
    assert_eq!(app.initial_round(), REGISTRATION);
    assert_eq!(app.next_round(REGISTRATION, Event::DONE).unwrap(), FETCH);
    assert_eq!(app.next_round(FETCH, Event::DONE).unwrap(), RESET);
    assert_eq!(app.next_round(RESET, Event::DONE).unwrap(), FETCH);
    assert!(app.round_spec(FINISHED_FETCH).is_none());
    assert!(app.final_states().is_empty());
    assert!(!app.initial_states().contains(&FETCH));
    assert!(app.cross_period_persisted_keys().contains("participants"));
    assert_eq!(
        app.timeouts(FETCH),
        vec![(Event::ROUND_TIMEOUT, Duration(30_000))]
    );
}

#[test]
fn test_unmapped_final_states_are_kept() {
    let app = chain(
        "Partial",
        vec![registration(), fetch(Duration(10))],
        &mapping(&[(FINISHED_REGISTRATION, FETCH)]),
    )
    .unwrap();
    assert!(app.is_final(FINISHED_FETCH));
    assert!(app
        .db_post_conditions(FINISHED_FETCH)
        .contains("data_hash"));
    assert_eq!(
        app.reachable_final_states(REGISTRATION),
        vec![FINISHED_FETCH].into_iter().collect::<BTreeSet<_>>()
    );
}

#[test]
fn test_missing_pre_condition() {
    // Entering FETCH straight from RESET at startup does not provide "participants".
    let error = chain(
        "Unordered",
        vec![reset(), fetch(Duration(10))],
        &mapping(&[(FINISHED_RESET, FETCH)]),
    )
    .unwrap_err();
    assert!(reason(error).contains("participants"));
}

#[test]
fn test_period_reset_keeps_persisted_keys() {
    chain(
        "Persisted",
        vec![registration(), reset(), fetch(Duration(10))],
        &mapping(&[(FINISHED_REGISTRATION, RESET), (FINISHED_RESET, FETCH)]),
    )
    .unwrap();

    let transient = AbciApp::builder("TransientAbciApp", REGISTRATION)
        .round(RoundSpec::different_until_all(REGISTRATION))
        .final_round(FINISHED_REGISTRATION, &["participants"])
        .transition(REGISTRATION, Event::DONE, FINISHED_REGISTRATION)
        .build()
        .unwrap();
    let error = chain(
        "Transient",
        vec![transient, reset(), fetch(Duration(10))],
        &mapping(&[(FINISHED_REGISTRATION, RESET), (FINISHED_RESET, FETCH)]),
    )
    .unwrap_err();
    assert!(reason(error).contains("participants"));
}

#[test]
fn test_invalid_mappings() {
    let error = chain(
        "NotFinal",
        vec![registration(), fetch(Duration(10))],
        &mapping(&[(REGISTRATION, FETCH)]),
    )
    .unwrap_err();
    assert!(reason(error).contains("not a final state"));

    let error = chain(
        "NotInitial",
        vec![registration(), fetch(Duration(10))],
        &mapping(&[(FINISHED_REGISTRATION, FINISHED_FETCH)]),
    )
    .unwrap_err();
    assert!(reason(error).contains("not an initial state"));

    let error = chain("Empty", Vec::new(), &mapping(&[])).unwrap_err();
    assert!(reason(error).contains("nothing to chain"));
}

#[test]
fn test_conflicts() {
    let error = chain(
        "Twice",
        vec![registration(), registration()],
        &mapping(&[]),
    )
    .unwrap_err();
    assert!(reason(error).contains("defined by both"));

    let other = AbciApp::builder("OtherFetchAbciApp", RESET)
        .round(RoundSpec::different_until_all(RESET))
        .final_round(FINISHED_RESET, &[])
        .transition(RESET, Event::DONE, FINISHED_RESET)
        .transition(RESET, Event::ROUND_TIMEOUT, RESET)
        .timeout(Event::ROUND_TIMEOUT, Duration(20))
        .build()
        .unwrap();
    let error = chain(
        "Timeouts",
        vec![registration(), fetch(Duration(10)), other],
        &mapping(&[(FINISHED_REGISTRATION, FETCH), (FINISHED_FETCH, RESET)]),
    )
    .unwrap_err();
    assert!(reason(error).contains("conflicting durations"));
}
