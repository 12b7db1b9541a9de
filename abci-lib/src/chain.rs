// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::{
    abci_app::AbciApp,
    base_types::{Duration, Event, RoundId},
    error::{AbciError, AbciResult},
};
use log::debug;
use std::collections::{BTreeMap, BTreeSet};

#[cfg(test)]
#[path = "unit_tests/chain_tests.rs"]
mod chain_tests;

/// Maps final states of chained apps to initial states of other (or the same) apps.
pub type AbciAppTransitionMapping = BTreeMap<RoundId, RoundId>;

/// Glue several apps into a single one. Entering a mapped final state enters the mapped
/// initial state instead. The first app provides the initial round.
pub fn chain<S: Into<String>>(
    name: S,
    apps: Vec<AbciApp>,
    mapping: &AbciAppTransitionMapping,
) -> AbciResult<AbciApp> {
    let name = name.into();
    let invalid = |reason: String| AbciError::InvalidApp {
        app: name.clone(),
        reason,
    };
    ensure!(!apps.is_empty(), invalid("nothing to chain".to_string()));
    let first = &apps[0];

    let mut owners: BTreeMap<RoundId, &str> = BTreeMap::new();
    for app in &apps {
        for spec in app.rounds() {
            if let Some(owner) = owners.insert(spec.id, app.name()) {
                bail!(invalid(format!(
                    "round {} is defined by both {} and {}",
                    spec.id,
                    owner,
                    app.name()
                )));
            }
        }
    }
    let is_final = |round: &RoundId| apps.iter().any(|app| app.is_final(*round));
    let is_initial = |round: &RoundId| apps.iter().any(|app| app.initial_states().contains(round));
    for (from, to) in mapping {
        ensure!(
            is_final(from),
            invalid(format!("mapped round {} is not a final state", from))
        );
        ensure!(
            is_initial(to),
            invalid(format!("mapping target {} is not an initial state", to))
        );
    }

    let mut event_to_timeout: BTreeMap<Event, Duration> = BTreeMap::new();
    for app in &apps {
        for (event, duration) in app.event_to_timeout() {
            if let Some(previous) = event_to_timeout.insert(*event, *duration) {
                ensure!(
                    previous == *duration,
                    invalid(format!(
                        "timeout event {} has conflicting durations {:?} and {:?}",
                        event, previous, duration
                    ))
                );
            }
        }
    }
    let cross_period_persisted_keys: BTreeSet<String> = apps
        .iter()
        .flat_map(|app| app.cross_period_persisted_keys().iter().cloned())
        .collect();

    // Initial states that nothing maps to remain entry points of the composition.
    let targets: BTreeSet<RoundId> = mapping.values().copied().collect();
    let mut initial_states: BTreeSet<RoundId> = first.initial_states().clone();
    for app in apps.iter().skip(1) {
        initial_states.extend(
            app.initial_states()
                .iter()
                .filter(|round| !targets.contains(round))
                .copied(),
        );
    }

    check_data_flow(&apps, mapping, &initial_states, &cross_period_persisted_keys)
        .map_err(invalid)?;

    let redirect = |round: &RoundId| *mapping.get(round).unwrap_or(round);
    let mut chained = AbciApp::empty(name.clone(), first.initial_round());
    for app in &apps {
        for (round, spec) in &app.rounds {
            if mapping.contains_key(round) {
                continue;
            }
            chained.rounds.insert(*round, spec.clone());
        }
        for (round, transitions) in &app.transition_function {
            if mapping.contains_key(round) {
                continue;
            }
            let transitions = transitions
                .iter()
                .map(|(event, target)| (*event, redirect(target)))
                .collect();
            chained.transition_function.insert(*round, transitions);
        }
        for round in &app.final_states {
            if mapping.contains_key(round) {
                continue;
            }
            chained.final_states.insert(*round);
            chained
                .db_post_conditions
                .insert(*round, app.db_post_conditions(*round));
        }
        for round in &initial_states {
            if let Some(keys) = app.db_pre_conditions.get(round) {
                chained.db_pre_conditions.insert(*round, keys.clone());
            }
        }
    }
    chained.initial_states = initial_states;
    chained.event_to_timeout = event_to_timeout;
    chained.cross_period_persisted_keys = cross_period_persisted_keys;
    chained.validate()?;
    debug!(
        "Chained {} apps into {} with {} rounds",
        apps.len(),
        chained.name(),
        chained.rounds.len()
    );
    Ok(chained)
}

/// Check that every mapped initial state is entered with (at least) the keys it requires,
/// whatever the path taken to reach it. Keys guaranteed on entry are propagated through
/// apps, from their initial states to the final states they can reach: an app adds the
/// post-conditions of its final state and, when it opens a new period, only keeps the
/// persisted keys.
fn check_data_flow(
    apps: &[AbciApp],
    mapping: &AbciAppTransitionMapping,
    entry_points: &BTreeSet<RoundId>,
    persisted_keys: &BTreeSet<String>,
) -> Result<(), String> {
    let pre_conditions = |round: RoundId| -> BTreeSet<String> {
        apps.iter()
            .find(|app| app.initial_states().contains(&round))
            .map(|app| app.db_pre_conditions(round))
            .unwrap_or_default()
    };
    // Keys available when entering an initial state. Absent entries are not reached yet.
    let mut guaranteed: BTreeMap<RoundId, BTreeSet<String>> = entry_points
        .iter()
        .map(|round| (*round, pre_conditions(*round)))
        .collect();

    let mut changed = true;
    while changed {
        changed = false;
        for app in apps {
            for initial in app.initial_states() {
                let available = match guaranteed.get(initial) {
                    Some(keys) => keys.clone(),
                    None => continue,
                };
                let kept: BTreeSet<String> = if app.resets_period() {
                    available.intersection(persisted_keys).cloned().collect()
                } else {
                    available
                };
                for last in app.reachable_final_states(*initial) {
                    let target = match mapping.get(&last) {
                        Some(target) => *target,
                        None => continue,
                    };
                    let out: BTreeSet<String> = kept
                        .union(&app.db_post_conditions(last))
                        .cloned()
                        .collect();
                    let next = match guaranteed.get(&target) {
                        Some(keys) => keys.intersection(&out).cloned().collect(),
                        None => out,
                    };
                    if guaranteed.get(&target) != Some(&next) {
                        guaranteed.insert(target, next);
                        changed = true;
                    }
                }
            }
        }
    }

    for (round, keys) in &guaranteed {
        let missing: Vec<_> = pre_conditions(*round)
            .difference(keys)
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(format!(
                "round {} requires {:?} which some path does not guarantee",
                round, missing
            ));
        }
    }
    Ok(())
}
