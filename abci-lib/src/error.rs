// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::base_types::{Event, Participant, RoundCount, RoundId};
use thiserror::Error;

#[macro_export]
macro_rules! bail {
    ($e:expr) => {
        return Err($e);
    };
}

#[macro_export(local_inner_macros)]
macro_rules! ensure {
    ($cond:expr, $e:expr) => {
        if !($cond) {
            bail!($e);
        }
    };
}

pub type AbciResult<T> = Result<T, AbciError>;

#[derive(Error, Debug)]
pub enum AbciError {
    #[error("{sender} is not a participant of round {round}")]
    UnknownSender { sender: Participant, round: RoundId },

    #[error("Malformed payload from {sender} for round {round}: {reason}")]
    MalformedPayload {
        sender: Participant,
        round: RoundId,
        reason: String,
    },

    #[error("Payload from {sender} targets round count {found:?} but the current one is {expected:?}")]
    StaleRound {
        sender: Participant,
        expected: RoundCount,
        found: RoundCount,
    },

    #[error("{sender} is not the keeper of round {round}")]
    NotKeeper { sender: Participant, round: RoundId },

    #[error("{sender} sent a value already sent by another participant in round {round}")]
    DuplicateValue { sender: Participant, round: RoundId },

    #[error("Round {0} is a final state and accepts no payloads")]
    FinalRound(RoundId),

    #[error("Key {0:?} is not present in the synchronized data")]
    MissingKey(String),

    #[error("Value of key {key:?} is not a valid {expected}")]
    InvalidValue { key: String, expected: &'static str },

    #[error("Invalid app {app}: {reason}")]
    InvalidApp { app: String, reason: String },

    #[error("Round {round} has no transition for event {event}")]
    MissingTransition { round: RoundId, event: Event },

    #[error("Invalid behaviours: {0}")]
    InvalidBehaviours(String),

    #[error("Collaborator failure: {0}")]
    Collaborator(String),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

impl AbciError {
    /// Whether the error rejects a payload at `check_payload` time. Such errors drop the
    /// submission and leave the round collecting from others.
    pub fn is_payload_validation(&self) -> bool {
        matches!(
            self,
            AbciError::UnknownSender { .. }
                | AbciError::MalformedPayload { .. }
                | AbciError::StaleRound { .. }
                | AbciError::NotKeeper { .. }
                | AbciError::DuplicateValue { .. }
                | AbciError::FinalRound(_)
        )
    }
}
