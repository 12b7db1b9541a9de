// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use abci_lib::error::AbciError;
use thiserror::Error;

pub type DriverResult<T> = Result<T, DriverError>;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Abci(#[from] AbciError),

    #[error("Failed to encode or decode a transaction: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("The {0} channel is closed")]
    ChannelClosed(&'static str),
}

impl From<DriverError> for AbciError {
    fn from(error: DriverError) -> Self {
        match error {
            DriverError::Abci(e) => e,
            e => AbciError::Collaborator(e.to_string()),
        }
    }
}
