// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use abci_lib::base_types::Duration;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{channel, Receiver, Sender};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverParameters {
    /// Capacity of the block, outbox and transition channels.
    pub channel_capacity: usize,
    /// Delay before retrying a behaviour that had nothing to submit.
    pub retry_delay: Duration,
    /// Interval between two blocks of the local ordering hub.
    pub block_interval: Duration,
}

impl Default for DriverParameters {
    fn default() -> Self {
        Self {
            channel_capacity: 1_000,
            retry_delay: Duration(500),
            block_interval: Duration(1_000),
        }
    }
}

impl DriverParameters {
    /// A bounded channel sized by `channel_capacity`.
    pub fn channel<T>(&self) -> (Sender<T>, Receiver<T>) {
        channel(self.channel_capacity)
    }
}
