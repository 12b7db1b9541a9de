// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::{params::TraderParams, strategy::StrategyRegistry};
use abci_lib::{
    interfaces::{ContentStore, HttpCollaborator},
    io::{get_from_store, send_to_store},
};
use serde_json::Value;
use std::{collections::VecDeque, sync::Arc};

/// Local state and collaborators of one trader agent.
pub struct TraderContext {
    pub params: Arc<TraderParams>,
    pub http: Arc<dyn HttpCollaborator>,
    pub store: Arc<dyn ContentStore>,
    pub strategies: Arc<StrategyRegistry>,
    swap_queue: Option<SwapQueue>,
}

/// Instructions not yet turned into swaps, loaded from the agreed instructions hash.
#[derive(Clone, Debug, PartialEq)]
pub struct SwapQueue {
    pub instructions_hash: String,
    pub pending: VecDeque<Value>,
}

impl TraderContext {
    pub fn new(
        params: Arc<TraderParams>,
        http: Arc<dyn HttpCollaborator>,
        store: Arc<dyn ContentStore>,
        strategies: Arc<StrategyRegistry>,
    ) -> Self {
        TraderContext {
            params,
            http,
            store,
            strategies,
            swap_queue: None,
        }
    }

    /// The queue loaded from `instructions_hash`, if that is the one currently held.
    pub fn swap_queue_mut(&mut self, instructions_hash: &str) -> Option<&mut SwapQueue> {
        self.swap_queue
            .as_mut()
            .filter(|queue| queue.instructions_hash == instructions_hash)
    }

    /// Read a JSON object from the content store, with retries.
    pub async fn load(&self, hash: &str) -> Option<Value> {
        get_from_store(
            self.store.as_ref(),
            hash,
            &self.params.store.retry_policy,
        )
        .await
    }

    /// Write a JSON object to the content store, with retries.
    pub async fn save(&self, value: &Value) -> Option<String> {
        send_to_store(self.store.as_ref(), value, &self.params.store.retry_policy).await
    }

    pub fn set_swap_queue(&mut self, queue: Option<SwapQueue>) {
        self.swap_queue = queue;
    }
}
