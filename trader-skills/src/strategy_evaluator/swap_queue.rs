// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use super::SWAP_QUEUE_ROUND;
use crate::{
    context::{SwapQueue, TraderContext},
    synchronized_data::TraderData,
};
use abci_lib::{
    base_types::RoundId,
    interfaces::{Behaviour, RoundView},
};
use async_trait::async_trait;
use log::{error, info};
use serde_json::Value;

/// Proposes the next instruction of the queue, or an empty one once it is drained.
/// The queue is loaded from the agreed instructions hash the first time and then kept
/// in the context; each round instance consumes one instruction.
pub struct SwapQueueBehaviour;

#[async_trait]
impl Behaviour<TraderContext> for SwapQueueBehaviour {
    fn matching_round(&self) -> RoundId {
        SWAP_QUEUE_ROUND
    }

    async fn local_act(
        &mut self,
        context: &mut TraderContext,
        view: RoundView<'_>,
    ) -> Option<Vec<Value>> {
        let instructions_hash = match TraderData(view.synchronized_data).instructions_hash() {
            Ok(Some(hash)) => hash,
            Ok(None) => {
                error!("Instructions were expected to be set");
                return Some(vec![Value::Null]);
            }
            Err(e) => {
                error!("{}", e);
                return Some(vec![Value::Null]);
            }
        };
        if context.swap_queue_mut(instructions_hash).is_none() {
            let pending = match context.load(instructions_hash).await {
                Some(Value::Array(pending)) => pending.into_iter().collect(),
                Some(other) => {
                    error!("Instructions {} are not a list: {}", instructions_hash, other);
                    return Some(vec![Value::Null]);
                }
                None => return Some(vec![Value::Null]),
            };
            context.set_swap_queue(Some(SwapQueue {
                instructions_hash: instructions_hash.to_string(),
                pending,
            }));
        }
        let next = context
            .swap_queue_mut(instructions_hash)
            .and_then(|queue| queue.pending.pop_front());
        let instruction = match next {
            Some(instruction) => instruction,
            None => {
                info!("No more instructions to process");
                context.set_swap_queue(None);
                return Some(vec![Value::from("")]);
            }
        };
        match instruction {
            Value::Object(ref fields) if !fields.is_empty() => {
                Some(vec![Value::from(instruction.to_string())])
            }
            _ => {
                error!(
                    "The next instruction is not correctly set, skipping it: {}",
                    instruction
                );
                Some(vec![Value::Null])
            }
        }
    }
}
