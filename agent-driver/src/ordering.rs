// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::config::DriverParameters;
use crate::core::{Block, Transaction};
use abci_lib::base_types::NodeTime;
use log::{debug, info};
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant};

#[cfg(test)]
#[path = "tests/ordering_tests.rs"]
pub mod ordering_tests;

/// In-process total-order broadcast: every subscriber receives the same blocks, in the
/// same order, holding the transactions received since the previous block.
pub struct LocalOrdering;

impl LocalOrdering {
    pub fn spawn(
        parameters: &DriverParameters,
        // Transactions submitted by the agents.
        mut rx_transactions: Receiver<Transaction>,
        // One block channel per agent.
        mut subscribers: Vec<Sender<Block>>,
        // Stop after this many blocks.
        max_height: Option<u64>,
    ) -> JoinHandle<()> {
        let block_interval = parameters.block_interval.as_std();
        tokio::spawn(async move {
            let start = Instant::now();
            let mut ticker = interval(block_interval);
            // The first tick completes immediately.
            ticker.tick().await;
            let mut pending = Vec::new();
            let mut height = 0;
            loop {
                tokio::select! {
                    transaction = rx_transactions.recv() => match transaction {
                        Some(transaction) => pending.push(transaction),
                        None => break,
                    },
                    _ = ticker.tick() => {
                        height += 1;
                        let block = Block {
                            height,
                            time: NodeTime(start.elapsed().as_millis() as i64),
                            payloads: std::mem::take(&mut pending),
                        };
                        debug!(
                            "Ordering block {} with {} transaction(s)",
                            height,
                            block.payloads.len()
                        );
                        let mut open = Vec::with_capacity(subscribers.len());
                        for subscriber in subscribers.drain(..) {
                            if subscriber.send(block.clone()).await.is_ok() {
                                open.push(subscriber);
                            }
                        }
                        subscribers = open;
                        if subscribers.is_empty() || max_height.map_or(false, |max| height >= max) {
                            break;
                        }
                    }
                }
            }
            info!("Ordering stopped at height {}", height);
        })
    }
}
