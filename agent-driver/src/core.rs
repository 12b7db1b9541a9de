// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::config::DriverParameters;
use crate::error::{DriverError, DriverResult};
use crate::timer::Timer;
use abci_lib::agent::Agent;
use abci_lib::base_types::NodeTime;
use abci_lib::payload::Payload;
use abci_lib::round_sequence::Transition;
use bytes::Bytes;
use log::{debug, info, warn};
use tokio::sync::mpsc::{Receiver, Sender};
use tokio::task::JoinHandle;

#[cfg(test)]
#[path = "tests/core_tests.rs"]
pub mod core_tests;

/// An encoded payload, as submitted to and ordered by consensus.
pub type Transaction = Bytes;

/// Transactions ordered by consensus, with the consensus time at which they were ordered.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub height: u64,
    pub time: NodeTime,
    pub payloads: Vec<Transaction>,
}

pub fn encode_payload(payload: &Payload) -> DriverResult<Transaction> {
    Ok(Bytes::from(serde_json::to_vec(payload)?))
}

pub fn decode_payload(transaction: &Transaction) -> DriverResult<Payload> {
    Ok(serde_json::from_slice(transaction)?)
}

/// Drives one agent: delivers ordered payloads, resolves rounds at block time, and runs the
/// local phase of every new round.
pub struct AgentDriver<C: Send + 'static> {
    agent: Agent<C>,
    parameters: DriverParameters,
    rx_blocks: Receiver<Block>,
    tx_outbox: Sender<Transaction>,
    tx_transitions: Option<Sender<Transition>>,
    /// Consensus time of the last block.
    clock: NodeTime,
    timer: Timer,
    retry_armed: bool,
}

impl<C: Send + 'static> AgentDriver<C> {
    /// Run `agent` until the block stream closes. The task returns the agent.
    pub fn spawn(
        agent: Agent<C>,
        parameters: DriverParameters,
        // Ordered blocks from consensus.
        rx_blocks: Receiver<Block>,
        // Payloads to submit for ordering.
        tx_outbox: Sender<Transaction>,
        // Transitions taken by the agent, if someone listens.
        tx_transitions: Option<Sender<Transition>>,
    ) -> JoinHandle<Agent<C>> {
        let timer = Timer::new(parameters.retry_delay.as_std().as_millis() as u64);
        tokio::spawn(async move {
            Self {
                agent,
                parameters,
                rx_blocks,
                tx_outbox,
                tx_transitions,
                clock: NodeTime(0),
                timer,
                retry_armed: true,
            }
            .run()
            .await
        })
    }

    fn arm_retry(&mut self) {
        let millis = self.parameters.retry_delay.as_std().as_millis() as u64;
        self.timer.reset(millis);
        self.retry_armed = true;
    }

    /// Local phase of the current round, if it has not produced a payload yet.
    async fn act(&mut self) -> DriverResult<()> {
        if !self.agent.pending_act() {
            return Ok(());
        }
        match self.agent.act(self.clock).await? {
            Some(payload) => {
                let transaction = encode_payload(&payload)?;
                debug!(
                    "{} Submitting a transaction of {} bytes",
                    self.agent.address(),
                    transaction.len()
                );
                self.tx_outbox
                    .send(transaction)
                    .await
                    .map_err(|_| DriverError::ChannelClosed("outbox"))?;
            }
            None => self.arm_retry(),
        }
        Ok(())
    }

    async fn process_block(&mut self, block: Block) -> DriverResult<()> {
        debug!(
            "{} Received block {} with {} transaction(s)",
            self.agent.address(),
            block.height,
            block.payloads.len()
        );
        self.clock = block.time;
        for transaction in &block.payloads {
            match decode_payload(transaction) {
                // Rejections are logged by the agent.
                Ok(payload) => {
                    let _ = self.agent.deliver(payload);
                }
                Err(e) => warn!("{} Dropping a transaction: {}", self.agent.address(), e),
            }
        }
        // Several transitions can be taken at once when timeouts expired meanwhile.
        loop {
            let actions = self.agent.update(self.clock)?;
            match actions.transition {
                Some(transition) => {
                    if let Some(tx_transitions) = &self.tx_transitions {
                        tx_transitions
                            .send(transition)
                            .await
                            .map_err(|_| DriverError::ChannelClosed("transitions"))?;
                    }
                }
                None => break,
            }
        }
        self.act().await
    }

    /// Main reactor loop.
    async fn run(mut self) -> Agent<C> {
        loop {
            let result = tokio::select! {
                block = self.rx_blocks.recv() => match block {
                    Some(block) => self.process_block(block).await,
                    None => break,
                },
                () = &mut self.timer, if self.retry_armed => {
                    self.retry_armed = false;
                    self.act().await
                }
            };
            if let Err(e) = result {
                warn!("{} {}", self.agent.address(), e);
                if let DriverError::ChannelClosed(_) = e {
                    break;
                }
            }
            if self.agent.is_finished() {
                info!("{} reached a final state", self.agent.address());
                break;
            }
        }
        self.agent
    }
}
