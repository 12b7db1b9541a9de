// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

//! Round-based state machines for services replicated over a group of agents.
//!
//! Each round collects one payload per participant and resolves once a quorum agrees (or
//! provably cannot), producing an event. Apps map (round, event) pairs to the next round
//! and can be chained into a service-level state machine. Behaviours perform the local
//! work of each agent and produce its payloads.

#[macro_use]
pub mod error;

pub mod abci_app;
pub mod agent;
pub mod base_types;
pub mod behaviour;
pub mod benchmark;
pub mod chain;
pub mod collection;
mod configuration;
pub mod content_store;
pub mod data_writer;
pub mod interfaces;
pub mod io;
pub mod payload;
pub mod round;
pub mod round_sequence;
pub mod simulator;
pub mod synchronized_data;

/// Set of agents taking part in a consensus period.
pub use configuration::ParticipantSet;
