// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

//! Runs agents against an ordered stream of blocks, with reqwest and IPFS collaborators.

mod config;
mod core;
mod error;
mod http;
mod ipfs;
mod ordering;
mod timer;

#[cfg(test)]
#[path = "tests/common.rs"]
mod common;

pub use crate::config::DriverParameters;
pub use crate::core::{decode_payload, encode_payload, AgentDriver, Block, Transaction};
pub use crate::error::{DriverError, DriverResult};
pub use crate::http::ReqwestCollaborator;
pub use crate::ipfs::IpfsHttpStore;
pub use crate::ordering::LocalOrdering;
