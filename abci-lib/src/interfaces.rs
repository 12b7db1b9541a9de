// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::{
    base_types::{Duration, Participant, RoundCount, RoundId},
    configuration::ParticipantSet,
    error::AbciResult,
    synchronized_data::SynchronizedData,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What a behaviour can see of the round it is producing a payload for.
#[derive(Debug, Clone, Copy)]
pub struct RoundView<'a> {
    pub address: &'a Participant,
    pub round: RoundId,
    pub round_count: RoundCount,
    pub participants: &'a ParticipantSet,
    pub synchronized_data: &'a SynchronizedData,
}

/// Local work of an agent for one round.
#[async_trait]
pub trait Behaviour<Context: Send>: Send {
    /// The round whose payloads this behaviour produces.
    fn matching_round(&self) -> RoundId;

    /// Local phase: perform I/O or computations and return the values of the payload to
    /// submit for consensus. Failures are encoded in the values (typically as nulls).
    /// Returning `None` means "not ready yet": the caller retries later.
    async fn local_act(
        &mut self,
        context: &mut Context,
        view: RoundView<'_>,
    ) -> Option<Vec<Value>>;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filetype {
    Json,
    Text,
}

/// Content-addressed storage, such as IPFS.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store the content and return its address.
    async fn put(&self, content: Vec<u8>, filetype: Filetype) -> AbciResult<String>;

    /// Retrieve the content stored under `hash`.
    async fn get(&self, hash: &str, filetype: Filetype) -> AbciResult<Vec<u8>>;

    /// Pause between two attempts.
    async fn sleep(&self, duration: Duration);
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Method {
    Get,
    Post,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiRequest {
    pub fn get<S: Into<String>>(url: S) -> Self {
        ApiRequest {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn post<S: Into<String>>(url: S, body: Value) -> Self {
        ApiRequest {
            method: Method::Post,
            url: url.into(),
            headers: Vec::new(),
            body: Some(body),
        }
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Request/response access to external APIs.
#[async_trait]
pub trait HttpCollaborator: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> AbciResult<ApiResponse>;

    /// Suspend the caller between two attempts.
    async fn sleep(&self, duration: Duration);
}
