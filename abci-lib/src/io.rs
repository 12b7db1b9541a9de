// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

//! Helpers used by behaviours during their local phase. Transient failures are retried a
//! bounded number of times and then reported as `None`.

use crate::{
    base_types::Duration,
    interfaces::{ApiRequest, ContentStore, Filetype, HttpCollaborator},
};
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[cfg(test)]
#[path = "unit_tests/io_tests.rs"]
mod io_tests;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Number of attempts after the first one.
    pub max_retries: usize,
    /// Pause between two attempts.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            retry_delay: Duration(1_000),
        }
    }
}

/// Send `request` until a 2xx response with a JSON body is obtained.
/// Non-2xx statuses, transport errors and undecodable bodies are all retried.
pub async fn fetch_json_with_retries(
    client: &dyn HttpCollaborator,
    request: &ApiRequest,
    policy: &RetryPolicy,
) -> Option<Value> {
    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            client.sleep(policy.retry_delay).await;
        }
        match client.send(request).await {
            Ok(response) if response.is_success() => {
                match serde_json::from_slice::<Value>(&response.body) {
                    Ok(value) => return Some(value),
                    Err(e) => warn!(
                        "Could not decode the response of {} (attempt {}): {}",
                        request.url, attempt, e
                    ),
                }
            }
            Ok(response) => warn!(
                "Request to {} failed with status {} (attempt {})",
                request.url, response.status, attempt
            ),
            Err(e) => warn!(
                "Request to {} failed (attempt {}): {}",
                request.url, attempt, e
            ),
        }
    }
    error!(
        "Giving up on {} after {} retries",
        request.url, policy.max_retries
    );
    None
}

/// Store a JSON object and return its address, retrying failed writes.
pub async fn send_to_store(
    store: &dyn ContentStore,
    value: &Value,
    policy: &RetryPolicy,
) -> Option<String> {
    let bytes = match serde_json::to_vec(value) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Could not serialize an object to store: {}", e);
            return None;
        }
    };
    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            store.sleep(policy.retry_delay).await;
        }
        match store.put(bytes.clone(), Filetype::Json).await {
            Ok(hash) => {
                debug!("Stored object under {}", hash);
                return Some(hash);
            }
            Err(e) => warn!("Could not store object (attempt {}): {}", attempt, e),
        }
    }
    error!("Giving up on storing an object after {} retries", policy.max_retries);
    None
}

/// Fetch the JSON object stored under `hash`, retrying failed reads.
/// Content that is not valid JSON is not retried.
pub async fn get_from_store(
    store: &dyn ContentStore,
    hash: &str,
    policy: &RetryPolicy,
) -> Option<Value> {
    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            store.sleep(policy.retry_delay).await;
        }
        match store.get(hash, Filetype::Json).await {
            Ok(bytes) => {
                return match serde_json::from_slice(&bytes) {
                    Ok(value) => Some(value),
                    Err(e) => {
                        error!("Object {} is not valid JSON: {}", hash, e);
                        None
                    }
                }
            }
            Err(e) => warn!("Could not fetch object {} (attempt {}): {}", hash, attempt, e),
        }
    }
    error!(
        "Giving up on object {} after {} retries",
        hash, policy.max_retries
    );
    None
}
