// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::{
    content_store::MemoryContentStore,
    error::{AbciError, AbciResult},
    interfaces::ApiResponse,
};
use async_trait::async_trait;
use futures::executor::block_on;
use serde_json::json;
use std::sync::Mutex;

/// Replies with the scripted responses in order, then keeps failing.
struct ScriptedApi {
    responses: Mutex<Vec<AbciResult<ApiResponse>>>,
    calls: Mutex<usize>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ScriptedApi {
    fn new(mut responses: Vec<AbciResult<ApiResponse>>) -> Self {
        responses.reverse();
        ScriptedApi {
            responses: Mutex::new(responses),
            calls: Mutex::new(0),
            sleeps: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl HttpCollaborator for ScriptedApi {
    async fn send(&self, _request: &ApiRequest) -> AbciResult<ApiResponse> {
        *self.calls.lock().unwrap() += 1;
        self.responses
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(AbciError::Collaborator("unavailable".to_string())))
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

fn ok(body: &str) -> AbciResult<ApiResponse> {
    Ok(ApiResponse {
        status: 200,
        body: body.as_bytes().to_vec(),
    })
}

fn policy() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        retry_delay: Duration(10),
    }
}

#[test]
fn test_retries_until_success() {
    let api = ScriptedApi::new(vec![
        Ok(ApiResponse {
            status: 500,
            body: Vec::new(),
        }),
        ok("not json"),
        ok("{\"prices\": [1, 2]}"),
    ]);
    let result = block_on(fetch_json_with_retries(
        &api,
        &ApiRequest::get("http://api/prices"),
        &policy(),
    ));
    assert_eq!(result, Some(json!({"prices": [1, 2]})));
    assert_eq!(*api.calls.lock().unwrap(), 3);
    assert_eq!(*api.sleeps.lock().unwrap(), vec![Duration(10), Duration(10)]);
}

#[test]
fn test_retries_are_bounded() {
    let api = ScriptedApi::new(Vec::new());
    let result = block_on(fetch_json_with_retries(
        &api,
        &ApiRequest::get("http://api/prices"),
        &policy(),
    ));
    assert_eq!(result, None);
    assert_eq!(*api.calls.lock().unwrap(), 3);
}

/// Fails the first `failures` reads and writes, then delegates to a memory store.
struct FlakyStore {
    inner: MemoryContentStore,
    failures: Mutex<usize>,
    sleeps: Mutex<Vec<Duration>>,
}

impl FlakyStore {
    fn new(failures: usize) -> Self {
        FlakyStore {
            inner: MemoryContentStore::new(),
            failures: Mutex::new(failures),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    fn fail(&self) -> AbciResult<()> {
        let mut failures = self.failures.lock().unwrap();
        if *failures > 0 {
            *failures -= 1;
            return Err(AbciError::Collaborator("gateway timeout".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ContentStore for FlakyStore {
    async fn put(&self, content: Vec<u8>, filetype: Filetype) -> AbciResult<String> {
        self.fail()?;
        self.inner.put(content, filetype).await
    }

    async fn get(&self, hash: &str, filetype: Filetype) -> AbciResult<Vec<u8>> {
        self.fail()?;
        self.inner.get(hash, filetype).await
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

#[test]
fn test_store_round_trip() {
    let store = MemoryContentStore::new();
    let value = json!({"token": {"prices": [[1, 2.5]]}});
    let hash = block_on(send_to_store(&store, &value, &policy())).unwrap();
    assert_eq!(block_on(get_from_store(&store, &hash, &policy())), Some(value));
    assert_eq!(block_on(get_from_store(&store, "unknown", &policy())), None);
}

#[test]
fn test_store_failures_are_retried() {
    let store = FlakyStore::new(1);
    let value = json!({"orders": []});
    let hash = block_on(send_to_store(&store, &value, &policy())).unwrap();
    assert_eq!(*store.sleeps.lock().unwrap(), vec![Duration(10)]);

    *store.failures.lock().unwrap() = 1;
    assert_eq!(block_on(get_from_store(&store, &hash, &policy())), Some(value));
    assert_eq!(store.sleeps.lock().unwrap().len(), 2);
}

#[test]
fn test_store_retries_are_bounded() {
    let store = FlakyStore::new(0);
    let hash = block_on(send_to_store(&store, &json!([1]), &policy())).unwrap();

    // One attempt plus two retries.
    *store.failures.lock().unwrap() = 3;
    assert_eq!(block_on(get_from_store(&store, &hash, &policy())), None);
    assert_eq!(store.sleeps.lock().unwrap().len(), 2);

    *store.failures.lock().unwrap() = 2;
    assert!(block_on(get_from_store(&store, &hash, &policy())).is_some());
}

#[test]
fn test_invalid_json_is_not_retried() {
    let store = FlakyStore::new(0);
    let hash = block_on(store.put(b"not json".to_vec(), Filetype::Text)).unwrap();
    assert_eq!(block_on(get_from_store(&store, &hash, &policy())), None);
    assert!(store.sleeps.lock().unwrap().is_empty());
}
