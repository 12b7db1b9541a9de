// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::{
    base_types::Duration,
    error::{AbciError, AbciResult},
    interfaces::{ContentStore, Filetype},
};
use async_trait::async_trait;
use ed25519_dalek::Digest as _;
use ed25519_dalek::Sha512;
use log::debug;
use std::{collections::HashMap, sync::Mutex};

#[cfg(test)]
#[path = "unit_tests/content_store_tests.rs"]
mod content_store_tests;

/// Address of some content: the first 32 bytes of its SHA-512, base64-encoded.
pub fn content_hash(content: &[u8]) -> String {
    let digest = Sha512::digest(content);
    base64::encode_config(&digest.as_slice()[..32], base64::URL_SAFE_NO_PAD)
}

/// Content-addressed store kept in memory. Sharing one instance between simulated
/// agents models a shared IPFS network.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        MemoryContentStore::default()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().map(|objects| objects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn put(&self, content: Vec<u8>, filetype: Filetype) -> AbciResult<String> {
        let hash = content_hash(&content);
        debug!("Storing {} bytes of {:?} under {}", content.len(), filetype, hash);
        self.objects
            .lock()
            .map_err(|e| AbciError::Collaborator(e.to_string()))?
            .insert(hash.clone(), content);
        Ok(hash)
    }

    async fn get(&self, hash: &str, _filetype: Filetype) -> AbciResult<Vec<u8>> {
        self.objects
            .lock()
            .map_err(|e| AbciError::Collaborator(e.to_string()))?
            .get(hash)
            .cloned()
            .ok_or_else(|| AbciError::Collaborator(format!("Unknown content {}", hash)))
    }

    // Simulated time does not advance during a local phase.
    async fn sleep(&self, _duration: Duration) {}
}
