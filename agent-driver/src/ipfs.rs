// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::error::DriverResult;
use abci_lib::{
    base_types::Duration,
    error::{AbciError, AbciResult},
    interfaces::{ContentStore, Filetype},
};
use async_trait::async_trait;
use log::debug;
use reqwest::{
    multipart::{Form, Part},
    Client,
};
use serde::Deserialize;

#[cfg(test)]
#[path = "tests/ipfs_tests.rs"]
pub mod ipfs_tests;

/// Content store backed by the HTTP API of an IPFS node.
#[derive(Clone, Debug)]
pub struct IpfsHttpStore {
    client: Client,
    /// Base url of the node API, e.g. `http://localhost:5001`.
    api_url: String,
}

#[derive(Deserialize)]
struct AddResponse {
    #[serde(rename = "Hash")]
    hash: String,
}

pub(crate) fn file_name(filetype: Filetype) -> &'static str {
    match filetype {
        Filetype::Json => "data.json",
        Filetype::Text => "data.txt",
    }
}

impl IpfsHttpStore {
    pub fn new<S: Into<String>>(client: Client, api_url: S) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    pub(crate) fn add_url(&self) -> String {
        format!("{}/api/v0/add?pin=true", self.api_url)
    }

    pub(crate) fn cat_url(&self, hash: &str) -> String {
        format!("{}/api/v0/cat?arg={}", self.api_url, hash)
    }

    async fn add(&self, content: Vec<u8>, filetype: Filetype) -> DriverResult<String> {
        let form = Form::new().part("file", Part::bytes(content).file_name(file_name(filetype)));
        let response: AddResponse = self
            .client
            .post(self.add_url())
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!("Added {:?} object {}", filetype, response.hash);
        Ok(response.hash)
    }

    async fn cat(&self, hash: &str) -> DriverResult<Vec<u8>> {
        let bytes = self
            .client
            .post(self.cat_url(hash))
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ContentStore for IpfsHttpStore {
    async fn put(&self, content: Vec<u8>, filetype: Filetype) -> AbciResult<String> {
        self.add(content, filetype).await.map_err(AbciError::from)
    }

    async fn get(&self, hash: &str, _filetype: Filetype) -> AbciResult<Vec<u8>> {
        self.cat(hash).await.map_err(AbciError::from)
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration.as_std()).await;
    }
}
