// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use crate::error::DriverResult;
use abci_lib::{
    base_types::Duration,
    error::{AbciError, AbciResult},
    interfaces::{ApiRequest, ApiResponse, HttpCollaborator, Method},
};
use async_trait::async_trait;
use log::debug;
use reqwest::Client;

#[cfg(test)]
#[path = "tests/http_tests.rs"]
pub mod http_tests;

/// HTTP collaborator backed by reqwest. Backoff pauses suspend the calling task only.
#[derive(Clone, Debug)]
pub struct ReqwestCollaborator {
    client: Client,
}

impl ReqwestCollaborator {
    pub fn new(timeout: Duration) -> DriverResult<Self> {
        let client = Client::builder().timeout(timeout.as_std()).build()?;
        Ok(Self { client })
    }

    async fn execute(&self, request: &ApiRequest) -> DriverResult<ApiResponse> {
        let mut builder = match request.method {
            Method::Get => self.client.get(&request.url),
            Method::Post => self.client.post(&request.url),
        };
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        debug!(
            "{:?} {} returned {} ({} bytes)",
            request.method,
            request.url,
            status,
            body.len()
        );
        Ok(ApiResponse { status, body })
    }
}

#[async_trait]
impl HttpCollaborator for ReqwestCollaborator {
    async fn send(&self, request: &ApiRequest) -> AbciResult<ApiResponse> {
        self.execute(request).await.map_err(AbciError::from)
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration.as_std()).await;
    }
}
