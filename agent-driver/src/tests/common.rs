// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use abci_lib::{
    abci_app::AbciApp,
    agent::Agent,
    base_types::{Duration, Event, NodeTime, Participant, RoundId},
    interfaces::{Behaviour, RoundView},
    payload::{Attribute, AttributeKind, PayloadSchema},
    round::RoundSpec,
    synchronized_data::SynchronizedData,
    ParticipantSet,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const COUNT_ROUND: RoundId = RoundId("CountRound");
pub const COUNTED_ROUND: RoundId = RoundId("CountedRound");
pub const FAILED_COUNT_ROUND: RoundId = RoundId("FailedCountRound");

/// The value every agent proposes.
pub const COUNT: u64 = 7;

/// One round agreeing on a number, which times out after 5 seconds.
pub fn count_app() -> Arc<AbciApp> {
    let app = AbciApp::builder("CountAbciApp", COUNT_ROUND)
        .round(
            RoundSpec::same_until_threshold(COUNT_ROUND)
                .with_schema(PayloadSchema::new(vec![Attribute::required(
                    "count",
                    AttributeKind::Integer,
                )]))
                .with_selection_keys(&["count"]),
        )
        .final_round(COUNTED_ROUND, &["count"])
        .final_round(FAILED_COUNT_ROUND, &[])
        .transition(COUNT_ROUND, Event::DONE, COUNTED_ROUND)
        .transition(COUNT_ROUND, Event::NONE, FAILED_COUNT_ROUND)
        .transition(COUNT_ROUND, Event::NO_MAJORITY, COUNT_ROUND)
        .transition(COUNT_ROUND, Event::ROUND_TIMEOUT, COUNT_ROUND)
        .timeout(Event::ROUND_TIMEOUT, Duration(5_000))
        .build()
        .unwrap();
    Arc::new(app)
}

/// Proposes the number held by the context, after `not_ready` attempts returning nothing.
pub struct CountBehaviour {
    pub not_ready: usize,
}

#[async_trait]
impl Behaviour<u64> for CountBehaviour {
    fn matching_round(&self) -> RoundId {
        COUNT_ROUND
    }

    async fn local_act(&mut self, context: &mut u64, _view: RoundView<'_>) -> Option<Vec<Value>> {
        if self.not_ready > 0 {
            self.not_ready -= 1;
            return None;
        }
        Some(vec![json!(*context)])
    }
}

pub fn participants(num_nodes: usize) -> ParticipantSet {
    ParticipantSet::new((0..num_nodes).map(|i| Participant::new(format!("agent_{}", i))))
}

/// The first `num_agents` agents out of `num_nodes` participants.
pub fn agents(num_agents: usize, num_nodes: usize, not_ready: usize) -> Vec<Agent<u64>> {
    let app = count_app();
    (0..num_agents)
        .map(|i| {
            Agent::new(
                Participant::new(format!("agent_{}", i)),
                app.clone(),
                participants(num_nodes),
                SynchronizedData::default(),
                vec![Box::new(CountBehaviour { not_ready })],
                COUNT,
                NodeTime(0),
            )
            .unwrap()
        })
        .collect()
}

/// Answers a single HTTP request with the given status line and body. The task returns the
/// raw request.
pub async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        request
    });
    (url, handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if is_complete(&buffer) {
            break;
        }
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

fn is_complete(buffer: &[u8]) -> bool {
    let text = String::from_utf8_lossy(buffer).to_lowercase();
    let header_end = match text.find("\r\n\r\n") {
        Some(index) => index + 4,
        None => return false,
    };
    let headers = &text[..header_end];
    if let Some(line) = headers
        .lines()
        .find(|line| line.starts_with("content-length:"))
    {
        let length: usize = line["content-length:".len()..].trim().parse().unwrap();
        return buffer.len() >= header_end + length;
    }
    if headers.contains("transfer-encoding: chunked") {
        return text.ends_with("0\r\n\r\n");
    }
    true
}
