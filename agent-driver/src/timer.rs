// Copyright (c) Calibra Research
// SPDX-License-Identifier: Apache-2.0

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::time::{sleep, Duration, Instant, Sleep};

#[cfg(test)]
#[path = "tests/timer_tests.rs"]
pub mod timer_tests;

/// A one-shot timer that can be re-armed. Awaiting it completes once the deadline passes.
pub struct Timer {
    sleep: Pin<Box<Sleep>>,
}

impl Timer {
    pub fn new(millis: u64) -> Self {
        let sleep = Box::pin(sleep(Duration::from_millis(millis)));
        Self { sleep }
    }

    pub fn reset(&mut self, millis: u64) {
        self.sleep
            .as_mut()
            .reset(Instant::now() + Duration::from_millis(millis));
    }
}

impl Future for Timer {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.sleep.as_mut().poll(cx)
    }
}
