// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.
//! Bounded FIFO of accepted RUN requests.
//!
//! Admission never rejects: a request that arrives while the queue already
//! holds `busy_threshold` or more jobs is still enqueued, and the caller is
//! told the runner is busy. Submission waits only when the channel itself is
//! full.

use std::fmt;

use tokio::sync::mpsc;

use crate::common::types::Request;
use crate::quackrun_logging::{debug, info};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Admission {
    Accepted,
    Busy,
}

/// The worker side of the queue is gone.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct QueueClosed;

impl fmt::Display for QueueClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("job queue is closed")
    }
}

impl std::error::Error for QueueClosed {}

pub type JobReceiver = mpsc::Receiver<Request>;

#[derive(Clone, Debug)]
pub struct JobQueue {
    tx: mpsc::Sender<Request>,
    busy_threshold: usize,
}

pub fn channel(capacity: usize, busy_threshold: usize) -> (JobQueue, JobReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (JobQueue { tx, busy_threshold }, rx)
}

impl JobQueue {
    /// Jobs accepted but not yet taken by the worker.
    pub fn occupancy(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn busy_threshold(&self) -> usize {
        self.busy_threshold
    }

    pub async fn submit(&self, request: Request) -> Result<Admission, QueueClosed> {
        let queued = self.occupancy();
        let admission = if queued >= self.busy_threshold {
            info!(
                queued,
                threshold = self.busy_threshold,
                "runner busy, queueing {}",
                request.path
            );
            Admission::Busy
        } else {
            Admission::Accepted
        };
        let path = request.path.clone();
        self.tx.send(request).await.map_err(|_| QueueClosed)?;
        debug!("queued {path} ({} waiting)", self.occupancy());
        Ok(admission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(path: &str) -> Request {
        Request {
            path: path.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn admission_turns_busy_at_threshold_but_still_enqueues() {
        let (queue, mut rx) = channel(8, 2);
        assert_eq!(queue.submit(request("a")).await, Ok(Admission::Accepted));
        assert_eq!(queue.submit(request("b")).await, Ok(Admission::Accepted));
        assert_eq!(queue.submit(request("c")).await, Ok(Admission::Busy));
        assert_eq!(queue.occupancy(), 3);

        let order: Vec<String> = [
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
        ]
        .into_iter()
        .map(|r| r.path)
        .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        assert_eq!(queue.occupancy(), 0);
    }

    #[tokio::test]
    async fn zero_threshold_reports_busy_for_every_request() {
        let (queue, _rx) = channel(4, 0);
        assert_eq!(queue.submit(request("a")).await, Ok(Admission::Busy));
        assert_eq!(queue.occupancy(), 1);
    }

    #[tokio::test]
    async fn submit_fails_once_receiver_is_dropped() {
        let (queue, rx) = channel(4, 4);
        drop(rx);
        assert_eq!(queue.submit(request("a")).await, Err(QueueClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn submit_waits_while_channel_is_full() {
        let (queue, mut rx) = channel(1, 8);
        assert_eq!(queue.submit(request("a")).await, Ok(Admission::Accepted));

        let pending = tokio::spawn({
            let queue = queue.clone();
            async move { queue.submit(request("b")).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(!pending.is_finished());
        assert_eq!(queue.occupancy(), 1);

        assert_eq!(rx.recv().await.unwrap().path, "a");
        assert_eq!(pending.await.unwrap(), Ok(Admission::Accepted));
        assert_eq!(rx.recv().await.unwrap().path, "b");
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let (queue, _rx) = channel(0, 1);
        assert_eq!(queue.occupancy(), 0);
        assert_eq!(queue.tx.max_capacity(), 1);
    }
}
