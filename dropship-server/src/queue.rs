//! Named background task queues
//!
//! Each queue is an mpsc channel drained by its own worker, so a slow FTP
//! upload on `submission` never holds up `webhooks`. Jobs are delivered at
//! least once: a retryable failure is re-enqueued after
//! `base_backoff * 2^attempt` until `max_attempts`, then the handler's
//! exhaustion hook runs. Delays are spawned sleeps, the worker itself never
//! blocks on them.

use crate::core::config::QueueConfig;
use crate::core::error::{EngineError, EngineResult};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    Submission,
    Webhooks,
    Retry,
    Sync,
    Pricing,
}

impl QueueName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submission => "submission",
            Self::Webhooks => "webhooks",
            Self::Retry => "retry",
            Self::Sync => "sync",
            Self::Pricing => "pricing",
        }
    }
}

impl fmt::Display for QueueName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct Job<T> {
    pub payload: T,
    /// Zero-based delivery attempt
    pub attempt: u32,
}

#[async_trait]
pub trait JobHandler<T>: Send + Sync + 'static
where
    T: Send + Sync + 'static,
{
    async fn handle(&self, payload: &T) -> EngineResult<()>;

    /// Runs once when a retryable failure used up the queue's attempts
    async fn on_exhausted(&self, _payload: &T, _error: &EngineError) {}
}

pub struct QueueHandle<T> {
    name: QueueName,
    tx: mpsc::Sender<Job<T>>,
}

impl<T> Clone for QueueHandle<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            tx: self.tx.clone(),
        }
    }
}

impl<T: Send + 'static> QueueHandle<T> {
    pub fn name(&self) -> QueueName {
        self.name
    }

    pub async fn enqueue(&self, payload: T) -> EngineResult<()> {
        self.send(Job {
            payload,
            attempt: 0,
        })
        .await
    }

    /// Enqueue after `delay` without blocking the caller
    pub fn enqueue_after(&self, payload: T, delay: Duration) {
        self.schedule(
            Job {
                payload,
                attempt: 0,
            },
            delay,
        );
    }

    async fn send(&self, job: Job<T>) -> EngineResult<()> {
        self.tx
            .send(job)
            .await
            .map_err(|_| EngineError::QueueClosed(self.name.as_str()))
    }

    fn schedule(&self, job: Job<T>, delay: Duration) {
        let handle = self.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if let Err(e) = handle.send(job).await {
                tracing::error!(queue = %handle.name, error = %e, "Delayed job dropped");
            }
        });
    }
}

pub struct TaskQueue<T> {
    name: QueueName,
    rx: mpsc::Receiver<Job<T>>,
    handle: QueueHandle<T>,
    config: QueueConfig,
}

impl<T: Send + Sync + 'static> TaskQueue<T> {
    pub fn new(name: QueueName, config: &QueueConfig) -> (QueueHandle<T>, Self) {
        let (tx, rx) = mpsc::channel(config.buffer.max(1));
        let handle = QueueHandle { name, tx };
        let queue = Self {
            name,
            rx,
            handle: handle.clone(),
            config: config.clone(),
        };
        (handle, queue)
    }

    /// Delay before re-delivering a job that failed on `attempt`
    pub fn backoff(config: &QueueConfig, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        Duration::from_secs(config.base_backoff_secs.saturating_mul(factor))
    }

    /// Drain the queue until shutdown
    pub async fn run<H: JobHandler<T>>(mut self, handler: Arc<H>, shutdown: CancellationToken) {
        tracing::info!(queue = %self.name, "Task queue started");
        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));

        loop {
            let job = tokio::select! {
                _ = shutdown.cancelled() => break,
                job = self.rx.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            };
            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let handler = handler.clone();
            let handle = self.handle.clone();
            let config = self.config.clone();
            tokio::spawn(async move {
                let _permit = permit;
                process(handler, handle, &config, job).await;
            });
        }

        tracing::info!(queue = %self.name, "Task queue stopped");
    }
}

async fn process<T, H>(handler: Arc<H>, handle: QueueHandle<T>, config: &QueueConfig, job: Job<T>)
where
    T: Send + Sync + 'static,
    H: JobHandler<T>,
{
    let queue = handle.name;
    match handler.handle(&job.payload).await {
        Ok(()) => tracing::debug!(queue = %queue, attempt = job.attempt, "Job done"),
        Err(e) if e.is_retryable() && job.attempt + 1 < config.max_attempts => {
            let delay = TaskQueue::<T>::backoff(config, job.attempt);
            tracing::warn!(
                queue = %queue,
                attempt = job.attempt,
                delay_secs = delay.as_secs(),
                error = %e,
                "Job failed, re-enqueued"
            );
            handle.schedule(
                Job {
                    payload: job.payload,
                    attempt: job.attempt + 1,
                },
                delay,
            );
        }
        Err(e) if e.is_retryable() => {
            tracing::error!(
                queue = %queue,
                attempts = job.attempt + 1,
                error = %e,
                "Job attempts exhausted"
            );
            handler.on_exhausted(&job.payload, &e).await;
        }
        Err(e) => {
            tracing::warn!(queue = %queue, error = %e, "Job failed permanently");
        }
    }
}
