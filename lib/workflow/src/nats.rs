//! NATS JetStream-backed job queue.
//!
//! Jobs are published to a work-queue stream, giving durable at-least-once
//! delivery: a message stays in the stream until a consumer acks it. The
//! controller's idempotent handling is what makes the at-least-once
//! semantics safe.

use crate::envelope::Envelope;
use crate::error::QueueError;
use crate::job::{ExecuteWorkflowJob, JobQueue};
use async_nats::jetstream;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Subject jobs are published to.
const JOBS_SUBJECT: &str = "relay.jobs.execute";

/// Default stream name for execution jobs.
const JOBS_STREAM_NAME: &str = "RELAY_JOBS";

/// Durable consumer name used by job handlers.
const JOBS_CONSUMER_NAME: &str = "relay-job-handler";

/// Configuration for the NATS job queue.
#[derive(Debug, Clone)]
pub struct NatsQueueConfig {
    /// NATS server URL.
    pub url: String,
    /// Stream name override (defaults to `RELAY_JOBS`).
    pub stream_name: Option<String>,
}

impl NatsQueueConfig {
    /// Creates a config with the given NATS URL.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            stream_name: None,
        }
    }

    fn stream(&self) -> &str {
        self.stream_name.as_deref().unwrap_or(JOBS_STREAM_NAME)
    }
}

/// JetStream work-queue implementation of [`JobQueue`].
pub struct NatsJobQueue {
    jetstream: Arc<jetstream::Context>,
    config: NatsQueueConfig,
}

impl NatsJobQueue {
    /// Connects to NATS and ensures the job stream exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or stream setup fails.
    pub async fn connect(config: NatsQueueConfig) -> Result<Self, QueueError> {
        let client =
            async_nats::connect(&config.url)
                .await
                .map_err(|e| QueueError::ConnectionFailed {
                    message: e.to_string(),
                })?;
        let jetstream = async_nats::jetstream::new(client);

        let stream_config = jetstream::stream::Config {
            name: config.stream().to_string(),
            subjects: vec![JOBS_SUBJECT.to_string()],
            storage: jetstream::stream::StorageType::File,
            retention: jetstream::stream::RetentionPolicy::WorkQueue,
            ..Default::default()
        };
        jetstream
            .get_or_create_stream(stream_config)
            .await
            .map_err(|e| QueueError::ConnectionFailed {
                message: format!("failed to create jobs stream: {e}"),
            })?;

        Ok(Self {
            jetstream: Arc::new(jetstream),
            config,
        })
    }

    /// Pulls up to `limit` pending jobs, acking each as it is drained.
    ///
    /// Intended for a handler loop that feeds jobs into the execution
    /// controller.
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer cannot be created or read.
    pub async fn drain_pending(
        &self,
        limit: usize,
    ) -> Result<Vec<Envelope<ExecuteWorkflowJob>>, QueueError> {
        let stream = self
            .jetstream
            .get_stream(self.config.stream())
            .await
            .map_err(|e| QueueError::ReceiveFailed {
                message: format!("failed to get stream: {e}"),
            })?;

        let consumer = stream
            .get_or_create_consumer(
                JOBS_CONSUMER_NAME,
                jetstream::consumer::pull::Config {
                    durable_name: Some(JOBS_CONSUMER_NAME.to_string()),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| QueueError::ReceiveFailed {
                message: format!("failed to create consumer: {e}"),
            })?;

        let mut messages =
            consumer
                .messages()
                .await
                .map_err(|e| QueueError::ReceiveFailed {
                    message: e.to_string(),
                })?;

        let mut jobs = Vec::new();
        while jobs.len() < limit {
            let Ok(Some(message)) =
                tokio::time::timeout(Duration::from_millis(100), messages.next()).await
            else {
                break;
            };
            let message = message.map_err(|e| QueueError::ReceiveFailed {
                message: e.to_string(),
            })?;

            let envelope = Envelope::from_json_bytes(&message.payload).map_err(|e| {
                QueueError::ReceiveFailed {
                    message: format!("failed to deserialize job: {e}"),
                }
            })?;
            jobs.push(envelope);

            message.ack().await.map_err(|e| QueueError::ReceiveFailed {
                message: format!("failed to ack job: {e}"),
            })?;
        }

        Ok(jobs)
    }
}

#[async_trait]
impl JobQueue for NatsJobQueue {
    async fn enqueue(&self, job: Envelope<ExecuteWorkflowJob>) -> Result<(), QueueError> {
        let bytes = job.to_json_bytes().map_err(|e| QueueError::PublishFailed {
            message: format!("failed to serialize job: {e}"),
        })?;

        debug!(execution_id = %job.payload.execution_id, "publishing execution job");
        self.jetstream
            .publish(JOBS_SUBJECT, bytes.into())
            .await
            .map_err(|e| QueueError::PublishFailed {
                message: e.to_string(),
            })?
            .await
            .map_err(|e| QueueError::PublishFailed {
                message: e.to_string(),
            })?;

        Ok(())
    }
}
