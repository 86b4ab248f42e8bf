//! Queued-message trigger.
//!
//! A delivery is a batch of messages whose bodies are JSON [`SplitConfig`]
//! payloads. Messages are processed one after another, one pipeline run each,
//! and the batch stops at the first failure so the transport can redeliver it.

use crate::config::SplitConfig;
use crate::error::{Result, TransformError};
use crate::pipeline::{DatasetPipeline, DatasetSummary};
use crate::store::CategoryStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::Span;

/// One queued message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    #[serde(rename = "messageId", alias = "message_id")]
    pub message_id: String,
    pub body: String,
}

/// A batch of queued messages, in the `{"Records": [{"messageId", "body"}]}` shape.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEvent {
    #[serde(rename = "Records", alias = "records", default)]
    pub records: Vec<QueueMessage>,
}

impl QueueEvent {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Treat every non-blank line as one message body.
    pub fn from_json_lines(text: &str) -> Self {
        let records = text
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| QueueMessage {
                message_id: format!("line-{}", i + 1),
                body: line.to_string(),
            })
            .collect();
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Runs one dataset pipeline per queued message.
pub struct QueueHandler {
    store: Arc<dyn CategoryStore>,
    span: Span,
}

impl QueueHandler {
    pub fn new(store: Arc<dyn CategoryStore>) -> Self {
        Self {
            store,
            span: tracing::info_span!("queue"),
        }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Process every message of `event` in order.
    ///
    /// Returns the summaries of all runs, or the first error. A malformed body
    /// fails with [`TransformError::ConfigDecode`].
    pub async fn handle_event(&self, event: &QueueEvent) -> Result<Vec<DatasetSummary>> {
        let mut summaries = Vec::with_capacity(event.len());
        for message in &event.records {
            summaries.push(self.handle_message(message).await?);
        }
        Ok(summaries)
    }

    async fn handle_message(&self, message: &QueueMessage) -> Result<DatasetSummary> {
        let message_span = tracing::info_span!(
            parent: &self.span,
            "message",
            message_id = %message.message_id
        );
        message_span.in_scope(|| tracing::info!("Processing message"));

        let config = decode_message(message).inspect_err(|e| {
            message_span.in_scope(|| tracing::error!(error = %e, "Failed to decode split config"))
        })?;

        let pipeline = DatasetPipeline::new(Arc::clone(&self.store), config);
        let run_span = tracing::info_span!(
            parent: &message_span,
            "transform",
            run_id = %pipeline.run_id(),
            version = %pipeline.config().version
        );
        let summary = pipeline.with_span(run_span).generate_dataset().await?;

        message_span.in_scope(|| {
            tracing::info!(version = %summary.version, "Dataset generated successfully")
        });
        Ok(summary)
    }
}

impl From<QueueMessage> for QueueEvent {
    fn from(message: QueueMessage) -> Self {
        Self {
            records: vec![message],
        }
    }
}

/// Decode a single payload without running it.
pub fn decode_message(message: &QueueMessage) -> Result<SplitConfig, TransformError> {
    SplitConfig::from_json(&message.body)
}
