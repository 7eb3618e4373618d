use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{debug, warn};
use tutor_core::SubmissionRecord;

const COLLECTOR_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("collector request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("collector rejected record with {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Destination for passing submissions.
pub trait RecordSink: Send + Sync {
    fn deliver<'a>(&'a self, record: &'a SubmissionRecord)
    -> BoxFuture<'a, Result<(), CollectorError>>;
}

/// Posts records as JSON to a fixed endpoint and checks the response status.
#[derive(Debug, Clone)]
pub struct HttpCollector {
    client: reqwest::Client,
    url: String,
}

impl HttpCollector {
    pub fn new(url: impl Into<String>) -> Result<Self, CollectorError> {
        let client = reqwest::Client::builder()
            .timeout(COLLECTOR_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl RecordSink for HttpCollector {
    fn deliver<'a>(
        &'a self,
        record: &'a SubmissionRecord,
    ) -> BoxFuture<'a, Result<(), CollectorError>> {
        Box::pin(async move {
            let response = self.client.post(&self.url).json(record).send().await?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(CollectorError::Rejected {
                    status: status.as_u16(),
                    body,
                });
            }
            Ok(())
        })
    }
}

/// Fire-and-forget delivery; failures are logged, never surfaced to the learner.
pub fn spawn_delivery(sink: Arc<dyn RecordSink>, record: SubmissionRecord) {
    tokio::spawn(async move {
        match sink.deliver(&record).await {
            Ok(()) => debug!(question = %record.question_name, "submission delivered"),
            Err(err) => warn!(question = %record.question_name, %err, "submission delivery failed"),
        }
    });
}
