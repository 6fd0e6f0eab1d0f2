//! Transcript reporting.
//!
//! Every recognized utterance (or text-only wake/detect input) is handed to a
//! background worker for analytics capture. Enqueueing never waits: when the
//! queue is full the item is dropped and logged. Sink failures are logged by
//! the worker and never reach a session.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Utc};
use parley_core::AudioFrame;
use serde::Serialize;
use std::sync::Arc;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

const QUEUE_CAPACITY: usize = 256;

/// One transcript, optionally with the audio it was recognized from.
#[derive(Debug, Clone)]
pub struct ReportItem {
    pub session_id: Uuid,
    pub text: String,
    pub audio: Vec<AudioFrame>,
    pub reported_at: DateTime<Utc>,
}

impl ReportItem {
    pub fn new(session_id: Uuid, text: impl Into<String>, audio: Vec<AudioFrame>) -> Self {
        Self {
            session_id,
            text: text.into(),
            audio,
            reported_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn report(&self, item: ReportItem) -> Result<()>;
}

/// Writes reports to the log. Used when no report endpoint is configured.
#[derive(Debug, Default)]
pub struct LogReportSink;

#[async_trait]
impl ReportSink for LogReportSink {
    async fn report(&self, item: ReportItem) -> Result<()> {
        info!(
            session_id = %item.session_id,
            text = %item.text,
            audio_frames = item.audio.len(),
            "transcript"
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct ReportPayload<'a> {
    session_id: Uuid,
    text: &'a str,
    reported_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio: Option<String>,
}

/// POSTs each report as JSON; audio frames are concatenated and base64 encoded.
pub struct HttpReportSink {
    client: reqwest::Client,
    url: String,
}

impl HttpReportSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl ReportSink for HttpReportSink {
    async fn report(&self, item: ReportItem) -> Result<()> {
        let audio = (!item.audio.is_empty()).then(|| {
            let joined: Vec<u8> = item.audio.iter().flat_map(|f| f.iter().copied()).collect();
            base64::engine::general_purpose::STANDARD.encode(joined)
        });
        let payload = ReportPayload {
            session_id: item.session_id,
            text: &item.text,
            reported_at: item.reported_at,
            audio,
        };
        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .context("report request failed")?
            .error_for_status()
            .context("report endpoint rejected the transcript")?;
        Ok(())
    }
}

/// Handle to the report worker. Cheap to clone.
#[derive(Clone)]
pub struct ReportQueue {
    tx: mpsc::Sender<ReportItem>,
}

impl ReportQueue {
    /// Starts the worker that drains the queue into `sink`.
    pub fn spawn(sink: Arc<dyn ReportSink>) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<ReportItem>(QUEUE_CAPACITY);
        let handle = tokio::spawn(async move {
            while let Some(item) = rx.recv().await {
                let session_id = item.session_id;
                if let Err(e) = sink.report(item).await {
                    warn!(%session_id, error = ?e, "failed to deliver transcript report");
                }
            }
            debug!("report queue closed");
        });
        (Self { tx }, handle)
    }

    /// Hands the item to the worker without waiting.
    pub fn enqueue(&self, item: ReportItem) {
        if let Err(e) = self.tx.try_send(item) {
            warn!(error = %e, "dropping transcript report");
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;
    use tokio::sync::Mutex;

    /// Records every report it receives.
    #[derive(Default)]
    pub(crate) struct CapturingSink {
        pub(crate) items: Mutex<Vec<ReportItem>>,
    }

    #[async_trait]
    impl ReportSink for CapturingSink {
        async fn report(&self, item: ReportItem) -> Result<()> {
            self.items.lock().await.push(item);
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl ReportSink for FailingSink {
        async fn report(&self, _item: ReportItem) -> Result<()> {
            anyhow::bail!("sink unavailable")
        }
    }

    #[tokio::test]
    async fn enqueued_items_reach_the_sink_in_order() {
        let sink = Arc::new(CapturingSink::default());
        let (queue, _worker) = ReportQueue::spawn(sink.clone());
        let id = Uuid::new_v4();

        queue.enqueue(ReportItem::new(id, "first", vec![Bytes::from_static(b"a")]));
        queue.enqueue(ReportItem::new(id, "second", vec![]));
        tokio::time::sleep(Duration::from_millis(20)).await;

        let items = sink.items.lock().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].text, "first");
        assert_eq!(items[0].audio.len(), 1);
        assert_eq!(items[1].text, "second");
    }

    #[tokio::test]
    async fn sink_failure_does_not_stop_the_worker() {
        let (queue, worker) = ReportQueue::spawn(Arc::new(FailingSink));

        queue.enqueue(ReportItem::new(Uuid::new_v4(), "lost", vec![]));
        queue.enqueue(ReportItem::new(Uuid::new_v4(), "lost too", vec![]));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!worker.is_finished());
        drop(queue);
        worker.await.unwrap();
    }
}
