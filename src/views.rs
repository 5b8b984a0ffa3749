//! View side effect
//!
//! A single-item read bumps the view counter and, for a known viewer, records the
//! item in their watch history. The update runs in a detached task after the read
//! has produced its payload. Failures are logged and counted, never surfaced: a
//! dropped increment only makes a display counter slightly low.

use crate::error::Result;
use crate::models::{ContentId, ProfileId};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub const VIEWS_DROPPED_METRIC: &str = "streamhub_view_increments_dropped_total";

/// Destination of view events
#[async_trait]
pub trait ViewSink: Send + Sync {
    async fn record_view(&self, content: ContentId, viewer: Option<ProfileId>) -> Result<()>;
}

/// Fires view events without blocking the caller
#[derive(Clone)]
pub struct ViewTrigger {
    sink: Arc<dyn ViewSink>,
}

impl ViewTrigger {
    pub fn new(sink: Arc<dyn ViewSink>) -> Self {
        Self { sink }
    }

    /// Spawn the side effect. Callers normally drop the handle; tests await it.
    pub fn fire(&self, content: ContentId, viewer: Option<ProfileId>) -> JoinHandle<()> {
        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            match sink.record_view(content, viewer).await {
                Ok(()) => debug!(content_id = %content, "View recorded"),
                Err(e) => {
                    warn!(content_id = %content, error = %e, "View increment dropped");
                    metrics::counter!(VIEWS_DROPPED_METRIC).increment(1);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSink {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ViewSink for CountingSink {
        async fn record_view(&self, _content: ContentId, _viewer: Option<ProfileId>) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::database("connection reset"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_fire_records_view() {
        let sink = Arc::new(CountingSink::default());
        let trigger = ViewTrigger::new(sink.clone());

        trigger.fire(ContentId::new(), None).await.unwrap();
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failure_is_swallowed() {
        let sink = Arc::new(CountingSink {
            fail: true,
            ..Default::default()
        });
        let trigger = ViewTrigger::new(sink.clone());

        // The task completes normally even though the sink failed
        let outcome = trigger.fire(ContentId::new(), Some(ProfileId::new())).await;
        assert!(outcome.is_ok());
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }
}
