//! Batch progress events and their broadcast channel.
//!
//! The session orchestrator emits a [`BatchEvent`] at every site boundary.
//! Events flow through a `tokio::sync::broadcast` channel to any number of
//! subscribers (the CLI progress bar, a JSON event log). With no subscriber
//! the events are dropped.

use crate::model::Library;
use serde::{Deserialize, Serialize};

/// One batch progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BatchEvent {
    BatchStarted { total: usize },
    /// A session for `url` is about to open.
    SiteStarted { index: usize, url: String },
    SiteCompleted {
        index: usize,
        url: String,
        libraries: Vec<Library>,
        captured_calls: usize,
        elapsed_ms: u64,
    },
    /// The site produced no record; `cause` is truncated.
    SiteFailed {
        index: usize,
        url: String,
        cause: String,
    },
    /// Pausing before the next session.
    Waiting { delay_ms: u64 },
    BatchCompleted {
        analyzed: usize,
        failed: usize,
        elapsed_ms: u64,
    },
}

pub type ProgressSender = tokio::sync::broadcast::Sender<BatchEvent>;
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<BatchEvent>;

/// Create a progress channel. A batch emits at most four events per site.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Emit an event if anyone may be listening; send errors are ignored.
pub fn emit(tx: Option<&ProgressSender>, event: BatchEvent) {
    if let Some(sender) = tx {
        let _ = sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = BatchEvent::SiteCompleted {
            index: 1,
            url: "https://site.test/".into(),
            libraries: vec![Library::Gsap, Library::ScrollTrigger],
            captured_calls: 12,
            elapsed_ms: 5400,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"SiteCompleted""#));
        assert!(json.contains(r#""scroll_trigger""#));

        let parsed: BatchEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_emit_without_receivers() {
        let (tx, rx) = channel();
        drop(rx);
        emit(Some(&tx), BatchEvent::BatchStarted { total: 3 });
        emit(None, BatchEvent::Waiting { delay_ms: 10 });
    }

    #[test]
    fn test_late_subscriber_misses_earlier_events() {
        let (tx, _keep) = channel();
        emit(Some(&tx), BatchEvent::BatchStarted { total: 2 });
        let mut late = tx.subscribe();
        emit(Some(&tx), BatchEvent::Waiting { delay_ms: 2000 });
        let event = tokio_test::block_on(late.recv()).unwrap();
        assert_eq!(event, BatchEvent::Waiting { delay_ms: 2000 });
    }

    #[tokio::test]
    async fn test_subscriber_receives_in_order() {
        let (tx, mut rx) = channel();
        emit(Some(&tx), BatchEvent::BatchStarted { total: 1 });
        emit(
            Some(&tx),
            BatchEvent::SiteFailed {
                index: 0,
                url: "https://down.test/".into(),
                cause: "net::ERR_NAME_NOT_RESOLVED".into(),
            },
        );
        assert_eq!(rx.recv().await.unwrap(), BatchEvent::BatchStarted { total: 1 });
        assert!(matches!(rx.recv().await.unwrap(), BatchEvent::SiteFailed { index: 0, .. }));
    }
}
