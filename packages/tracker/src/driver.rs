//! Async save driver.
//!
//! [`ChannelRemote`] is the tracker's [`RemoteSave`]: it forwards every
//! request into a channel and reports it pending. [`SaveDriver`] runs the
//! requests against an async [`SaveService`] as spawned tasks and feeds the
//! results back through [`ActionTracker::receive`].
//!
//! ```text
//! tracker ──SaveRequest──▶ ChannelRemote ──mpsc──▶ SaveDriver ──spawn──▶ SaveService
//!    ▲                                                 │
//!    └──────────────── receive(ticket, result) ◀───────┘
//! ```

use crate::errors::TrackerError;
use crate::registry::ModelRegistry;
use crate::remote::{Dispatch, RemoteSave, SaveRequest, SaveResult, SaveTicket};
use crate::tracker::ActionTracker;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Async endpoint that performs saves
pub trait SaveService: Send + Sync + 'static {
    fn save(&self, request: SaveRequest) -> impl Future<Output = SaveResult> + Send;
}

/// Remote that hands requests to a [`SaveDriver`]
#[derive(Debug, Clone)]
pub struct ChannelRemote {
    requests: mpsc::UnboundedSender<SaveRequest>,
}

impl RemoteSave for ChannelRemote {
    fn save_data(&mut self, request: SaveRequest) -> Dispatch {
        let ticket = request.ticket;
        match self.requests.send(request) {
            Ok(()) => Dispatch::Pending,
            Err(_) => {
                warn!(ticket = %ticket, "Save driver is gone");
                Dispatch::Complete(SaveResult::error("save driver stopped"))
            }
        }
    }
}

pub struct SaveDriver<S> {
    service: Arc<S>,
    requests: mpsc::UnboundedReceiver<SaveRequest>,
    results_tx: mpsc::UnboundedSender<(SaveTicket, SaveResult)>,
    results: mpsc::UnboundedReceiver<(SaveTicket, SaveResult)>,
    in_flight: usize,
}

impl<S: SaveService> SaveDriver<S> {
    pub fn new(service: S) -> (Self, ChannelRemote) {
        let (requests_tx, requests) = mpsc::unbounded_channel();
        let (results_tx, results) = mpsc::unbounded_channel();
        (
            Self {
                service: Arc::new(service),
                requests,
                results_tx,
                results,
                in_flight: 0,
            },
            ChannelRemote {
                requests: requests_tx,
            },
        )
    }

    fn spawn_requests(&mut self) {
        while let Ok(request) = self.requests.try_recv() {
            let service = Arc::clone(&self.service);
            let results = self.results_tx.clone();
            self.in_flight += 1;
            tokio::spawn(async move {
                let ticket = request.ticket;
                let result = service.save(request).await;
                if results.send((ticket, result)).is_err() {
                    debug!(ticket = %ticket, "Save finished after the driver stopped");
                }
            });
        }
    }

    /// Run saves until the tracker has nothing left in flight.
    ///
    /// Returns the number of outcomes delivered.
    pub async fn settle(
        &mut self,
        tracker: &mut ActionTracker,
        models: &ModelRegistry,
    ) -> Result<usize, TrackerError> {
        let mut delivered = 0;
        loop {
            self.spawn_requests();
            if self.in_flight == 0 {
                break;
            }
            let Some((ticket, result)) = self.results.recv().await else {
                break;
            };
            self.in_flight -= 1;
            tracker.receive(models, ticket, result)?;
            delivered += 1;
        }
        debug!(tracker = tracker.name(), delivered, "Save driver settled");
        Ok(delivered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::registry::NodeRef;
    use crate::undo_data::{ActionRule, ActionSpec, CommandState, OnFail};
    use actionlog_markup::XmlDocument;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<(String, bool)>>,
    }

    impl SaveService for Arc<Recording> {
        fn save(&self, request: SaveRequest) -> impl Future<Output = SaveResult> + Send {
            let this = Arc::clone(self);
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                let fail = request.payload.first() == Some(&serde_json::Value::from("bad"));
                this.seen
                    .lock()
                    .unwrap()
                    .push((request.action.clone(), request.undo));
                if fail {
                    SaveResult::error("rejected")
                } else {
                    SaveResult::success()
                }
            }
        }
    }

    fn setup() -> (ModelRegistry, NodeRef) {
        let mut models = ModelRegistry::new();
        let id = models.register("doc", XmlDocument::parse("<doc><p/></doc>").unwrap());
        let doc = models.document(id).unwrap();
        let p = NodeRef::new(id, doc.children(doc.root())[0]);
        (models, p)
    }

    fn set(p: &NodeRef, value: &str) -> ActionSpec {
        ActionSpec::new(Action::SetProperty {
            node: p.clone(),
            name: "v".to_string(),
            value: Some(value.to_string()),
        })
    }

    #[tokio::test]
    async fn test_driver_settles_in_order() {
        let (mut models, p) = setup();
        let service = Arc::new(Recording::default());
        let (mut driver, remote) = SaveDriver::new(Arc::clone(&service));
        let mut tracker = ActionTracker::new("async", Box::new(remote))
            .with_rule("setProperty", ActionRule::new("rpc:set({$value})"));

        let a = tracker.execute(&mut models, set(&p, "1")).unwrap();
        let b = tracker.execute(&mut models, set(&p, "2")).unwrap();
        tracker.undo(&mut models, 1).unwrap();
        assert!(tracker.is_saving());

        let delivered = driver.settle(&mut tracker, &models).await.unwrap();
        assert_eq!(delivered, 3);
        assert!(!tracker.is_saving());
        assert_eq!(tracker.command(a).unwrap().state(), CommandState::Committed);
        assert_eq!(tracker.command(b).unwrap().state(), CommandState::Committed);

        let seen = service.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                ("setProperty".to_string(), false),
                ("setProperty".to_string(), false),
                ("setProperty".to_string(), true),
            ]
        );
    }

    #[tokio::test]
    async fn test_driver_stops_on_blocking_failure() {
        let (mut models, p) = setup();
        let (mut driver, remote) = SaveDriver::new(Arc::new(Recording::default()));
        let mut tracker = ActionTracker::new("async", Box::new(remote)).with_rule(
            "setProperty",
            ActionRule::new("rpc:set({$value})").on_fail(OnFail::Block),
        );

        let bad = tracker.execute(&mut models, set(&p, "bad")).unwrap();
        tracker.execute(&mut models, set(&p, "ok")).unwrap();

        assert_eq!(driver.settle(&mut tracker, &models).await.unwrap(), 1);
        assert_eq!(tracker.failed_command().map(|(id, _)| id), Some(bad));
        assert_eq!(tracker.queued_saves(), 1);
        assert!(tracker.is_blocked());
    }
}
