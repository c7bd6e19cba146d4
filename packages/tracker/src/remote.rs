//! Collaborator interfaces consumed by the tracker.
//!
//! - [`RemoteSave`]: issues the save described by a data instruction
//! - [`RemoteSync`]: receives flushed [`RemoteQueue`](crate::RemoteQueue) ops
//! - [`SelectionResolver`]: supplies a default affected node
//!
//! A save either completes synchronously ([`Dispatch::Complete`]) or stays
//! pending until the host hands the outcome to
//! [`ActionTracker::receive`](crate::ActionTracker::receive) with the
//! request's ticket, exactly once.

use crate::errors::RemoteSaveError;
use crate::registry::NodeRef;
use crate::rsb::RemoteOp;
use crate::undo_data::CommandId;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Header carrying the action start time as a concurrency token
pub const ACTION_START_HEADER: &str = "X-Action-Start";

/// Identifies one dispatched save
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SaveTicket(pub(crate) u64);

impl fmt::Display for SaveTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ticket-{}", self.0)
    }
}

/// Everything a remote endpoint needs to persist one command
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub ticket: SaveTicket,
    pub command: CommandId,
    pub tracker: String,
    pub action: String,
    /// The raw data instruction
    pub instruction: String,
    pub scheme: String,
    pub target: String,
    /// Instruction arguments bound against the current document state
    pub payload: Vec<Value>,
    pub headers: BTreeMap<String, String>,
    pub undo: bool,
    pub multicall: bool,
    pub userdata: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveResult {
    Success { data: Option<Value> },
    /// The endpoint accepted the save with a warning
    Partial { data: Option<Value>, message: String },
    Error(RemoteSaveError),
}

impl SaveResult {
    pub fn success() -> Self {
        SaveResult::Success { data: None }
    }

    pub fn error(message: impl Into<String>) -> Self {
        SaveResult::Error(RemoteSaveError::new(message))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SaveResult::Error(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    /// Outcome arrives later through `ActionTracker::receive`
    Pending,
    Complete(SaveResult),
}

/// The remote-save primitive
pub trait RemoteSave: Send {
    fn save_data(&mut self, request: SaveRequest) -> Dispatch;
}

/// Sink for flushed remote sync queues
pub trait RemoteSync: Send {
    fn process_queue(&mut self, model: Option<&str>, ops: Vec<RemoteOp>);
}

/// Supplies the acting node's current selection
pub trait SelectionResolver: Send {
    fn resolve_selection(&self, acting: &NodeRef) -> Option<NodeRef>;
}

/// Remote that accepts every save immediately
#[derive(Debug, Default)]
pub struct LocalOnly;

impl RemoteSave for LocalOnly {
    fn save_data(&mut self, request: SaveRequest) -> Dispatch {
        info!(
            command = %request.command,
            action = %request.action,
            instruction = %request.instruction,
            undo = request.undo,
            "Save accepted locally"
        );
        Dispatch::Complete(SaveResult::success())
    }
}

/// Shared handle onto the requests issued by a [`DeferredRemote`]
#[derive(Debug, Clone, Default)]
pub struct PendingRequests(Arc<Mutex<VecDeque<SaveRequest>>>);

impl PendingRequests {
    /// Take every request issued so far, oldest first
    pub fn take(&self) -> Vec<SaveRequest> {
        let mut queue = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&self, request: SaveRequest) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(request);
    }
}

/// Remote whose saves all stay pending until the host answers them
#[derive(Debug, Default)]
pub struct DeferredRemote {
    pending: PendingRequests,
}

impl DeferredRemote {
    pub fn new() -> (Self, PendingRequests) {
        let pending = PendingRequests::default();
        (
            Self {
                pending: pending.clone(),
            },
            pending,
        )
    }
}

impl RemoteSave for DeferredRemote {
    fn save_data(&mut self, request: SaveRequest) -> Dispatch {
        self.pending.push(request);
        Dispatch::Pending
    }
}
