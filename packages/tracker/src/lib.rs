//! # Actionlog Tracker
//!
//! Durable, replayable command log with undo/redo for tree-structured
//! documents.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ caller: ActionSpec (typed Action + extra)   │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ tracker: history + transactions + saves     │
//! │  - preparse data instruction                │
//! │  - apply locally, push on undo stack        │
//! │  - dispatch saves one at a time             │
//! │  - receive outcome, drain remote queue      │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ remote: RemoteSave + RemoteSync             │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Commands can be exported to [`Envelope`]s at any time, persisted through
//! an [`OfflineStore`] and resumed into a tracker later, even into freshly
//! loaded documents.
//!
//! ## Core Principles
//!
//! 1. **Local first**: mutations apply immediately, saves confirm later
//! 2. **Ordered saves**: at most one save per tracker is in flight
//! 3. **No globals**: models and resolvers are passed in explicitly
//! 4. **Failures surface**: a failed save is never dropped silently
//!
//! ## Usage
//!
//! ```rust,ignore
//! use actionlog_tracker::{Action, ActionSpec, ActionTracker, LocalOnly, ModelRegistry};
//!
//! let mut models = ModelRegistry::new();
//! let books = models.register("books", XmlDocument::parse(source)?);
//!
//! let mut tracker = ActionTracker::new("books", Box::new(LocalOnly));
//! tracker.execute(&mut models, ActionSpec::new(Action::SetProperty {
//!     node: book,
//!     name: "title".to_string(),
//!     value: Some("Dune".to_string()),
//! }))?;
//!
//! // Persist what has not been confirmed yet
//! let batch = tracker.export_pending(&mut Resolver::default(), &mut models);
//! store.save(&batch.envelopes)?;
//! ```

mod action;
mod config;
#[cfg(feature = "async")]
mod driver;
mod errors;
mod instruction;
mod offline;
mod registry;
mod remote;
mod resolver;
mod rsb;
mod tracker;
mod undo_data;

pub use action::{Action, Arg, ArgRef, Extra, OLD_BEFORE, OLD_PARENT, OLD_VALUE};
pub use config::{TrackerConfig, DEFAULT_CONFIG_NAME};
#[cfg(feature = "async")]
pub use driver::{ChannelRemote, SaveDriver, SaveService};
pub use errors::{
    ConfigError, InstructionError, RemoteSaveError, SerializationError, StoreError, TrackerError,
};
pub use instruction::{DataInstruction, InstructionArg, LOCAL_SCHEME};
pub use offline::{JsonLinesStore, MemoryStore, OfflineStore};
pub use registry::{Model, ModelId, ModelRegistry, NodeRef};
pub use remote::{
    DeferredRemote, Dispatch, LocalOnly, PendingRequests, RemoteSave, RemoteSync, SaveRequest,
    SaveResult, SaveTicket, SelectionResolver, ACTION_START_HEADER,
};
pub use resolver::{NodeDescriptor, Resolver, DEFAULT_ID_ATTRIBUTE};
pub use rsb::{RemoteOp, RemoteQueue};
pub use tracker::{ActionTracker, ExportBatch, ResumeMode, SaveCallback, DEFAULT_MAX_UNDO};
pub use undo_data::{
    ActionRule, ActionSpec, CommandId, CommandState, Envelope, IdGenerator, ImportContext,
    OfflineEntry, OnFail, ParsedFlag, Preparsed, SerialArg, UndoData,
};

pub use actionlog_markup::{NodeId, XmlDocument};
