//! # Action Tracker
//!
//! Undo/redo history, grouping transactions and ordered remote saves for one
//! tracked document.
//!
//! ## Design
//!
//! - Executing a command applies it locally right away and pushes it on the
//!   undo stack; the redo stack is cleared
//! - Undo reverts and moves the command to the redo stack, redo reapplies
//! - Every push, undo and redo queues a save; saves are dispatched strictly in
//!   queue order with at most one in flight
//! - A pending save resumes through [`ActionTracker::receive`], the only entry
//!   point for save outcomes
//! - `begin`/`commit` collapse the commands executed in between into one
//!   `group` command; `rollback` reverts them without any remote traffic
//! - A command that leaves the history (evicted past `max_undo`, or dropped
//!   with the redo stack) while one of its saves is still queued or in flight
//!   is retired, not destroyed; it leaves the tracker once the save settles
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut tracker = ActionTracker::new("doc", Box::new(LocalOnly));
//! tracker.execute(&mut models, ActionSpec::new(Action::SetProperty { .. }))?;
//! tracker.undo(&mut models, 1)?;
//! tracker.redo(&mut models, 1)?;
//! ```

use crate::action::Action;
use crate::config::TrackerConfig;
use crate::errors::{RemoteSaveError, SerializationError, TrackerError};
use crate::registry::{ModelRegistry, NodeRef};
use crate::remote::{Dispatch, RemoteSave, RemoteSync, SaveResult, SaveTicket, SelectionResolver};
use crate::resolver::Resolver;
use crate::undo_data::{
    ActionRule, ActionSpec, CommandId, CommandState, Envelope, IdGenerator, ImportContext,
    OfflineEntry, OnFail, SaveStep, UndoData,
};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info, instrument, trace, warn};

/// Default maximum number of undo levels
pub const DEFAULT_MAX_UNDO: usize = 100;

/// Invoked once with the outcome of a command's first save
pub type SaveCallback = Box<dyn FnOnce(CommandId, &SaveResult) + Send>;

/// One queued save
#[derive(Debug, Clone, Copy, PartialEq)]
struct PendingSave {
    command: CommandId,
    undo: bool,
    /// Owning group when this save is one of its expanded members
    group: Option<CommandId>,
    last: bool,
}

impl PendingSave {
    fn top(command: CommandId, undo: bool) -> Self {
        Self {
            command,
            undo,
            group: None,
            last: false,
        }
    }
}

#[derive(Debug)]
struct Transaction {
    context: Option<NodeRef>,
    /// Nested `begin` calls not yet matched by `commit`
    depth: usize,
    members: Vec<UndoData>,
}

/// A command out of the history with saves still outstanding
#[derive(Debug)]
struct Retired {
    data: UndoData,
    /// Whether its local effect is still applied
    applied: bool,
}

/// Dispatch stopped by a failed save
#[derive(Debug)]
struct Halt {
    save: PendingSave,
    policy: OnFail,
    error: RemoteSaveError,
}

/// How resumed offline commands are brought back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeMode {
    /// The documents already reflect the commands; only queue their saves
    Requeue,
    /// Apply each command locally before queueing its save
    Replay,
}

/// Outcome of exporting a set of commands
#[derive(Debug, Default)]
pub struct ExportBatch {
    pub envelopes: Vec<Envelope>,
    /// Commands that could not be serialized; they stay usable in memory
    pub failures: Vec<(CommandId, SerializationError)>,
}

pub struct ActionTracker {
    name: String,

    /// Maximum number of undo levels (0 = unlimited)
    max_undo: usize,

    /// Rules by action name
    rules: HashMap<String, ActionRule>,

    /// Applied commands (most recent last)
    undo_stack: Vec<UndoData>,

    /// Undone commands (most recent last)
    redo_stack: Vec<UndoData>,

    /// Commands out of the history awaiting their saves (oldest first)
    retired: Vec<Retired>,

    transaction: Option<Transaction>,

    /// Saves waiting for dispatch
    queue: VecDeque<PendingSave>,

    in_flight: Option<(SaveTicket, PendingSave)>,

    halted: Option<Halt>,

    remote: Box<dyn RemoteSave>,
    sync: Option<Box<dyn RemoteSync>>,
    selection: Option<Box<dyn SelectionResolver>>,

    /// Exports each command before its local mutation when set
    journal: Option<Resolver>,

    callbacks: HashMap<CommandId, SaveCallback>,
    ids: IdGenerator,
    next_ticket: u64,
}

impl ActionTracker {
    pub fn new(name: impl Into<String>, remote: Box<dyn RemoteSave>) -> Self {
        Self {
            name: name.into(),
            max_undo: DEFAULT_MAX_UNDO,
            rules: HashMap::new(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            retired: Vec::new(),
            transaction: None,
            queue: VecDeque::new(),
            in_flight: None,
            halted: None,
            remote,
            sync: None,
            selection: None,
            journal: None,
            callbacks: HashMap::new(),
            ids: IdGenerator::new(),
            next_ticket: 0,
        }
    }

    /// Create a tracker with the name, history bound and rules of a config
    pub fn from_config(config: &TrackerConfig, remote: Box<dyn RemoteSave>) -> Self {
        Self::new(config.name.clone(), remote)
            .with_max_undo(config.max_undo)
            .with_rules(config.rules.clone())
    }

    pub fn with_max_undo(mut self, max_undo: usize) -> Self {
        self.max_undo = max_undo;
        self
    }

    pub fn with_rules(mut self, rules: HashMap<String, ActionRule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_rule(mut self, action: impl Into<String>, rule: ActionRule) -> Self {
        self.rules.insert(action.into(), rule);
        self
    }

    pub fn with_remote_sync(mut self, sync: Box<dyn RemoteSync>) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn with_selection(mut self, selection: Box<dyn SelectionResolver>) -> Self {
        self.selection = Some(selection);
        self
    }

    /// Journal every executed command right before it mutates the document.
    ///
    /// The journal records describe the documents as each command found
    /// them, so the log returned by [`ActionTracker::journal_pending`] can be
    /// replayed onto the documents it started from.
    pub fn with_journal(mut self, resolver: Resolver) -> Self {
        self.journal = Some(resolver);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rules(&self) -> &HashMap<String, ActionRule> {
        &self.rules
    }

    /// Build a command without applying or recording it.
    ///
    /// Used for the calls of a `multicall`.
    pub fn prepare(&mut self, mut spec: ActionSpec) -> UndoData {
        if spec.rule.is_none() {
            spec.rule = self.rules.get(spec.action.name()).cloned();
        }
        let id = self.ids.next_id();
        UndoData::new(id, spec, &self.name, self.selection.as_deref())
    }

    /// Apply an action and record it
    #[instrument(skip(self, models, spec), fields(tracker = %self.name, action = spec.action.name()))]
    pub fn execute(
        &mut self,
        models: &mut ModelRegistry,
        spec: ActionSpec,
    ) -> Result<CommandId, TrackerError> {
        self.run(models, spec, None)
    }

    /// Apply an action and get told about the outcome of its save
    #[instrument(skip(self, models, spec, callback), fields(tracker = %self.name, action = spec.action.name()))]
    pub fn execute_with_callback(
        &mut self,
        models: &mut ModelRegistry,
        spec: ActionSpec,
        callback: impl FnOnce(CommandId, &SaveResult) + Send + 'static,
    ) -> Result<CommandId, TrackerError> {
        self.run(models, spec, Some(Box::new(callback)))
    }

    fn run(
        &mut self,
        models: &mut ModelRegistry,
        spec: ActionSpec,
        callback: Option<SaveCallback>,
    ) -> Result<CommandId, TrackerError> {
        if let Some(halt) = &self.halted {
            if halt.policy == OnFail::Block {
                return Err(TrackerError::Blocked(halt.save.command));
            }
        }

        let mut data = self.prepare(spec);
        let multicall = is_multicall(&data);
        data.preparse(false, multicall)?;
        if let Some(resolver) = self.journal.as_mut() {
            if let Err(e) = data.begin_journal(resolver, models) {
                warn!(command = %data.id(), error = %e, "Command could not be journaled");
            }
        }
        data.apply(models)?;
        data.finish_journal();

        let id = data.id();
        debug!(command = %id, action = data.name(), "Applied command");
        if let Some(callback) = callback {
            self.callbacks.insert(id, callback);
        }

        if let Some(transaction) = &mut self.transaction {
            transaction.members.push(data);
            return Ok(id);
        }

        self.record(data);
        self.queue_next(models);
        Ok(id)
    }

    /// Push onto the undo stack and queue the forward save
    fn record(&mut self, data: UndoData) {
        let id = data.id();
        for undone in std::mem::take(&mut self.redo_stack) {
            self.retire(undone, false);
        }
        self.undo_stack.push(data);
        if self.max_undo > 0 && self.undo_stack.len() > self.max_undo {
            let evicted = self.undo_stack.remove(0);
            debug!(command = %evicted.id(), "Evicted oldest command");
            self.retire(evicted, true);
        }
        self.queue.push_back(PendingSave::top(id, false));
    }

    /// Keep a command that left the history until its outstanding saves settle
    fn retire(&mut self, data: UndoData, applied: bool) {
        if awaits_save(&data, &self.queue, self.in_flight.as_ref(), self.halted.as_ref()) {
            debug!(command = %data.id(), applied, "Retired command with outstanding saves");
            self.retired.push(Retired { data, applied });
        }
    }

    /// Forget retired commands whose saves have all settled
    fn prune_retired(&mut self) {
        let Self {
            retired,
            queue,
            in_flight,
            halted,
            ..
        } = self;
        retired.retain(|r| {
            let keep = awaits_save(&r.data, queue, in_flight.as_ref(), halted.as_ref());
            if !keep {
                trace!(command = %r.data.id(), "Retired command settled");
            }
            keep
        });
    }

    /// Undo up to `count` commands (at least one); returns how many were undone
    #[instrument(skip(self, models), fields(tracker = %self.name))]
    pub fn undo(&mut self, models: &mut ModelRegistry, count: usize) -> Result<usize, TrackerError> {
        self.step_history(models, count, true)
    }

    /// Redo up to `count` commands (at least one); returns how many were redone
    #[instrument(skip(self, models), fields(tracker = %self.name))]
    pub fn redo(&mut self, models: &mut ModelRegistry, count: usize) -> Result<usize, TrackerError> {
        self.step_history(models, count, false)
    }

    fn step_history(
        &mut self,
        models: &mut ModelRegistry,
        count: usize,
        undo: bool,
    ) -> Result<usize, TrackerError> {
        if self.transaction.is_some() {
            return Err(TrackerError::TransactionOpen(if undo { "undo" } else { "redo" }));
        }

        let mut performed = 0;
        let mut outcome = Ok(());
        while performed < count.max(1) {
            let (from, to) = if undo {
                (&mut self.undo_stack, &mut self.redo_stack)
            } else {
                (&mut self.redo_stack, &mut self.undo_stack)
            };
            let Some(mut data) = from.pop() else {
                debug!(undo, performed, "History underflow");
                break;
            };

            let multicall = is_multicall(&data);
            let step = data
                .preparse(undo, multicall)
                .map_err(TrackerError::from)
                .and_then(|_| if undo { data.revert(models) } else { data.apply(models) });
            if let Err(e) = step {
                from.push(data);
                outcome = Err(e);
                break;
            }

            let id = data.id();
            debug!(command = %id, undo, "Moved command across history");
            to.push(data);
            self.queue.push_back(PendingSave::top(id, undo));
            performed += 1;
        }

        self.queue_next(models);
        outcome.map(|_| performed)
    }

    /// Open a grouping transaction; nested calls deepen the current one
    pub fn begin(&mut self, context: Option<NodeRef>) {
        match &mut self.transaction {
            Some(transaction) => transaction.depth += 1,
            None => {
                self.transaction = Some(Transaction {
                    context,
                    depth: 0,
                    members: Vec::new(),
                })
            }
        }
        trace!(tracker = %self.name, "Transaction opened");
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Close a transaction.
    ///
    /// The outermost commit records the members as one `group` command and
    /// returns its id. An empty transaction records nothing.
    #[instrument(skip(self, models), fields(tracker = %self.name))]
    pub fn commit(&mut self, models: &mut ModelRegistry) -> Result<Option<CommandId>, TrackerError> {
        let transaction = self.transaction.as_mut().ok_or(TrackerError::NoTransaction)?;
        if transaction.depth > 0 {
            transaction.depth -= 1;
            return Ok(None);
        }
        let Some(transaction) = self.transaction.take() else {
            return Err(TrackerError::NoTransaction);
        };
        if transaction.members.is_empty() {
            debug!("Committed empty transaction");
            return Ok(None);
        }

        let count = transaction.members.len();
        let mut group = self.prepare(ActionSpec::new(Action::Group {
            context: transaction.context,
            members: transaction.members,
        }));
        if let Some(resolver) = self.journal.as_mut() {
            if let Err(e) = group.begin_journal(resolver, models) {
                warn!(command = %group.id(), error = %e, "Group could not be journaled");
            }
            group.finish_journal();
        }
        let id = group.id();
        info!(command = %id, members = count, "Committed group");

        self.record(group);
        self.queue_next(models);
        Ok(Some(id))
    }

    /// Discard the open transaction, reverting its members newest first.
    ///
    /// Nothing is sent remotely. Returns how many commands were discarded.
    #[instrument(skip(self, models), fields(tracker = %self.name))]
    pub fn rollback(&mut self, models: &mut ModelRegistry) -> Result<usize, TrackerError> {
        let transaction = self.transaction.take().ok_or(TrackerError::NoTransaction)?;
        let count = transaction.members.len();

        let mut first_error = None;
        for mut member in transaction.members.into_iter().rev() {
            if let Err(e) = member.revert(models) {
                warn!(command = %member.id(), error = %e, "Rollback could not revert command");
                first_error.get_or_insert(e);
            }
            member.clear_remote_queue();
            self.callbacks.remove(&member.id());
        }

        info!(commands = count, "Rolled back transaction");
        match first_error {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }

    /// Hand in the outcome of a pending save
    #[instrument(skip(self, models, result), fields(tracker = %self.name, ticket = %ticket))]
    pub fn receive(
        &mut self,
        models: &ModelRegistry,
        ticket: SaveTicket,
        result: SaveResult,
    ) -> Result<(), TrackerError> {
        match self.in_flight.take() {
            Some((expected, save)) if expected == ticket => {
                self.settle(save, result);
                self.queue_next(models);
                Ok(())
            }
            other => {
                self.in_flight = other;
                Err(TrackerError::UnexpectedReceipt(ticket))
            }
        }
    }

    /// Dispatch queued saves until one is pending or dispatch halts
    fn queue_next(&mut self, models: &ModelRegistry) {
        while self.in_flight.is_none() && self.halted.is_none() {
            let Some(save) = self.queue.pop_front() else {
                break;
            };
            let ticket = SaveTicket(self.next_ticket);

            let Some(data) = locate(
                &mut self.undo_stack,
                &mut self.redo_stack,
                &mut self.retired,
                save.command,
            ) else {
                debug!(command = %save.command, "Command left the tracker before its save");
                self.callbacks.remove(&save.command);
                continue;
            };
            let step = data.save_change(save.undo, ticket, models);

            match step {
                SaveStep::Expand(members) if members.is_empty() => {
                    self.settle(save, SaveResult::success());
                }
                SaveStep::Expand(members) => {
                    let count = members.len();
                    for (index, member) in members.into_iter().enumerate().rev() {
                        self.queue.push_front(PendingSave {
                            command: member,
                            undo: save.undo,
                            group: Some(save.command),
                            last: index + 1 == count,
                        });
                    }
                }
                SaveStep::Complete => self.settle(save, SaveResult::success()),
                SaveStep::Invalid(e) => {
                    warn!(command = %save.command, error = %e, "Data instruction could not be bound");
                    self.settle(save, SaveResult::Error(e.into()));
                }
                SaveStep::Dispatch(request) => {
                    self.next_ticket += 1;
                    debug!(
                        command = %save.command,
                        ticket = %ticket,
                        instruction = %request.instruction,
                        "Dispatching save"
                    );
                    self.in_flight = Some((ticket, save));
                    if let Dispatch::Complete(result) = self.remote.save_data(request) {
                        self.in_flight = None;
                        self.settle(save, result);
                    }
                }
            }
        }
        self.prune_retired();
    }

    /// Record a save outcome on the command and apply the on-fail policy
    fn settle(&mut self, save: PendingSave, result: SaveResult) {
        let error = match &result {
            SaveResult::Error(e) => Some(e.clone()),
            _ => None,
        };
        if let SaveResult::Partial { message, .. } = &result {
            warn!(command = %save.command, message = %message, "Save partially succeeded");
        }

        let policy = match locate(
            &mut self.undo_stack,
            &mut self.redo_stack,
            &mut self.retired,
            save.command,
        ) {
            Some(data) => {
                if let Some(e) = &error {
                    data.set_state(CommandState::Failed);
                    warn!(command = %save.command, error = %e, undo = save.undo, "Save failed");
                } else {
                    data.set_state(CommandState::Committed);
                    let sent = data.process_remote_queue(self.sync.as_deref_mut());
                    debug!(command = %save.command, sent, "Save committed");
                }
                data.on_fail()
            }
            None => {
                warn!(command = %save.command, "Settled command is no longer tracked");
                OnFail::Ignore
            }
        };

        if let Some(callback) = self.callbacks.remove(&save.command) {
            callback(save.command, &result);
        }

        if let Some(group) = save.group {
            if let Some(data) = locate(&mut self.undo_stack, &mut self.redo_stack, &mut self.retired, group) {
                if error.is_some() {
                    data.set_state(CommandState::Failed);
                } else if save.last && data.state() != CommandState::Failed {
                    data.set_state(CommandState::Committed);
                }
            }
            if error.is_some() || save.last {
                if let Some(callback) = self.callbacks.remove(&group) {
                    callback(group, &result);
                }
            }
        }

        if let Some(error) = error {
            if policy != OnFail::Ignore {
                info!(command = %save.command, policy = ?policy, "Dispatch halted");
                self.halted = Some(Halt {
                    save,
                    policy,
                    error,
                });
            }
        }
    }

    /// Dispatch the failed save again
    #[instrument(skip(self, models), fields(tracker = %self.name))]
    pub fn retry(&mut self, models: &ModelRegistry) -> Result<CommandId, TrackerError> {
        let halt = self.halted.take().ok_or(TrackerError::NoFailedCommand)?;
        info!(command = %halt.save.command, "Retrying save");
        self.queue.push_front(halt.save);
        self.queue_next(models);
        Ok(halt.save.command)
    }

    /// Give up on the failed command.
    ///
    /// Its local effect is reverted if still applied, it leaves the history
    /// (a failed group member takes its whole group along), its remote queue
    /// is dropped and dispatch resumes.
    #[instrument(skip(self, models), fields(tracker = %self.name))]
    pub fn revert_failed(&mut self, models: &mut ModelRegistry) -> Result<CommandId, TrackerError> {
        let halt = self.halted.take().ok_or(TrackerError::NoFailedCommand)?;
        let target = halt.save.group.unwrap_or(halt.save.command);

        if let Some(index) = self.undo_stack.iter().position(|c| c.id() == target) {
            let mut data = self.undo_stack.remove(index);
            if let Err(e) = data.revert(models) {
                self.undo_stack.insert(index, data);
                self.halted = Some(halt);
                return Err(e);
            }
            data.clear_remote_queue();
        } else if let Some(index) = self.redo_stack.iter().position(|c| c.id() == target) {
            let mut data = self.redo_stack.remove(index);
            data.clear_remote_queue();
        } else if let Some(index) = self.retired.iter().position(|r| r.data.id() == target) {
            let mut retired = self.retired.remove(index);
            if retired.applied {
                if let Err(e) = retired.data.revert(models) {
                    self.retired.insert(index, retired);
                    self.halted = Some(halt);
                    return Err(e);
                }
            }
            retired.data.clear_remote_queue();
        } else {
            warn!(command = %target, "Failed command already left history");
        }

        self.callbacks.remove(&target);
        self.queue
            .retain(|s| s.command != target && s.group != Some(target));
        info!(command = %target, error = %halt.error, "Reverted failed command");

        self.queue_next(models);
        Ok(target)
    }

    /// Serialize every applied command whose saves have not all been
    /// confirmed, oldest first. Evicted commands still awaiting a save are
    /// included.
    pub fn export_pending(&self, resolver: &mut Resolver, models: &mut ModelRegistry) -> ExportBatch {
        export_commands(self.pending_commands(), resolver, models)
    }

    /// Serialize the whole undo history, oldest first
    pub fn export_history(&self, resolver: &mut Resolver, models: &mut ModelRegistry) -> ExportBatch {
        export_commands(self.undo_stack.iter(), resolver, models)
    }

    /// Journal records of the commands [`ActionTracker::export_pending`]
    /// would serialize.
    ///
    /// Commands executed without a journal are reported as failures.
    pub fn journal_pending(&self) -> ExportBatch {
        let mut batch = ExportBatch::default();
        for data in self.pending_commands() {
            match data.journaled() {
                Some(envelope) => batch.envelopes.push(envelope.clone()),
                None => {
                    warn!(command = %data.id(), "Command has no journal record");
                    batch
                        .failures
                        .push((data.id(), SerializationError::NotJournaled(data.id().to_string())));
                }
            }
        }
        batch
    }

    fn pending_commands(&self) -> impl Iterator<Item = &UndoData> {
        self.retired
            .iter()
            .filter(|r| r.applied)
            .map(|r| &r.data)
            .chain(self.undo_stack.iter())
            .filter(|c| c.state() != CommandState::Committed)
    }

    /// Bring offline commands back into the history and queue their saves
    #[instrument(skip(self, models, resolver, entries), fields(tracker = %self.name, entries = entries.len()))]
    pub fn resume(
        &mut self,
        models: &mut ModelRegistry,
        resolver: &mut Resolver,
        entries: Vec<OfflineEntry>,
        mode: ResumeMode,
    ) -> Result<Vec<CommandId>, TrackerError> {
        let mut resumed = Vec::new();
        let outcome = self.resume_entries(models, resolver, entries, mode, &mut resumed);
        self.queue_next(models);
        info!(resumed = resumed.len(), "Resumed offline commands");
        outcome.map(|_| resumed)
    }

    fn resume_entries(
        &mut self,
        models: &mut ModelRegistry,
        resolver: &mut Resolver,
        entries: Vec<OfflineEntry>,
        mode: ResumeMode,
        resumed: &mut Vec<CommandId>,
    ) -> Result<(), TrackerError> {
        for mut entry in entries {
            let mut ctx = ImportContext {
                resolver: &mut *resolver,
                models: &mut *models,
                rules: &self.rules,
                ids: &mut self.ids,
            };
            entry.import(&mut ctx)?;
            let Some(mut data) = entry.into_imported() else {
                continue;
            };

            if mode == ResumeMode::Replay {
                data.reset_for_replay();
                let multicall = is_multicall(&data);
                data.preparse(false, multicall)?;
                data.apply(models)?;
                data.finish_journal();
            }
            resumed.push(data.id());
            self.record(data);
        }
        Ok(())
    }

    pub fn undo_stack(&self) -> &[UndoData] {
        &self.undo_stack
    }

    pub fn redo_stack(&self) -> &[UndoData] {
        &self.redo_stack
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// Look a command up in the history, the open transaction or among the
    /// retired commands still awaiting a save
    pub fn command(&self, id: CommandId) -> Option<&UndoData> {
        self.undo_stack
            .iter()
            .chain(self.redo_stack.iter())
            .chain(self.retired.iter().map(|r| &r.data))
            .chain(self.transaction.iter().flat_map(|t| t.members.iter()))
            .find_map(|c| c.find(id))
    }

    /// Whether a save is waiting for `receive`
    pub fn is_saving(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn queued_saves(&self) -> usize {
        self.queue.len()
    }

    /// The command whose failed save halted dispatch
    pub fn failed_command(&self) -> Option<(CommandId, &RemoteSaveError)> {
        self.halted.as_ref().map(|h| (h.save.command, &h.error))
    }

    pub fn is_blocked(&self) -> bool {
        matches!(&self.halted, Some(h) if h.policy == OnFail::Block)
    }
}

impl std::fmt::Debug for ActionTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionTracker")
            .field("name", &self.name)
            .field("undo", &self.undo_stack.len())
            .field("redo", &self.redo_stack.len())
            .field("retired", &self.retired.len())
            .field("queued", &self.queue.len())
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

fn is_multicall(data: &UndoData) -> bool {
    matches!(data.action(), Action::Multicall { .. })
}

fn locate<'a>(
    undo: &'a mut [UndoData],
    redo: &'a mut [UndoData],
    retired: &'a mut [Retired],
    id: CommandId,
) -> Option<&'a mut UndoData> {
    undo.iter_mut()
        .chain(redo.iter_mut())
        .chain(retired.iter_mut().map(|r| &mut r.data))
        .find_map(|c| c.find_mut(id))
}

/// Whether a queued, in-flight or halted save belongs to `data` or one of
/// its members
fn awaits_save(
    data: &UndoData,
    queue: &VecDeque<PendingSave>,
    in_flight: Option<&(SaveTicket, PendingSave)>,
    halted: Option<&Halt>,
) -> bool {
    queue
        .iter()
        .chain(in_flight.map(|(_, save)| save))
        .chain(halted.map(|h| &h.save))
        .any(|save| {
            data.find(save.command).is_some()
                || save.group.is_some_and(|group| data.find(group).is_some())
        })
}

fn export_commands<'a>(
    commands: impl Iterator<Item = &'a UndoData>,
    resolver: &mut Resolver,
    models: &mut ModelRegistry,
) -> ExportBatch {
    let mut batch = ExportBatch::default();
    for data in commands {
        match data.export(resolver, models) {
            Ok(envelope) => batch.envelopes.push(envelope.clone()),
            Err(e) => {
                warn!(command = %data.id(), error = %e, "Command cannot be persisted");
                batch.failures.push((data.id(), e));
            }
        }
    }
    batch
}
