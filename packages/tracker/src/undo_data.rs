//! # Command Objects
//!
//! [`UndoData`] is the durable record of one semantic action: the typed
//! [`Action`], its `extra` values, save bookkeeping and the remote sync
//! queue filled while it was applied.
//!
//! ## Lifecycle
//!
//! ```text
//! pending ──save_change(false)──▶ saving ────┐
//!    │                                       ├──▶ committed
//!    └─────save_change(true)───▶ restoring ──┤
//!                                            └──▶ failed
//! ```
//!
//! ## Offline form
//!
//! [`UndoData::export`] projects a command onto a JSON-safe [`Envelope`].
//! Node references go through a [`Resolver`], so attached nodes become
//! absolute paths and detached subtrees travel as inline markup. The first
//! exported envelope is cached and returned on every later call.
//!
//! A journaling tracker also keeps a second record per command, taken before
//! the command first mutated its documents. It carries the same inverse data
//! and remote queue as a regular export but resolves every reference against
//! the documents as the command found them, so it can be replayed from there.
//!
//! Only one args model per command is supported: every node reference in
//! `args` and `extra` must live in the same model, otherwise export fails
//! with [`SerializationError::ModelMismatch`].

use crate::action::{absolute_path, Action, Arg, ArgRef, Extra};
use crate::errors::{InstructionError, SerializationError, TrackerError};
use crate::instruction::DataInstruction;
use crate::registry::{ModelId, ModelRegistry, NodeRef};
use crate::remote::{RemoteSync, SaveRequest, SaveTicket, SelectionResolver, ACTION_START_HEADER};
use crate::resolver::{NodeDescriptor, Resolver};
use crate::rsb::RemoteQueue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::OnceCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommandId(u64);

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd-{}", self.0)
    }
}

/// Sequential command id source
#[derive(Debug, Default)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> CommandId {
        let id = CommandId(self.next);
        self.next += 1;
        id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandState {
    Pending,
    Saving,
    Restoring,
    Committed,
    Failed,
}

/// What the tracker does after a command's remote save failed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFail {
    /// Keep dispatching the queue
    Ignore,
    /// Halt dispatch until `ActionTracker::retry`
    Retry,
    /// Halt dispatch and refuse new commands
    #[default]
    Block,
}

/// Save configuration of an action
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionRule {
    /// Data instruction for the forward path
    #[serde(default)]
    pub set: Option<String>,
    /// Data instruction for the undo path
    #[serde(default)]
    pub undo: Option<String>,
    #[serde(default)]
    pub on_fail: OnFail,
}

impl ActionRule {
    pub fn new(set: impl Into<String>) -> Self {
        Self {
            set: Some(set.into()),
            ..Self::default()
        }
    }

    pub fn with_undo(mut self, undo: impl Into<String>) -> Self {
        self.undo = Some(undo.into());
        self
    }

    pub fn on_fail(mut self, policy: OnFail) -> Self {
        self.on_fail = policy;
        self
    }

    /// Instruction for one direction; undo falls back to the set path
    pub fn data_instruction(&self, undo: bool) -> Option<&str> {
        if undo {
            self.undo.as_deref().or(self.set.as_deref())
        } else {
            self.set.as_deref()
        }
    }
}

/// Everything the caller specifies to execute an action
#[derive(Debug)]
pub struct ActionSpec {
    pub action: Action,
    pub extra: Extra,
    /// Per-call rule; the tracker's configured rule applies otherwise
    pub rule: Option<ActionRule>,
    /// Node whose selection supplies the default affected node
    pub acting: Option<NodeRef>,
    pub affected: Option<NodeRef>,
    pub remote_model: Option<String>,
    pub userdata: Option<Value>,
}

impl ActionSpec {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            extra: Extra::new(),
            rule: None,
            acting: None,
            affected: None,
            remote_model: None,
            userdata: None,
        }
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<Arg>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    pub fn rule(mut self, rule: ActionRule) -> Self {
        self.rule = Some(rule);
        self
    }

    pub fn acting_node(mut self, node: NodeRef) -> Self {
        self.acting = Some(node);
        self
    }

    pub fn affected(mut self, node: NodeRef) -> Self {
        self.affected = Some(node);
        self
    }

    pub fn remote_model(mut self, name: impl Into<String>) -> Self {
        self.remote_model = Some(name.into());
        self
    }

    pub fn userdata(mut self, data: Value) -> Self {
        self.userdata = Some(data);
        self
    }
}

/// Result of resolving a command's data instruction ahead of saving
#[derive(Debug, Clone, PartialEq)]
pub enum Preparsed {
    NotRun,
    NoInstruction {
        undo: bool,
    },
    /// `local:` scheme, completes without a round trip
    Local {
        undo: bool,
    },
    Remote {
        instruction: DataInstruction,
        undo: bool,
        multicall: bool,
    },
}

impl Preparsed {
    fn is_for(&self, direction: bool) -> bool {
        match self {
            Preparsed::NotRun => false,
            Preparsed::NoInstruction { undo }
            | Preparsed::Local { undo }
            | Preparsed::Remote { undo, .. } => *undo == direction,
        }
    }

    pub fn flag(&self) -> ParsedFlag {
        match self {
            Preparsed::NotRun | Preparsed::NoInstruction { .. } => ParsedFlag::None,
            Preparsed::Local { .. } => ParsedFlag::Local,
            Preparsed::Remote { .. } => ParsedFlag::Remote,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParsedFlag {
    #[default]
    None,
    Local,
    Remote,
}

/// Flat JSON-safe projection of a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub action: String,
    #[serde(default)]
    pub remote_model_name: Option<String>,
    #[serde(default)]
    pub remote_queue: RemoteQueue,
    pub tracker_name: String,
    pub timestamp: i64,
    #[serde(default)]
    pub parsed_flag: ParsedFlag,
    #[serde(default)]
    pub userdata: Option<Value>,
    #[serde(default)]
    pub extra: BTreeMap<String, SerialArg>,
    pub args: Vec<SerialArg>,
    #[serde(default)]
    pub args_model_name: Option<String>,
}

/// Serialized argument.
///
/// Plain objects shaped exactly like a [`NodeDescriptor`] read back as node
/// references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SerialArg {
    Node(NodeDescriptor),
    Commands(Vec<Envelope>),
    Value(Value),
}

/// What the tracker has to do to save a command
#[derive(Debug)]
pub(crate) enum SaveStep {
    /// Group: queue these members instead
    Expand(Vec<CommandId>),
    /// Nothing to send remotely
    Complete,
    Dispatch(SaveRequest),
    Invalid(InstructionError),
}

/// Live handles an import resolves names and descriptors against
pub struct ImportContext<'a> {
    pub resolver: &'a mut Resolver,
    pub models: &'a mut ModelRegistry,
    pub rules: &'a HashMap<String, ActionRule>,
    pub ids: &'a mut IdGenerator,
}

#[derive(Debug)]
pub struct UndoData {
    id: CommandId,
    action: Action,
    affected: Option<NodeRef>,
    state: CommandState,
    /// Wall clock milliseconds at action start
    timestamp: i64,
    extra: Extra,
    remote_queue: RemoteQueue,
    remote_model: Option<String>,
    tracker: String,
    rule: Option<ActionRule>,
    userdata: Option<Value>,
    preparsed: Preparsed,
    exported: OnceCell<Envelope>,
    journaled: Option<Envelope>,
}

impl UndoData {
    pub fn new(
        id: CommandId,
        spec: ActionSpec,
        tracker: &str,
        selection: Option<&dyn SelectionResolver>,
    ) -> Self {
        let affected = spec.affected.clone().or_else(|| {
            default_affected(&spec.action).or_else(|| {
                let acting = spec.acting.as_ref().or(spec.action.primary_node())?;
                selection?.resolve_selection(acting)
            })
        });

        Self {
            id,
            action: spec.action,
            affected,
            state: CommandState::Pending,
            timestamp: chrono::Utc::now().timestamp_millis(),
            extra: spec.extra,
            remote_queue: RemoteQueue::new(),
            remote_model: spec.remote_model,
            tracker: tracker.to_string(),
            rule: spec.rule,
            userdata: spec.userdata,
            preparsed: Preparsed::NotRun,
            exported: OnceCell::new(),
            journaled: None,
        }
    }

    /// Copy-construct from another command.
    ///
    /// Arguments and the remote queue are cloned, the export cache is not
    /// shared and the copy starts out pending. Members get fresh ids.
    pub fn from_existing(other: &UndoData, ids: &mut IdGenerator) -> Self {
        Self {
            id: ids.next_id(),
            action: other.action.duplicate(ids),
            affected: other.affected.clone(),
            state: CommandState::Pending,
            timestamp: other.timestamp,
            extra: other
                .extra
                .iter()
                .map(|(k, v)| (k.clone(), v.duplicate(ids)))
                .collect(),
            remote_queue: other.remote_queue.clone(),
            remote_model: other.remote_model.clone(),
            tracker: other.tracker.clone(),
            rule: other.rule.clone(),
            userdata: other.userdata.clone(),
            preparsed: other.preparsed.clone(),
            exported: OnceCell::new(),
            journaled: None,
        }
    }

    pub fn id(&self) -> CommandId {
        self.id
    }

    pub fn action(&self) -> &Action {
        &self.action
    }

    pub fn name(&self) -> &'static str {
        self.action.name()
    }

    pub fn args(&self) -> Vec<ArgRef<'_>> {
        self.action.args()
    }

    pub fn extra(&self) -> &Extra {
        &self.extra
    }

    pub fn affected(&self) -> Option<&NodeRef> {
        self.affected.as_ref()
    }

    pub fn state(&self) -> CommandState {
        self.state
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn remote_model(&self) -> Option<&str> {
        self.remote_model.as_deref()
    }

    pub fn tracker(&self) -> &str {
        &self.tracker
    }

    pub fn rule(&self) -> Option<&ActionRule> {
        self.rule.as_ref()
    }

    pub fn userdata(&self) -> Option<&Value> {
        self.userdata.as_ref()
    }

    pub fn remote_queue(&self) -> &RemoteQueue {
        &self.remote_queue
    }

    pub fn preparsed(&self) -> &Preparsed {
        &self.preparsed
    }

    pub fn is_exported(&self) -> bool {
        self.exported.get().is_some()
    }

    pub fn journaled(&self) -> Option<&Envelope> {
        self.journaled.as_ref()
    }

    pub fn on_fail(&self) -> OnFail {
        self.rule.as_ref().map(|r| r.on_fail).unwrap_or_default()
    }

    pub(crate) fn set_state(&mut self, state: CommandState) {
        trace!(command = %self.id, from = ?self.state, to = ?state, "State change");
        self.state = state;
    }

    /// Node data instructions bind against
    pub fn context_node(&self) -> Option<&NodeRef> {
        self.affected.as_ref().or(self.action.primary_node())
    }

    /// Value of a named action argument or `extra` entry.
    ///
    /// Node references evaluate to their absolute path.
    pub fn named_value(&self, key: &str, models: &ModelRegistry) -> Option<Value> {
        let arg = self
            .action
            .named_arg(key)
            .or_else(|| self.extra.get(key).map(Arg::view))?;
        Some(match arg {
            ArgRef::Value(value) => value,
            ArgRef::Node(node) => models
                .document(node.model)
                .map(|doc| absolute_path(doc, node.node))
                .unwrap_or(Value::Null),
            ArgRef::Commands(commands) => Value::from(commands.len()),
        })
    }

    /// Resolve and check the data instruction for one direction.
    ///
    /// Runs before the local mutation so a malformed instruction blocks the
    /// action.
    pub fn preparse(&mut self, undo: bool, multicall: bool) -> Result<(), InstructionError> {
        if let Action::Group { members, .. } = &mut self.action {
            for member in members.iter_mut() {
                member.preparse(undo, false)?;
            }
            self.preparsed = Preparsed::NoInstruction { undo };
            return Ok(());
        }

        let preparsed = match self.rule.as_ref().and_then(|r| r.data_instruction(undo)) {
            None => Preparsed::NoInstruction { undo },
            Some(raw) => {
                let instruction = DataInstruction::parse(raw)?;
                instruction.check_bindings(self.context_node().is_some(), |name| {
                    self.action.named_arg(name).is_some() || self.extra.contains_key(name)
                })?;
                if instruction.is_local() {
                    Preparsed::Local { undo }
                } else {
                    Preparsed::Remote {
                        instruction,
                        undo,
                        multicall,
                    }
                }
            }
        };
        trace!(command = %self.id, undo, flag = ?preparsed.flag(), "Preparsed");
        self.preparsed = preparsed;
        Ok(())
    }

    /// Apply the local effect.
    ///
    /// Composite actions apply their members in order and revert the
    /// already-applied ones when a member fails.
    pub(crate) fn apply(&mut self, models: &mut ModelRegistry) -> Result<(), TrackerError> {
        if self.action.is_composite() {
            let members = self.action.members_mut();
            for index in 0..members.len() {
                if let Err(e) = members[index].apply(models) {
                    for member in members[..index].iter_mut().rev() {
                        if let Err(revert) = member.revert(models) {
                            warn!(command = %member.id, error = %revert, "Could not revert member");
                        }
                    }
                    return Err(e);
                }
            }
            return Ok(());
        }

        let op = self.action.apply_leaf(models, &mut self.extra)?;
        self.remote_queue.enqueue(op);
        Ok(())
    }

    /// Revert the local effect; composite members go in reverse order
    pub(crate) fn revert(&mut self, models: &mut ModelRegistry) -> Result<(), TrackerError> {
        if self.action.is_composite() {
            for member in self.action.members_mut().iter_mut().rev() {
                member.revert(models)?;
            }
            return Ok(());
        }

        let op = self.action.revert_leaf(models, &self.extra)?;
        self.remote_queue.enqueue(op);
        Ok(())
    }

    /// Project onto the offline envelope.
    ///
    /// The first successful export is cached; later calls return the same
    /// envelope even if the document changed in between.
    pub fn export(
        &self,
        resolver: &mut Resolver,
        models: &mut ModelRegistry,
    ) -> Result<&Envelope, SerializationError> {
        if let Some(envelope) = self.exported.get() {
            trace!(command = %self.id, "Export cache hit");
            return Ok(envelope);
        }

        let envelope = self.envelope(&Extra::new(), false, resolver, models)?;
        debug!(command = %self.id, action = self.action.name(), "Exported command");
        Ok(self.exported.get_or_init(|| envelope))
    }

    /// Record the command against the documents before `apply` changes them.
    ///
    /// Inverse data is taken from the current documents. The remote queue is
    /// added by [`UndoData::finish_journal`] once the command ran.
    pub(crate) fn begin_journal(
        &mut self,
        resolver: &mut Resolver,
        models: &mut ModelRegistry,
    ) -> Result<(), SerializationError> {
        let envelope = self.journal_entry(resolver, models)?;
        debug!(command = %self.id, action = self.action.name(), "Journaled command");
        self.journaled = Some(envelope);
        Ok(())
    }

    /// Copy the remote ops produced by `apply` into the journal record
    pub(crate) fn finish_journal(&mut self) {
        if let Some(mut envelope) = self.journaled.take() {
            fill_remote_queues(&mut envelope, self);
            self.journaled = Some(envelope);
        }
    }

    /// Turn an imported command back into one that has not run yet.
    ///
    /// Its envelope becomes the journal record; the export cache and the
    /// remote queues start out empty.
    pub(crate) fn reset_for_replay(&mut self) {
        if let Some(envelope) = self.exported.take() {
            self.journaled = Some(envelope);
        }
        self.remote_queue.clear();
        for member in self.action.members_mut() {
            member.reset_for_replay();
        }
    }

    /// The existing journal record, or one describing the documents as they
    /// are now
    fn journal_entry(
        &self,
        resolver: &mut Resolver,
        models: &mut ModelRegistry,
    ) -> Result<Envelope, SerializationError> {
        if let Some(envelope) = &self.journaled {
            return Ok(envelope.clone());
        }
        let mut inverse = Extra::new();
        self.action.record_inverse(models, &mut inverse);
        self.envelope(&inverse, true, resolver, models)
    }

    /// Build an envelope; `inverse` entries take precedence over `extra`
    fn envelope(
        &self,
        inverse: &Extra,
        journal: bool,
        resolver: &mut Resolver,
        models: &mut ModelRegistry,
    ) -> Result<Envelope, SerializationError> {
        let mut args_model = None;
        let mut args = Vec::new();
        for arg in self.action.args() {
            args.push(export_arg(arg, journal, resolver, models, &mut args_model)?);
        }
        let mut extra = BTreeMap::new();
        for (key, value) in self.extra.iter().chain(inverse) {
            extra.insert(
                key.clone(),
                export_arg(value.view(), journal, resolver, models, &mut args_model)?,
            );
        }

        let args_model_name = match args_model {
            Some(id) => Some(
                models
                    .name(id)
                    .ok_or(SerializationError::UnknownModelId(id))?
                    .to_string(),
            ),
            None => None,
        };

        Ok(Envelope {
            action: self.action.name().to_string(),
            remote_model_name: self.remote_model.clone(),
            remote_queue: self.remote_queue.clone(),
            tracker_name: self.tracker.clone(),
            timestamp: self.timestamp,
            parsed_flag: self.preparsed.flag(),
            userdata: self.userdata.clone(),
            extra,
            args,
            args_model_name,
        })
    }

    /// Rebuild a live command from its envelope.
    ///
    /// The envelope becomes the command's cached export.
    pub fn import(envelope: &Envelope, ctx: &mut ImportContext<'_>) -> Result<Self, SerializationError> {
        let args_model = envelope
            .args_model_name
            .as_deref()
            .map(|name| {
                ctx.models
                    .lookup(name)
                    .ok_or_else(|| SerializationError::UnknownModel(name.to_string()))
            })
            .transpose()?;

        let args = envelope
            .args
            .iter()
            .map(|arg| import_arg(arg, args_model, ctx))
            .collect::<Result<Vec<_>, _>>()?;
        let action = Action::from_args(&envelope.action, args)?;

        let mut extra = Extra::new();
        for (key, value) in &envelope.extra {
            extra.insert(key.clone(), import_arg(value, args_model, ctx)?);
        }

        debug!(action = %envelope.action, tracker = %envelope.tracker_name, "Imported command");
        Ok(Self {
            id: ctx.ids.next_id(),
            affected: default_affected(&action),
            rule: ctx.rules.get(action.name()).cloned(),
            action,
            state: CommandState::Pending,
            timestamp: envelope.timestamp,
            extra,
            remote_queue: envelope.remote_queue.clone(),
            remote_model: envelope.remote_model_name.clone(),
            tracker: envelope.tracker_name.clone(),
            userdata: envelope.userdata.clone(),
            preparsed: Preparsed::NotRun,
            exported: OnceCell::from(envelope.clone()),
            journaled: None,
        })
    }

    /// Work out how to save this command in one direction
    pub(crate) fn save_change(&mut self, undo: bool, ticket: SaveTicket, models: &ModelRegistry) -> SaveStep {
        let started = if undo {
            CommandState::Restoring
        } else {
            CommandState::Saving
        };

        if let Action::Group { members, .. } = &self.action {
            let mut ids: Vec<CommandId> = members.iter().map(|m| m.id).collect();
            if undo {
                ids.reverse();
            }
            if !ids.is_empty() {
                self.set_state(started);
            }
            return SaveStep::Expand(ids);
        }

        if !self.preparsed.is_for(undo) {
            let multicall = matches!(self.action, Action::Multicall { .. });
            if let Err(e) = self.preparse(undo, multicall) {
                return SaveStep::Invalid(e);
            }
        }

        let (instruction, multicall) = match &self.preparsed {
            Preparsed::Remote {
                instruction,
                multicall,
                ..
            } => (instruction, *multicall),
            _ => return SaveStep::Complete,
        };

        let context = self
            .context_node()
            .and_then(|node| models.document(node.model).map(|doc| (doc, node.node)));
        let payload = match instruction.bind(context, |name| self.named_value(name, models)) {
            Ok(payload) => payload,
            Err(e) => return SaveStep::Invalid(e),
        };

        let mut headers = BTreeMap::new();
        headers.insert(ACTION_START_HEADER.to_string(), self.timestamp.to_string());

        let request = SaveRequest {
            ticket,
            command: self.id,
            tracker: self.tracker.clone(),
            action: self.action.name().to_string(),
            instruction: instruction.raw.clone(),
            scheme: instruction.scheme.clone(),
            target: instruction.target.clone(),
            payload,
            headers,
            undo,
            multicall,
            userdata: self.userdata.clone(),
        };
        self.set_state(started);
        SaveStep::Dispatch(request)
    }

    /// Flush queued remote ops, including those of multicall members
    pub(crate) fn process_remote_queue(
        &mut self,
        mut sink: Option<&mut (dyn RemoteSync + 'static)>,
    ) -> usize {
        let mut sent = self
            .remote_queue
            .process(self.remote_model.as_deref(), sink.as_deref_mut());
        if let Action::Multicall { calls } = &mut self.action {
            for call in calls.iter_mut() {
                sent += call.process_remote_queue(sink.as_deref_mut());
            }
        }
        sent
    }

    /// Drop queued remote ops here and in every member
    pub(crate) fn clear_remote_queue(&mut self) {
        self.remote_queue.clear();
        for member in self.action.members_mut() {
            member.clear_remote_queue();
        }
    }

    pub(crate) fn find(&self, id: CommandId) -> Option<&UndoData> {
        if self.id == id {
            return Some(self);
        }
        self.action.members().iter().find_map(|m| m.find(id))
    }

    pub(crate) fn find_mut(&mut self, id: CommandId) -> Option<&mut UndoData> {
        if self.id == id {
            return Some(self);
        }
        self.action
            .members_mut()
            .iter_mut()
            .find_map(|m| m.find_mut(id))
    }
}

/// Observational equality: what the command does, not its bookkeeping
impl PartialEq for UndoData {
    fn eq(&self, other: &Self) -> bool {
        self.action == other.action
            && self.extra == other.extra
            && self.timestamp == other.timestamp
            && self.remote_model == other.remote_model
            && self.tracker == other.tracker
    }
}

/// One entry of an offline log
#[derive(Debug)]
pub enum OfflineEntry {
    Exported(Envelope),
    Imported(UndoData),
}

impl OfflineEntry {
    /// Turn the envelope into a live command; a no-op once imported
    pub fn import(&mut self, ctx: &mut ImportContext<'_>) -> Result<(), SerializationError> {
        if let OfflineEntry::Exported(envelope) = self {
            let data = UndoData::import(envelope, ctx)?;
            *self = OfflineEntry::Imported(data);
        }
        Ok(())
    }

    pub fn is_imported(&self) -> bool {
        matches!(self, OfflineEntry::Imported(_))
    }

    pub fn imported(&self) -> Option<&UndoData> {
        match self {
            OfflineEntry::Imported(data) => Some(data),
            OfflineEntry::Exported(_) => None,
        }
    }

    pub fn into_imported(self) -> Option<UndoData> {
        match self {
            OfflineEntry::Imported(data) => Some(data),
            OfflineEntry::Exported(_) => None,
        }
    }
}

impl From<Envelope> for OfflineEntry {
    fn from(envelope: Envelope) -> Self {
        OfflineEntry::Exported(envelope)
    }
}

fn default_affected(action: &Action) -> Option<NodeRef> {
    match action {
        Action::Remove { node } => Some(node.clone()),
        _ => None,
    }
}

fn export_arg(
    arg: ArgRef<'_>,
    journal: bool,
    resolver: &mut Resolver,
    models: &mut ModelRegistry,
    args_model: &mut Option<ModelId>,
) -> Result<SerialArg, SerializationError> {
    match arg {
        ArgRef::Value(value) => Ok(SerialArg::Value(value)),
        ArgRef::Node(node) => {
            match *args_model {
                Some(first) if first != node.model => {
                    let name = |id| models.name(id).unwrap_or("<unknown>").to_string();
                    return Err(SerializationError::ModelMismatch {
                        first: name(first),
                        other: name(node.model),
                    });
                }
                Some(_) => {}
                None => *args_model = Some(node.model),
            }
            Ok(SerialArg::Node(resolver.serialize(node, models)?))
        }
        ArgRef::Commands(commands) => commands
            .iter()
            .map(|c| {
                if journal {
                    c.journal_entry(resolver, models)
                } else {
                    c.export(resolver, models).cloned()
                }
            })
            .collect::<Result<Vec<_>, _>>()
            .map(SerialArg::Commands),
    }
}

fn fill_remote_queues(envelope: &mut Envelope, data: &UndoData) {
    envelope.remote_queue = data.remote_queue.clone();
    for (arg, live) in envelope.args.iter_mut().zip(data.action.args()) {
        if let (SerialArg::Commands(envelopes), ArgRef::Commands(commands)) = (arg, live) {
            for (envelope, command) in envelopes.iter_mut().zip(commands) {
                fill_remote_queues(envelope, command);
            }
        }
    }
}

fn import_arg(
    arg: &SerialArg,
    args_model: Option<ModelId>,
    ctx: &mut ImportContext<'_>,
) -> Result<Arg, SerializationError> {
    match arg {
        SerialArg::Value(value) => Ok(Arg::Value(value.clone())),
        SerialArg::Node(descriptor) => {
            let model = args_model.ok_or(SerializationError::MissingArgsModel)?;
            Ok(Arg::Node(ctx.resolver.deserialize(descriptor, model, ctx.models)?))
        }
        SerialArg::Commands(envelopes) if envelopes.is_empty() => Ok(Arg::Value(Value::Array(Vec::new()))),
        SerialArg::Commands(envelopes) => envelopes
            .iter()
            .map(|e| UndoData::import(e, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Arg::Commands),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::OLD_VALUE;
    use actionlog_markup::XmlDocument;

    fn setup() -> (ModelRegistry, ModelId, NodeRef) {
        let mut models = ModelRegistry::new();
        let doc = XmlDocument::parse(r#"<library><book a_id="b1" title="Dune"/></library>"#).unwrap();
        let id = models.register("books", doc);
        let doc = models.document(id).unwrap();
        let book = NodeRef::new(id, doc.children(doc.root())[0]);
        (models, id, book)
    }

    fn set_title(book: &NodeRef, title: &str) -> ActionSpec {
        ActionSpec::new(Action::SetProperty {
            node: book.clone(),
            name: "title".to_string(),
            value: Some(title.to_string()),
        })
    }

    fn command(spec: ActionSpec) -> UndoData {
        UndoData::new(IdGenerator::new().next_id(), spec, "main", None)
    }

    #[test]
    fn test_rule_undo_falls_back_to_set() {
        let rule = ActionRule::new("rpc:save({$value})");
        assert_eq!(rule.data_instruction(true), Some("rpc:save({$value})"));

        let rule = rule.with_undo("rpc:restore({$oldValue})");
        assert_eq!(rule.data_instruction(true), Some("rpc:restore({$oldValue})"));
        assert_eq!(rule.data_instruction(false), Some("rpc:save({$value})"));
    }

    #[test]
    fn test_preparse_flags() {
        let (_, _, book) = setup();

        let mut plain = command(set_title(&book, "x"));
        plain.preparse(false, false).unwrap();
        assert_eq!(plain.preparsed(), &Preparsed::NoInstruction { undo: false });

        let mut local = command(set_title(&book, "x").rule(ActionRule::new("local:noop")));
        local.preparse(false, false).unwrap();
        assert_eq!(local.preparsed().flag(), ParsedFlag::Local);

        let mut remote = command(set_title(&book, "x").rule(ActionRule::new("rpc:save({@a_id}, {$value})")));
        remote.preparse(false, false).unwrap();
        assert_eq!(remote.preparsed().flag(), ParsedFlag::Remote);
    }

    #[test]
    fn test_preparse_rejects_bad_instructions() {
        let (_, _, book) = setup();

        let mut malformed = command(set_title(&book, "x").rule(ActionRule::new("rpc:save({@a_id}")));
        assert!(matches!(
            malformed.preparse(false, false),
            Err(InstructionError::Syntax { .. })
        ));

        let mut unbound = command(set_title(&book, "x").rule(ActionRule::new("rpc:save({$nope})")));
        assert!(matches!(
            unbound.preparse(false, false),
            Err(InstructionError::Unbound { .. })
        ));
    }

    #[test]
    fn test_affected_defaults() {
        let (_, id, book) = setup();

        let remove = command(ActionSpec::new(Action::Remove { node: book.clone() }));
        assert_eq!(remove.affected(), Some(&book));

        struct Parent;
        impl SelectionResolver for Parent {
            fn resolve_selection(&self, acting: &NodeRef) -> Option<NodeRef> {
                Some(NodeRef::attribute(acting.model, acting.node, "selected"))
            }
        }
        let selected = UndoData::new(
            IdGenerator::new().next_id(),
            set_title(&book, "x"),
            "main",
            Some(&Parent),
        );
        assert_eq!(
            selected.affected(),
            Some(&NodeRef::attribute(id, book.node, "selected"))
        );

        let explicit = command(set_title(&book, "x").affected(book.clone()));
        assert_eq!(explicit.affected(), Some(&book));
    }

    #[test]
    fn test_export_is_memoized() {
        let (mut models, _, book) = setup();
        let mut cmd = command(set_title(&book, "Emma"));
        cmd.apply(&mut models).unwrap();

        let mut resolver = Resolver::default();
        let first = cmd.export(&mut resolver, &mut models).unwrap() as *const Envelope;

        models
            .document_mut(book.model)
            .unwrap()
            .detach(book.node)
            .unwrap();
        let second = cmd.export(&mut resolver, &mut models).unwrap();

        assert!(std::ptr::eq(first, second));
        assert_eq!(second.args[0], SerialArg::Node(NodeDescriptor {
            xpath: "/book[1]".to_string(),
            lookup_id: Some("b1".to_string()),
            inline_xml: None,
        }));
    }

    #[test]
    fn test_export_rejects_mixed_models() {
        let (mut models, _, book) = setup();
        let other = models.register("shelf", XmlDocument::new("shelf"));
        let shelf = models.root(other).unwrap();

        let cmd = command(set_title(&book, "x").extra("where", shelf));
        let err = cmd.export(&mut Resolver::default(), &mut models).unwrap_err();
        assert_eq!(
            err,
            SerializationError::ModelMismatch {
                first: "books".to_string(),
                other: "shelf".to_string()
            }
        );
        assert!(!cmd.is_exported());
    }

    #[test]
    fn test_envelope_json_shape() {
        let (mut models, _, book) = setup();
        let cmd = command(set_title(&book, "x").remote_model("books").extra("note", Value::from(1)));
        let envelope = cmd.export(&mut Resolver::default(), &mut models).unwrap();
        let json = serde_json::to_value(envelope).unwrap();

        assert_eq!(json["action"], "setProperty");
        assert_eq!(json["remoteModelName"], "books");
        assert_eq!(json["trackerName"], "main");
        assert_eq!(json["argsModelName"], "books");
        assert_eq!(json["parsedFlag"], "none");
        assert_eq!(json["args"][0]["xpath"], "/book[1]");
        assert_eq!(json["args"][0]["lookupId"], "b1");
        assert_eq!(json["extra"]["note"], 1);

        let back: Envelope = serde_json::from_value(json).unwrap();
        assert_eq!(&back, envelope);
    }

    #[test]
    fn test_offline_entry_import_is_idempotent() {
        let (mut models, _, book) = setup();
        let cmd = command(set_title(&book, "x"));
        let mut resolver = Resolver::default();
        let envelope = cmd.export(&mut resolver, &mut models).unwrap().clone();

        let rules = HashMap::new();
        let mut ids = IdGenerator::new();
        let mut ctx = ImportContext {
            resolver: &mut resolver,
            models: &mut models,
            rules: &rules,
            ids: &mut ids,
        };
        let mut entry = OfflineEntry::from(envelope);
        entry.import(&mut ctx).unwrap();
        let first_id = entry.imported().unwrap().id();
        entry.import(&mut ctx).unwrap();

        assert_eq!(entry.imported().unwrap().id(), first_id);
        let imported = entry.into_imported().unwrap();
        assert!(imported.is_exported());
        assert_eq!(imported, cmd);
    }

    #[test]
    fn test_from_existing_resets_state_and_cache() {
        let (mut models, _, book) = setup();
        let mut ids = IdGenerator::new();
        let mut cmd = UndoData::new(ids.next_id(), set_title(&book, "x"), "main", None);
        cmd.apply(&mut models).unwrap();
        cmd.set_state(CommandState::Committed);
        cmd.export(&mut Resolver::default(), &mut models).unwrap();

        let copy = UndoData::from_existing(&cmd, &mut ids);
        assert_ne!(copy.id(), cmd.id());
        assert_eq!(copy.state(), CommandState::Pending);
        assert!(!copy.is_exported());
        assert_eq!(copy.remote_queue().len(), 1);
        assert_eq!(copy, cmd);
    }

    #[test]
    fn test_save_change_builds_request() {
        let (models, _, book) = setup();
        let mut cmd = command(
            set_title(&book, "Emma")
                .rule(ActionRule::new("rpc:books.setTitle({@a_id}, {$value})"))
                .userdata(Value::from("ui")),
        );
        cmd.preparse(false, false).unwrap();

        let request = match cmd.save_change(false, SaveTicket(4), &models) {
            SaveStep::Dispatch(request) => request,
            other => panic!("expected dispatch, got {:?}", other),
        };
        assert_eq!(cmd.state(), CommandState::Saving);
        assert_eq!(request.ticket, SaveTicket(4));
        assert_eq!(request.scheme, "rpc");
        assert_eq!(request.target, "books.setTitle");
        assert_eq!(request.payload, vec![Value::from("b1"), Value::from("Emma")]);
        assert_eq!(
            request.headers.get(ACTION_START_HEADER),
            Some(&cmd.timestamp().to_string())
        );
        assert_eq!(request.userdata, Some(Value::from("ui")));
    }

    #[test]
    fn test_save_change_without_instruction_completes() {
        let (models, _, book) = setup();
        let mut cmd = command(set_title(&book, "x"));
        assert!(matches!(
            cmd.save_change(true, SaveTicket(0), &models),
            SaveStep::Complete
        ));
        assert_eq!(cmd.state(), CommandState::Pending);
    }

    #[test]
    fn test_save_change_with_unbound_instruction_keeps_state() {
        let (models, _, book) = setup();
        let mut cmd = command(set_title(&book, "x").rule(ActionRule::new("rpc:save({$missing})")));
        assert!(matches!(
            cmd.save_change(false, SaveTicket(0), &models),
            SaveStep::Invalid(InstructionError::Unbound { .. })
        ));
        assert_eq!(cmd.state(), CommandState::Pending);
    }

    #[test]
    fn test_journal_keeps_inverse_data_apart_from_export() {
        let (mut models, _, book) = setup();
        let mut cmd = command(set_title(&book, "Emma"));
        let mut journal = Resolver::default();

        cmd.begin_journal(&mut journal, &mut models).unwrap();
        cmd.apply(&mut models).unwrap();
        cmd.finish_journal();
        assert!(!cmd.is_exported());

        let record = cmd.journaled().unwrap();
        assert_eq!(
            record.extra.get(OLD_VALUE),
            Some(&SerialArg::Value(Value::from("Dune")))
        );
        assert_eq!(record.remote_queue.len(), 1);
        assert_eq!(&record.remote_queue, cmd.remote_queue());

        let export = cmd.export(&mut Resolver::default(), &mut models).unwrap();
        assert_eq!(export, record);
    }
}
