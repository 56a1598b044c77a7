//! Object graph locator
//!
//! Finds the session root object inside a live, unindexed doubly-linked list of
//! nodes owned by the target process. The list mutates while we read it, so
//! three strategies race under one cancellation scope:
//!
//! - **Shallow rescan**: re-fetch the head and walk a bounded number of nodes,
//!   over and over, until a match appears or the scope is cancelled.
//! - **Forward scan**: walk one snapshot from the first sentinel to the last.
//! - **Backward scan**: walk the same snapshot from the last sentinel to the first.
//!
//! The first match wins and cancels the others. Per-node problems are
//! [`SkipReason`]s, never errors: the walk logs them once per category and moves on.

use crate::platform::{is_user_address, offset_address, MemoryReader};
use crate::utils::{wait_cancelled, CancellationToken, OnceLog};
use crate::{Error, Result};
use crossbeam_channel::RecvTimeoutError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Field offsets of a list node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeLayout {
    /// Backward link
    pub prev_offset: usize,
    /// Forward link
    pub next_offset: usize,
    /// Pointer to the object the node holds
    pub object_offset: usize,
}

impl Default for NodeLayout {
    fn default() -> Self {
        Self {
            prev_offset: 0x0,
            next_offset: 0x8,
            object_offset: 0x10,
        }
    }
}

impl NodeLayout {
    /// Bytes to read to cover every link field in one request
    fn span(&self) -> usize {
        self.prev_offset.max(self.next_offset).max(self.object_offset) + 8
    }
}

/// Locator tunables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Node field offsets
    pub layout: NodeLayout,
    /// Offset of the name pointer inside the node's object
    pub name_offset: usize,
    /// Bytes read per object name
    pub name_max_len: usize,
    /// Object name to look for (exact match)
    pub target_name: String,
    /// Offsets from the matched object to the root object
    pub root_chain: Vec<usize>,
    /// Offsets from the root object to its session label string
    pub label_chain: Vec<usize>,
    /// Bytes read per session label
    pub label_max_len: usize,
    /// Labels of real sessions; empty accepts any label other than `idle_label`
    pub known_sessions: Vec<String>,
    /// Label reported while the process is not in a real session yet
    pub idle_label: Option<String>,
    /// Nodes walked per shallow pass
    pub shallow_depth: usize,
    /// Hard cap for a full walk; guards against cycles in a corrupted list
    pub max_nodes: usize,
    /// Pause between shallow passes
    pub rescan_interval_ms: u64,
    /// How long the shallow strategy may keep going once both full walks failed
    pub exhausted_grace_ms: u64,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            layout: NodeLayout::default(),
            name_offset: 0x60,
            name_max_len: 64,
            target_name: "GameWorld".to_string(),
            root_chain: vec![0x30, 0x18, 0x28],
            label_chain: vec![0xC8],
            label_max_len: 64,
            known_sessions: Vec::new(),
            idle_label: Some("hideout".to_string()),
            shallow_depth: 64,
            max_nodes: 200_000,
            rescan_interval_ms: 50,
            exhausted_grace_ms: 2_000,
        }
    }
}

/// Sentinels bounding the node list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListBounds {
    /// First sentinel node
    pub first: usize,
    /// Last sentinel node
    pub last: usize,
    /// Where the process keeps the current head pointer, if known
    ///
    /// The shallow strategy re-reads it every pass; without it the walk restarts
    /// at `first`.
    pub head_slot: Option<usize>,
}

impl ListBounds {
    /// Bounds without a head slot
    pub fn new(first: usize, last: usize) -> Self {
        Self {
            first,
            last,
            head_slot: None,
        }
    }

    /// Re-read the head from `slot` on every shallow pass
    pub fn with_head_slot(mut self, slot: usize) -> Self {
        self.head_slot = Some(slot);
        self
    }
}

/// One list node, read fresh on every visit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphNode {
    /// Where the node itself lives
    pub address: usize,
    /// Object held by the node; may be null
    pub object: usize,
    /// Name pointer of the object, when the object was readable
    pub name_pointer: Option<usize>,
    /// Forward link
    pub next: usize,
    /// Backward link
    pub prev: usize,
}

/// Root object of the current session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocateResult {
    /// Address of the root object
    pub root_address: usize,
    /// Label of the session the root belongs to
    pub session_label: String,
}

/// Why a node was not a match
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The address is outside user space
    InvalidAddress(usize),
    /// The node's link block could not be read
    NodeUnreadable,
    /// The node's links are fine but it holds no usable object
    NoObject,
    /// The object's name could not be read
    NameUnreadable,
    /// Some other object
    NameMismatch,
    /// The name matched but the pointer chain to the root broke
    ChainBroken,
    /// The root's session label could not be read
    LabelUnreadable,
    /// Root found but the process is not in a real session yet
    NotInSession,
    /// Label is neither a known session nor the idle label
    UnknownSession(String),
}

impl SkipReason {
    /// Log category; each is reported at most once per session
    pub fn category(&self) -> String {
        match self {
            SkipReason::InvalidAddress(_) => "invalid-address".to_string(),
            SkipReason::NodeUnreadable => "node-unreadable".to_string(),
            SkipReason::NoObject => "no-object".to_string(),
            SkipReason::NameUnreadable => "name-unreadable".to_string(),
            SkipReason::NameMismatch => "name-mismatch".to_string(),
            SkipReason::ChainBroken => "chain-broken".to_string(),
            SkipReason::LabelUnreadable => "label-unreadable".to_string(),
            SkipReason::NotInSession => "not-in-session".to_string(),
            SkipReason::UnknownSession(label) => format!("unknown-session:{}", label),
        }
    }

    /// Expected during normal operation; never worth a warning
    fn is_routine(&self) -> bool {
        matches!(self, SkipReason::NameMismatch | SkipReason::NotInSession)
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::InvalidAddress(a) => write!(f, "address 0x{:X} outside user space", a),
            SkipReason::UnknownSession(label) => write!(f, "unrecognized session label '{}'", label),
            other => f.write_str(&other.category()),
        }
    }
}

/// The three racing walk strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Re-fetch the head and walk a few nodes, repeatedly
    ShallowRescan,
    /// First sentinel to last
    Forward,
    /// Last sentinel to first
    Backward,
}

impl Strategy {
    /// Every strategy, in spawn order
    pub const ALL: [Strategy; 3] = [Strategy::ShallowRescan, Strategy::Forward, Strategy::Backward];
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::ShallowRescan => "shallow-rescan",
            Strategy::Forward => "forward",
            Strategy::Backward => "backward",
        })
    }
}

/// How a single strategy ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalkOutcome {
    /// A match
    Found(LocateResult),
    /// Reached the end without a match
    Exhausted,
    /// Stopped by the cancellation scope
    Cancelled,
}

/// Per-session locator state; cleared by [`GraphLocator::reset`]
#[derive(Debug, Default)]
struct LocatorSession {
    found: AtomicBool,
    result: Mutex<Option<LocateResult>>,
    errors: OnceLog,
}

/// Races the walk strategies over a node list
#[derive(Debug)]
pub struct GraphLocator {
    config: LocatorConfig,
    session: LocatorSession,
}

impl GraphLocator {
    /// Locator with no session state
    pub fn new(config: LocatorConfig) -> Self {
        Self {
            config,
            session: LocatorSession::default(),
        }
    }

    /// Configuration in use
    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// Whether a root has been found this session
    pub fn is_found(&self) -> bool {
        self.session.found.load(Ordering::Acquire)
    }

    /// Result found this session, if any
    pub fn result(&self) -> Option<LocateResult> {
        self.session.result.lock().clone()
    }

    /// Forget everything learned this session
    pub fn reset(&self) {
        self.session.found.store(false, Ordering::Release);
        *self.session.result.lock() = None;
        self.session.errors.clear();
    }

    /// Find the session root
    ///
    /// Runs all strategies concurrently and returns the first match. Once both
    /// full walks come up empty the shallow strategy gets
    /// `exhausted_grace_ms` more before the search reports [`Error::NotFound`].
    /// Cancelling `cancel` ends the search with [`Error::Cancelled`].
    pub fn locate<R>(
        &self,
        reader: &R,
        bounds: ListBounds,
        cancel: &CancellationToken,
    ) -> Result<LocateResult>
    where
        R: MemoryReader,
    {
        if let Some(result) = self.result() {
            return Ok(result);
        }

        let scope = cancel.child_token();
        let (tx, rx) = crossbeam_channel::bounded(Strategy::ALL.len());
        let grace = Duration::from_millis(self.config.exhausted_grace_ms);

        let winner = std::thread::scope(|s| {
            for strategy in Strategy::ALL {
                let tx = tx.clone();
                let scope = scope.clone();
                s.spawn(move || {
                    let outcome = self.run_strategy(strategy, reader, bounds, &scope);
                    let _ = tx.send((strategy, outcome));
                });
            }
            drop(tx);

            let mut exhausted = 0;
            let mut deadline: Option<Instant> = None;
            let mut winner = None;

            loop {
                let message = match deadline {
                    Some(at) => rx.recv_deadline(at),
                    None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                };

                match message {
                    Ok((_, WalkOutcome::Found(result))) => {
                        winner = Some(result);
                        scope.cancel();
                        break;
                    }
                    Ok((strategy, WalkOutcome::Exhausted)) => {
                        debug!(%strategy, "walk reached the end without a match");
                        exhausted += 1;
                        if exhausted == 2 && deadline.is_none() {
                            deadline = Some(Instant::now() + grace);
                        }
                    }
                    Ok((strategy, WalkOutcome::Cancelled)) => {
                        trace!(%strategy, "walk cancelled");
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        debug!("shallow rescan grace period elapsed");
                        scope.cancel();
                        deadline = None;
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }

            // Leaving the scope joins every worker
            winner
        });

        match winner {
            Some(result) => Ok(result),
            None if cancel.is_cancelled() => Err(Error::Cancelled),
            None => Err(Error::NotFound(format!(
                "no '{}' object in the node list",
                self.config.target_name
            ))),
        }
    }

    /// Run one strategy to completion
    pub fn run_strategy<R>(
        &self,
        strategy: Strategy,
        reader: &R,
        bounds: ListBounds,
        cancel: &CancellationToken,
    ) -> WalkOutcome
    where
        R: MemoryReader,
    {
        let outcome = match strategy {
            Strategy::ShallowRescan => self.shallow_rescan(reader, bounds, cancel),
            Strategy::Forward => self.walk(reader, bounds.first, bounds.last, true, cancel),
            Strategy::Backward => self.walk(reader, bounds.last, bounds.first, false, cancel),
        };

        if let WalkOutcome::Found(result) = &outcome {
            self.record(strategy, result);
            cancel.cancel();
        }

        outcome
    }

    fn record(&self, strategy: Strategy, result: &LocateResult) {
        let first = self
            .session
            .found
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if first {
            info!(
                %strategy,
                root = format_args!("0x{:X}", result.root_address),
                label = %result.session_label,
                "session root found"
            );
            *self.session.result.lock() = Some(result.clone());
        }
    }

    fn shallow_rescan<R: MemoryReader>(
        &self,
        reader: &R,
        bounds: ListBounds,
        cancel: &CancellationToken,
    ) -> WalkOutcome {
        let interval = Duration::from_millis(self.config.rescan_interval_ms);

        loop {
            if cancel.is_cancelled() {
                return WalkOutcome::Cancelled;
            }

            let head = match bounds.head_slot {
                Some(slot) => reader.read_pointer(slot).unwrap_or(bounds.first),
                None => bounds.first,
            };

            let mut address = head;
            for _ in 0..self.config.shallow_depth {
                if cancel.is_cancelled() {
                    return WalkOutcome::Cancelled;
                }

                let node = match self.read_node(reader, address) {
                    Ok(node) => node,
                    Err(reason) => {
                        self.note_skip(Strategy::ShallowRescan, address, &reason);
                        break;
                    }
                };

                match self.classify_node(reader, &node) {
                    Ok(result) => return WalkOutcome::Found(result),
                    Err(reason) => self.note_skip(Strategy::ShallowRescan, address, &reason),
                }

                if address == bounds.last {
                    break;
                }
                address = node.next;
            }

            if wait_cancelled(cancel, interval) {
                return WalkOutcome::Cancelled;
            }
        }
    }

    fn walk<R: MemoryReader>(
        &self,
        reader: &R,
        start: usize,
        end: usize,
        forward: bool,
        cancel: &CancellationToken,
    ) -> WalkOutcome {
        let strategy = if forward {
            Strategy::Forward
        } else {
            Strategy::Backward
        };

        let mut address = start;
        for _ in 0..self.config.max_nodes {
            if cancel.is_cancelled() {
                return WalkOutcome::Cancelled;
            }

            let node = match self.read_node(reader, address) {
                Ok(node) => node,
                Err(reason) => {
                    // Without this node's links the snapshot cannot continue
                    self.note_skip(strategy, address, &reason);
                    return WalkOutcome::Exhausted;
                }
            };

            match self.classify_node(reader, &node) {
                Ok(result) => return WalkOutcome::Found(result),
                Err(reason) => self.note_skip(strategy, address, &reason),
            }

            if address == end {
                return WalkOutcome::Exhausted;
            }
            address = if forward { node.next } else { node.prev };
        }

        if self.session.errors.first("walk-limit") {
            warn!(%strategy, limit = self.config.max_nodes, "walk hit the node limit");
        }
        WalkOutcome::Exhausted
    }

    /// Read a node's links, its object and (if readable) the object's name pointer
    ///
    /// Only an unreadable link block is an error: a node with a null or broken
    /// object still tells the walk where to go next.
    pub fn read_node<R: MemoryReader>(
        &self,
        reader: &R,
        address: usize,
    ) -> std::result::Result<GraphNode, SkipReason> {
        if !is_user_address(address) {
            return Err(SkipReason::InvalidAddress(address));
        }

        let layout = &self.config.layout;
        let bytes = reader
            .read_bytes(address, layout.span())
            .map_err(|_| SkipReason::NodeUnreadable)?;
        if bytes.len() < layout.span() {
            return Err(SkipReason::NodeUnreadable);
        }

        let field = |offset: usize| -> usize {
            bytemuck::pod_read_unaligned::<u64>(&bytes[offset..offset + 8]) as usize
        };

        let object = field(layout.object_offset);
        let name_pointer = is_user_address(object)
            .then(|| offset_address(object, self.config.name_offset).ok())
            .flatten()
            .and_then(|slot| reader.read_pointer(slot).ok());

        Ok(GraphNode {
            address,
            object,
            name_pointer,
            next: field(layout.next_offset),
            prev: field(layout.prev_offset),
        })
    }

    /// Decide whether `node` is the session root
    pub fn classify_node<R: MemoryReader>(
        &self,
        reader: &R,
        node: &GraphNode,
    ) -> std::result::Result<LocateResult, SkipReason> {
        if !is_user_address(node.object) {
            return Err(SkipReason::NoObject);
        }
        let name_pointer = node.name_pointer.ok_or(SkipReason::NameUnreadable)?;

        let name = reader
            .read_cstring(name_pointer, self.config.name_max_len)
            .map_err(|_| SkipReason::NameUnreadable)?;

        if name != self.config.target_name {
            return Err(SkipReason::NameMismatch);
        }

        let root_address = reader
            .read_pointer_chain(node.object, &self.config.root_chain)
            .map_err(|_| SkipReason::ChainBroken)?;

        let session_label = read_label(reader, root_address, &self.config)?;
        classify_label(&self.config, &session_label)?;

        Ok(LocateResult {
            root_address,
            session_label,
        })
    }

    fn note_skip(&self, strategy: Strategy, address: usize, reason: &SkipReason) {
        if reason.is_routine() {
            return;
        }

        if self.session.errors.first(&reason.category()) {
            warn!(
                %strategy,
                node = format_args!("0x{:X}", address),
                reason = %reason,
                "skipping node"
            );
        }
    }
}

/// Check a session label against the idle label and the known sessions
pub(crate) fn classify_label(
    config: &LocatorConfig,
    label: &str,
) -> std::result::Result<(), SkipReason> {
    if config
        .idle_label
        .as_deref()
        .is_some_and(|idle| idle.eq_ignore_ascii_case(label))
    {
        return Err(SkipReason::NotInSession);
    }

    if config.known_sessions.is_empty()
        || config
            .known_sessions
            .iter()
            .any(|known| known.eq_ignore_ascii_case(label))
    {
        return Ok(());
    }

    Err(SkipReason::UnknownSession(label.to_string()))
}

/// Read a root object's session label
pub(crate) fn read_label<R: MemoryReader>(
    reader: &R,
    root: usize,
    config: &LocatorConfig,
) -> std::result::Result<String, SkipReason> {
    let string = reader
        .read_pointer_chain(root, &config.label_chain)
        .map_err(|_| SkipReason::LabelUnreadable)?;

    reader
        .read_cstring(string, config.label_max_len)
        .map_err(|_| SkipReason::LabelUnreadable)
}
