//! Single-generation undo log

use super::{Feature, Move, ReplaceEvent};
use crate::error::{FatalError, FeatureError, Result};
use crate::graph::FunctionGraph;
use crate::types::{GraphId, Reason};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Point in the mutation history of one graph
///
/// Only the newest checkpoint of a graph can be reverted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checkpoint {
    graph: GraphId,
    seq: u64,
}

impl Checkpoint {
    /// Graph that issued the checkpoint
    #[must_use]
    pub fn graph(&self) -> GraphId {
        self.graph
    }

    /// Sequence number within that graph
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.graph, self.seq)
    }
}

/// Whether replacements are being recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogMode {
    /// Accepted replacements are appended to the undo log
    #[default]
    Recording,
    /// The log is being drained; nothing is appended
    Reverting,
}

#[derive(Debug, Clone)]
struct UndoEntry {
    batch: u64,
    moves: Vec<Move>,
    reason: Reason,
}

#[derive(Debug, Default)]
struct HistoryState {
    graph: Option<GraphId>,
    seq: u64,
    log: Vec<UndoEntry>,
    mode: LogMode,
}

/// Records the client moves of every replace since the last checkpoint
#[derive(Debug, Default)]
pub struct History {
    state: Mutex<HistoryState>,
}

/// Puts the history back into recording mode when dropped
struct RevertGuard<'a> {
    state: &'a Mutex<HistoryState>,
}

impl Drop for RevertGuard<'_> {
    fn drop(&mut self) {
        self.state.lock().mode = LogMode::Recording;
    }
}

impl History {
    /// Detached history
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current log mode
    #[must_use]
    pub fn mode(&self) -> LogMode {
        self.state.lock().mode
    }

    /// Whether a revert is in progress
    #[must_use]
    pub fn is_reverting(&self) -> bool {
        self.mode() == LogMode::Reverting
    }

    /// Number of replace calls recorded since the last checkpoint
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().log.len()
    }

    fn check_graph(&self, state: &HistoryState, fg: &FunctionGraph) -> Result<GraphId> {
        match state.graph {
            Some(graph) if graph == fg.id() => Ok(graph),
            _ => Err(FeatureError::NotAttached {
                feature: self.name().to_string(),
            }
            .into()),
        }
    }

    /// Issue a new checkpoint and forget everything recorded so far
    ///
    /// # Errors
    /// `NotAttached` if this history does not serve `fg`.
    pub fn checkpoint(&self, fg: &FunctionGraph) -> Result<Checkpoint> {
        let mut state = self.state.lock();
        let graph = self.check_graph(&state, fg)?;
        state.seq += 1;
        state.log.clear();
        Ok(Checkpoint { graph, seq: state.seq })
    }

    /// Undo every recorded replace, newest first
    ///
    /// # Errors
    /// `CheckpointMismatch` (fatal) unless `checkpoint` is the newest one
    /// issued for `fg`; any error raised while restoring.
    pub fn revert(&self, fg: &mut FunctionGraph, checkpoint: Checkpoint) -> Result<()> {
        let entries = {
            let mut state = self.state.lock();
            let graph = self.check_graph(&state, fg)?;
            let current = Checkpoint { graph, seq: state.seq };
            if checkpoint != current {
                return Err(FatalError::CheckpointMismatch {
                    requested: checkpoint.to_string(),
                    current: current.to_string(),
                }
                .into());
            }
            state.mode = LogMode::Reverting;
            std::mem::take(&mut state.log)
        };
        let _guard = RevertGuard { state: &self.state };

        tracing::debug!(graph = %fg.id(), entries = entries.len(), "reverting to {}", checkpoint);
        for entry in entries.iter().rev() {
            fg.restore_clients(&entry.moves, &entry.reason.reverted())?;
        }
        Ok(())
    }
}

impl Feature for History {
    fn name(&self) -> &'static str {
        "History"
    }

    fn on_attach(self: Arc<Self>, fg: &mut FunctionGraph) -> Result<()> {
        if fg.capabilities.history.is_some() {
            return Err(FeatureError::AlreadyThere {
                feature: self.name().to_string(),
            }
            .into());
        }
        {
            let mut state = self.state.lock();
            if state.graph.is_some_and(|graph| graph != fg.id()) {
                return Err(FeatureError::AlreadyAttached {
                    feature: self.name().to_string(),
                }
                .into());
            }
            *state = HistoryState {
                graph: Some(fg.id()),
                ..HistoryState::default()
            };
        }
        fg.capabilities.history = Some(self);
        Ok(())
    }

    fn on_detach(self: Arc<Self>, fg: &mut FunctionGraph) -> Result<()> {
        if fg
            .capabilities
            .history
            .as_ref()
            .is_some_and(|installed| Arc::ptr_eq(installed, &self))
        {
            fg.capabilities.history = None;
        }
        *self.state.lock() = HistoryState::default();
        Ok(())
    }

    fn on_replace_nodes(&self, _fg: &mut FunctionGraph, event: &ReplaceEvent<'_>) -> Result<()> {
        let mut state = self.state.lock();
        if state.mode == LogMode::Reverting || event.moves.is_empty() {
            return Ok(());
        }
        let at = state.log.partition_point(|entry| entry.batch < event.batch);
        state.log.insert(
            at,
            UndoEntry {
                batch: event.batch,
                moves: event.moves.to_vec(),
                reason: event.reason.clone(),
            },
        );
        Ok(())
    }
}
