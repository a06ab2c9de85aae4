//! Atomic validated replacement
//!
//! [`ReplaceValidate`] composes a [`History`] and a [`Validator`] and gives
//! rewrite rules an all-or-nothing primitive: take a checkpoint, replace,
//! validate, and revert on any failure before the error reaches the caller.

use super::{Checkpoint, Feature, History, Memo, ReplaceEvent, ValidateOptions, Validator};
use crate::error::{FeatureError, GraphError, ReplaceError, Result};
use crate::graph::{log_replacements, FunctionGraph};
use crate::types::{GraphItem, NodeId, Reason, VarId};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Default)]
struct ReplaceState {
    nodes_removed: HashSet<GraphItem>,
    fail_validate: bool,
}

/// History + validator, delegated to in that order
#[derive(Debug, Default)]
pub struct ReplaceValidate {
    history: Arc<History>,
    validator: Arc<Validator>,
    state: Mutex<ReplaceState>,
}

impl ReplaceValidate {
    /// Fresh replacer with its own history and validator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The composed history
    #[must_use]
    pub fn history(&self) -> &Arc<History> {
        &self.history
    }

    /// The composed validator
    #[must_use]
    pub fn validator(&self) -> &Arc<Validator> {
        &self.validator
    }

    /// Items recorded as removed by earlier rewrites
    #[must_use]
    pub fn nodes_removed(&self) -> Vec<GraphItem> {
        let mut items: Vec<_> = self.state.lock().nodes_removed.iter().copied().collect();
        items.sort_unstable();
        items
    }

    /// Single-pair [`replace_all_validate`](Self::replace_all_validate)
    ///
    /// # Errors
    /// See [`replace_all_validate`](Self::replace_all_validate).
    pub fn replace_validate(&self, fg: &mut FunctionGraph, old: VarId, new: VarId, reason: &Reason) -> Result<()> {
        self.replace_all_validate(fg, &[(old, new)], reason, None).map(|_| ())
    }

    /// Replace every pair and validate, or leave the graph untouched
    ///
    /// `verbose` defaults to the graph's `optimizer_verbose`; only pairs
    /// that pass validation are logged as rewrites.
    ///
    /// # Errors
    /// Fatal replace errors as is, without reverting. Any other replace
    /// error or validation failure after reverting to the checkpoint taken
    /// on entry.
    pub fn replace_all_validate(
        &self,
        fg: &mut FunctionGraph,
        pairs: &[(VarId, VarId)],
        reason: &Reason,
        verbose: Option<bool>,
    ) -> Result<(Memo, Checkpoint)> {
        let verbose = verbose.unwrap_or(fg.config().optimizer_verbose);
        let chk = self.history.checkpoint(fg)?;

        let outcome = match fg.replace(pairs, reason.clone(), Some(false)) {
            Ok(outcome) => outcome,
            Err(err) if err.is_fatal() => {
                tracing::error!(target: "fgraph::replace_validate", "{} aborted without revert: {}", reason, err);
                return Err(err);
            }
            Err(err) => {
                if !err.is_rejected_pair() {
                    tracing::error!(
                        target: "fgraph::replace_validate",
                        "replace failed in {}; this is probably a bug in the graph store or one of its listeners: {}",
                        reason,
                        err
                    );
                }
                self.history.revert(fg, chk)?;
                return Err(err);
            }
        };

        if let Err(err) = self.validator.validate(fg, ValidateOptions::quiet()) {
            self.history.revert(fg, chk)?;
            if verbose {
                tracing::info!(
                    target: "fgraph::optimizer",
                    "rewriting: validate failed on {:?}.\n Reason: {}, {}",
                    pairs,
                    reason,
                    err
                );
            }
            return Err(err);
        }
        if verbose {
            log_replacements(pairs, reason);
        }
        Ok((outcome.memo, chk))
    }

    /// [`replace_all_validate`](Self::replace_all_validate), then require
    /// every item of `remove` to be gone
    ///
    /// `warn` selects the level of the log line emitted when the rewrite is
    /// rejected: `warn` when set, `debug` otherwise.
    ///
    /// # Errors
    /// `ReplacementDidNotRemove` after reverting, or any error of
    /// [`replace_all_validate`](Self::replace_all_validate).
    pub fn replace_all_validate_remove(
        &self,
        fg: &mut FunctionGraph,
        pairs: &[(VarId, VarId)],
        remove: &[GraphItem],
        reason: &Reason,
        warn: bool,
    ) -> Result<Memo> {
        let (memo, chk) = self.replace_all_validate(fg, pairs, reason, None)?;
        self.state.lock().nodes_removed.extend(remove.iter().copied());

        let remaining: Vec<GraphItem> = remove.iter().copied().filter(|&item| fg.contains_item(item)).collect();
        if remaining.is_empty() {
            return Ok(memo);
        }

        self.history.revert(fg, chk)?;
        let remaining: Vec<String> = remaining.iter().map(ToString::to_string).collect();
        if warn {
            tracing::warn!(
                target: "fgraph::replace_validate",
                "rewrite {} wanted to remove {:?} but its replacement still depends on them; the rewrite was disabled",
                reason,
                remaining
            );
        } else {
            tracing::debug!(target: "fgraph::replace_validate", "rewrite {} did not remove {:?}", reason, remaining);
        }
        Err(ReplaceError::ReplacementDidNotRemove {
            remaining,
            reason: reason.to_string(),
        }
        .into())
    }
}

impl Feature for ReplaceValidate {
    fn name(&self) -> &'static str {
        "ReplaceValidate"
    }

    fn on_attach(self: Arc<Self>, fg: &mut FunctionGraph) -> Result<()> {
        if fg.capabilities.replacer.is_some() {
            return Err(FeatureError::AlreadyThere {
                feature: self.name().to_string(),
            }
            .into());
        }
        Arc::clone(&self.history).on_attach(fg)?;
        if let Err(err) = Arc::clone(&self.validator).on_attach(fg) {
            Arc::clone(&self.history).on_detach(fg)?;
            return Err(err);
        }
        *self.state.lock() = ReplaceState::default();
        fg.capabilities.replacer = Some(self);
        Ok(())
    }

    fn on_detach(self: Arc<Self>, fg: &mut FunctionGraph) -> Result<()> {
        Arc::clone(&self.history).on_detach(fg)?;
        Arc::clone(&self.validator).on_detach(fg)?;
        if fg
            .capabilities
            .replacer
            .as_ref()
            .is_some_and(|installed| Arc::ptr_eq(installed, &self))
        {
            fg.capabilities.replacer = None;
        }
        *self.state.lock() = ReplaceState::default();
        Ok(())
    }

    fn on_import(&self, fg: &mut FunctionGraph, node: NodeId, reason: &Reason) -> Result<()> {
        self.history.on_import(fg, node, reason)?;
        self.validator.on_import(fg, node, reason)?;
        if self.history.is_reverting() {
            return Ok(());
        }
        let mut state = self.state.lock();
        if state.nodes_removed.contains(&GraphItem::Node(node)) {
            tracing::debug!(graph = %fg.id(), %node, "removed node imported again");
            state.fail_validate = true;
        }
        Ok(())
    }

    fn on_prune(&self, fg: &mut FunctionGraph, node: NodeId, reason: &Reason) -> Result<()> {
        self.history.on_prune(fg, node, reason)?;
        self.validator.on_prune(fg, node, reason)
    }

    fn on_replace_nodes(&self, fg: &mut FunctionGraph, event: &ReplaceEvent<'_>) -> Result<()> {
        self.history.on_replace_nodes(fg, event)?;
        self.validator.on_replace_nodes(fg, event)
    }

    fn validate(&self, _fg: &mut FunctionGraph) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_validate {
            state.fail_validate = false;
            return Err(GraphError::Inconsistency("Trying to reintroduce a removed node".to_string()).into());
        }
        Ok(())
    }
}
