//! Feature protocol
//!
//! A [`Feature`] observes lifecycle events of one [`FunctionGraph`]:
//! attach/detach, node import, node prune and bulk replacement. Features
//! that expose an API to rewrite rules (history, validation, indexing)
//! install it into the graph's [`Capabilities`] registry on attach and
//! remove it on detach.
//!
//! Callbacks receive `&mut FunctionGraph`, so a feature may issue further
//! mutations from inside a callback. Feature state therefore lives behind
//! short-lived locks that are never held across a call back into the graph.

pub mod history;
pub mod listeners;
pub mod node_finder;
pub mod replace_validate;
pub mod validator;

use crate::error::Result;
use crate::graph::FunctionGraph;
use crate::types::{Client, NodeId, Reason, VarId};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

pub use history::{Checkpoint, History, LogMode};
pub use listeners::{NoOutputFromInplace, PreserveVariableAttributes, PrintListener};
pub use node_finder::NodeFinder;
pub use replace_validate::ReplaceValidate;
pub use validator::{ValidateOptions, ValidationStats, Validator};

/// Extra precedence constraints: node -> nodes that must run before it
pub type Orderings = IndexMap<NodeId, Vec<NodeId>>;

/// Transitive old -> new mapping produced by one replace call
pub type Memo = IndexMap<VarId, VarId>;

/// One batch of client slots rewired from `from` to `to`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Move {
    /// Variable the clients consumed before
    pub from: VarId,
    /// Variable the clients consume now
    pub to: VarId,
    /// Exact slots that were rewired
    pub clients: Vec<Client>,
}

impl Move {
    /// The move that puts the same slots back
    #[must_use]
    pub fn inverse(&self) -> Self {
        Self {
            from: self.to,
            to: self.from,
            clients: self.clients.clone(),
        }
    }
}

/// Payload of [`Feature::on_replace_nodes`]
#[derive(Debug, Clone, Copy)]
pub struct ReplaceEvent<'a> {
    /// Requested pairs, in application order
    pub pairs: &'a [(VarId, VarId)],
    /// Variables that left the graph during the call
    pub unused_vars: &'a [VarId],
    /// Clients of each replaced variable before the call
    pub old_clients: &'a IndexMap<VarId, Vec<Client>>,
    /// Every replaced variable mapped to the variable it finally resolved to
    pub memo: &'a Memo,
    /// Client moves actually performed, in order
    pub moves: &'a [Move],
    /// Why the replacement happened
    pub reason: &'a Reason,
    /// Position of this call among all replace calls of the store, in the
    /// order their moves were applied
    ///
    /// A nested replace issued from a callback gets a higher number than
    /// the call whose event is being delivered, even though its own event
    /// may arrive first.
    pub batch: u64,
}

/// Observer of graph lifecycle events
///
/// Every method has a no-op default.
pub trait Feature: Send + Sync + fmt::Debug {
    /// Name used in diagnostics
    fn name(&self) -> &'static str;

    /// Called when the feature is attached, after the graph is populated
    ///
    /// Return [`FeatureError::AlreadyThere`](crate::FeatureError::AlreadyThere)
    /// to cancel the attach when an equivalent feature is present.
    fn on_attach(self: Arc<Self>, _fg: &mut FunctionGraph) -> Result<()> {
        Ok(())
    }

    /// Called when the feature is removed; must undo `on_attach`
    fn on_detach(self: Arc<Self>, _fg: &mut FunctionGraph) -> Result<()> {
        Ok(())
    }

    /// Called for every node that becomes live, after it is connected
    fn on_import(&self, _fg: &mut FunctionGraph, _node: NodeId, _reason: &Reason) -> Result<()> {
        Ok(())
    }

    /// Called for every node that leaves the graph, after it is disconnected
    fn on_prune(&self, _fg: &mut FunctionGraph, _node: NodeId, _reason: &Reason) -> Result<()> {
        Ok(())
    }

    /// Called once per successful replace call
    fn on_replace_nodes(&self, _fg: &mut FunctionGraph, _event: &ReplaceEvent<'_>) -> Result<()> {
        Ok(())
    }

    /// Extra precedence constraints honored by [`FunctionGraph::toposort`]
    fn orderings(&self, _fg: &FunctionGraph) -> Orderings {
        Orderings::new()
    }

    /// Consistency check run by the validator
    fn validate(&self, _fg: &mut FunctionGraph) -> Result<()> {
        Ok(())
    }
}

/// A feature that needs to see every live node
///
/// `replay_imports` feeds the current graph through `on_import` so the
/// feature can be attached to a populated graph; `replay_prunes` tears the
/// same state down before detaching.
pub trait Bookkeeper: Feature {
    /// Replay every live node through `on_import`, producers first
    fn replay_imports(&self, fg: &mut FunctionGraph) -> Result<()> {
        let schedule = fg.io_toposort()?;
        for node in schedule.iter() {
            self.on_import(fg, node, &Reason::Attach)?;
        }
        Ok(())
    }

    /// Replay every live node through `on_prune`, consumers first
    fn replay_prunes(&self, fg: &mut FunctionGraph) -> Result<()> {
        let schedule = fg.io_toposort()?;
        for node in schedule.iter().rev() {
            self.on_prune(fg, node, &Reason::Detach)?;
        }
        Ok(())
    }
}

/// Capabilities installed by attached features, one slot each
#[derive(Debug, Default, Clone)]
pub struct Capabilities {
    pub(crate) history: Option<Arc<History>>,
    pub(crate) validator: Option<Arc<Validator>>,
    pub(crate) replacer: Option<Arc<ReplaceValidate>>,
    pub(crate) node_finder: Option<Arc<NodeFinder>>,
}

impl Capabilities {
    /// Whether checkpoint/revert is available
    #[must_use]
    pub fn has_history(&self) -> bool {
        self.history.is_some()
    }

    /// Whether validate/consistent is available
    #[must_use]
    pub fn has_validator(&self) -> bool {
        self.validator.is_some()
    }

    /// Whether the validated replace entry points are available
    #[must_use]
    pub fn has_replacer(&self) -> bool {
        self.replacer.is_some()
    }

    /// Whether `get_nodes` is available
    #[must_use]
    pub fn has_node_finder(&self) -> bool {
        self.node_finder.is_some()
    }
}
