//! Index of live nodes by op

use super::{Bookkeeper, Feature, ReplaceEvent};
use crate::error::{FeatureError, GraphError, Result};
use crate::graph::FunctionGraph;
use crate::types::{GraphId, NodeId, Op, OpKey, Reason, VarId};
use indexmap::{IndexMap, IndexSet};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug, Default)]
struct FinderState {
    graph: Option<GraphId>,
    index: IndexMap<OpKey, IndexSet<NodeId>>,
}

/// Maps every hashable op to the live nodes applying it
///
/// Nodes whose op has no key are left out of the index.
#[derive(Debug, Default)]
pub struct NodeFinder {
    state: Mutex<FinderState>,
}

impl NodeFinder {
    /// Detached, empty finder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Live nodes applying `op`, in import order
    ///
    /// # Errors
    /// `UnhashableOp` if `op` has no key.
    pub fn query(&self, op: &dyn Op) -> Result<Vec<NodeId>> {
        let key = op.key().ok_or_else(|| GraphError::UnhashableOp {
            op: op.name().into_owned(),
        })?;
        let state = self.state.lock();
        Ok(state
            .index
            .get(&key)
            .map(|nodes| nodes.iter().copied().collect())
            .unwrap_or_default())
    }

    /// The whole index, empty entries omitted
    #[must_use]
    pub fn entries(&self) -> IndexMap<OpKey, Vec<NodeId>> {
        self.state
            .lock()
            .index
            .iter()
            .filter(|(_, nodes)| !nodes.is_empty())
            .map(|(key, nodes)| (key.clone(), nodes.iter().copied().collect()))
            .collect()
    }

    fn key_of(fg: &FunctionGraph, node: NodeId) -> Result<Option<OpKey>> {
        Ok(fg.node(node)?.op().key())
    }

    fn owner_node(fg: &FunctionGraph, var: VarId) -> Result<Option<NodeId>> {
        Ok(fg.var(var)?.owner().map(|owner| owner.node))
    }
}

impl Feature for NodeFinder {
    fn name(&self) -> &'static str {
        "NodeFinder"
    }

    fn on_attach(self: Arc<Self>, fg: &mut FunctionGraph) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.graph.is_some() {
                return Err(FeatureError::AlreadyAttached {
                    feature: self.name().to_string(),
                }
                .into());
            }
            if fg.capabilities.node_finder.is_some() {
                return Err(FeatureError::AlreadyThere {
                    feature: self.name().to_string(),
                }
                .into());
            }
            state.graph = Some(fg.id());
        }
        if let Err(err) = self.replay_imports(fg) {
            *self.state.lock() = FinderState::default();
            return Err(err);
        }
        fg.capabilities.node_finder = Some(self);
        Ok(())
    }

    fn on_detach(self: Arc<Self>, fg: &mut FunctionGraph) -> Result<()> {
        if self.state.lock().graph != Some(fg.id()) {
            return Err(FeatureError::NotAttached {
                feature: self.name().to_string(),
            }
            .into());
        }
        fg.capabilities.node_finder = None;
        self.replay_prunes(fg)?;
        *self.state.lock() = FinderState::default();
        Ok(())
    }

    fn on_import(&self, fg: &mut FunctionGraph, node: NodeId, _reason: &Reason) -> Result<()> {
        let Some(key) = Self::key_of(fg, node)? else {
            return Ok(());
        };
        self.state.lock().index.entry(key).or_default().insert(node);
        Ok(())
    }

    fn on_prune(&self, fg: &mut FunctionGraph, node: NodeId, _reason: &Reason) -> Result<()> {
        let Some(key) = Self::key_of(fg, node)? else {
            return Ok(());
        };
        let mut state = self.state.lock();
        let removed = state
            .index
            .get_mut(&key)
            .is_some_and(|nodes| nodes.shift_remove(&node));
        if !removed {
            return Err(GraphError::IndexCorrupted { node }.into());
        }
        Ok(())
    }

    fn on_replace_nodes(&self, fg: &mut FunctionGraph, event: &ReplaceEvent<'_>) -> Result<()> {
        // import/prune keep the index current; settling memo owners here
        // must stay idempotent
        for (&old, &new) in event.memo {
            if let Some(node) = Self::owner_node(fg, old)? {
                if !fg.contains_node(node) {
                    if let Some(key) = Self::key_of(fg, node)? {
                        if let Some(nodes) = self.state.lock().index.get_mut(&key) {
                            nodes.shift_remove(&node);
                        }
                    }
                }
            }
            if let Some(node) = Self::owner_node(fg, new)? {
                if fg.contains_node(node) {
                    if let Some(key) = Self::key_of(fg, node)? {
                        self.state.lock().index.entry(key).or_default().insert(node);
                    }
                }
            }
        }
        Ok(())
    }
}

impl Bookkeeper for NodeFinder {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::{DType, VarType};
    use std::borrow::Cow;

    #[derive(Debug)]
    struct Named(&'static str, bool);

    impl Op for Named {
        fn name(&self) -> Cow<'_, str> {
            Cow::Borrowed(self.0)
        }

        fn key(&self) -> Option<OpKey> {
            self.1.then(|| OpKey::new(self.0))
        }
    }

    #[test]
    fn attach_replays_existing_nodes() {
        let ty = VarType::scalar(DType::Float64);
        let mut fg = FunctionGraph::default();
        let x = fg.add_input(ty.clone(), None);
        let y = fg.apply_single(Arc::new(Named("exp", true)), &[x], ty.clone()).unwrap();
        let z = fg.apply_single(Arc::new(Named("exp", true)), &[y], ty).unwrap();
        fg.add_output(z, Reason::Init).unwrap();

        fg.attach_feature(Arc::new(NodeFinder::new())).unwrap();
        let nodes = fg.get_nodes(&Named("exp", true)).unwrap();
        assert_eq!(nodes.len(), 2);
        assert!(fg.get_nodes(&Named("log", true)).unwrap().is_empty());
    }

    #[test]
    fn unhashable_ops_are_skipped() {
        let ty = VarType::scalar(DType::Float64);
        let mut fg = FunctionGraph::default();
        fg.attach_feature(Arc::new(NodeFinder::new())).unwrap();
        let x = fg.add_input(ty.clone(), None);
        let y = fg.apply_single(Arc::new(Named("opaque", false)), &[x], ty).unwrap();
        fg.add_output(y, Reason::Init).unwrap();

        let err = fg.get_nodes(&Named("opaque", false)).unwrap_err();
        assert!(matches!(err, Error::Graph(GraphError::UnhashableOp { .. })));
    }

    #[test]
    fn detach_uninstalls_the_query() {
        let mut fg = FunctionGraph::default();
        let finder: Arc<dyn Feature> = Arc::new(NodeFinder::new());
        fg.attach_feature(finder.clone()).unwrap();
        assert!(fg.capabilities().has_node_finder());

        fg.remove_feature(&finder).unwrap();
        assert!(!fg.capabilities().has_node_finder());
        assert!(fg.get_nodes(&Named("exp", true)).is_err());
    }
}
