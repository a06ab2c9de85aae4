//! Small stateless features

use super::{Feature, ReplaceEvent};
use crate::error::{GraphError, Result};
use crate::graph::FunctionGraph;
use crate::types::{NodeId, Reason};
use std::sync::Arc;

/// Logs every lifecycle event while `active`
#[derive(Debug, Clone, Copy, Default)]
pub struct PrintListener {
    /// Whether events are logged
    pub active: bool,
}

impl PrintListener {
    /// Listener that logs when `active`
    #[must_use]
    pub fn new(active: bool) -> Self {
        Self { active }
    }
}

impl Feature for PrintListener {
    fn name(&self) -> &'static str {
        "PrintListener"
    }

    fn on_attach(self: Arc<Self>, fg: &mut FunctionGraph) -> Result<()> {
        if self.active {
            tracing::info!(target: "fgraph::print", "-- attaching to {}", fg.id());
        }
        Ok(())
    }

    fn on_detach(self: Arc<Self>, fg: &mut FunctionGraph) -> Result<()> {
        if self.active {
            tracing::info!(target: "fgraph::print", "-- detaching from {}", fg.id());
        }
        Ok(())
    }

    fn on_import(&self, fg: &mut FunctionGraph, node: NodeId, reason: &Reason) -> Result<()> {
        if self.active {
            let op = fg.node(node)?.op().name().into_owned();
            tracing::info!(target: "fgraph::print", "-- importing: {} {} ({})", op, node, reason);
        }
        Ok(())
    }

    fn on_prune(&self, fg: &mut FunctionGraph, node: NodeId, reason: &Reason) -> Result<()> {
        if self.active {
            let op = fg.node(node)?.op().name().into_owned();
            tracing::info!(target: "fgraph::print", "-- pruning: {} {} ({})", op, node, reason);
        }
        Ok(())
    }

    fn on_replace_nodes(&self, _fg: &mut FunctionGraph, event: &ReplaceEvent<'_>) -> Result<()> {
        if self.active {
            for (old, new) in event.pairs {
                tracing::info!(target: "fgraph::print", "-- replacing: {} -> {} ({})", old, new, event.reason);
            }
        }
        Ok(())
    }
}

/// Carries names and NaN-guard tags over to replacement variables
#[derive(Debug, Clone, Copy, Default)]
pub struct PreserveVariableAttributes;

impl Feature for PreserveVariableAttributes {
    fn name(&self) -> &'static str {
        "PreserveVariableAttributes"
    }

    fn on_replace_nodes(&self, fg: &mut FunctionGraph, event: &ReplaceEvent<'_>) -> Result<()> {
        for (&old, &new) in event.memo {
            let (name, guard) = {
                let record = fg.var(old)?;
                (record.name().map(str::to_string), record.tag().nan_guard_mode_check)
            };
            let target = fg.var(new)?;
            if target.name().is_none() && name.is_some() {
                fg.set_var_name(new, name)?;
            }
            let target = fg.var(new)?;
            if guard && !target.tag().nan_guard_mode_check {
                let mut tag = target.tag().clone();
                tag.nan_guard_mode_check = true;
                fg.set_var_tag(new, tag)?;
            }
        }
        Ok(())
    }
}

/// Forbids protected outputs from being computed in place
///
/// Protects `outputs()[first..last]`, with `last` defaulting to the end.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOutputFromInplace {
    first: usize,
    last: Option<usize>,
}

impl NoOutputFromInplace {
    /// Protect outputs `first..last`
    #[must_use]
    pub fn new(first: usize, last: Option<usize>) -> Self {
        Self { first, last }
    }

    /// Protect every output
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }
}

impl Feature for NoOutputFromInplace {
    fn name(&self) -> &'static str {
        "NoOutputFromInplace"
    }

    fn validate(&self, fg: &mut FunctionGraph) -> Result<()> {
        let outputs = fg.outputs();
        let last = self.last.unwrap_or(outputs.len()).min(outputs.len());
        let protected = outputs.get(self.first..last).unwrap_or_default();
        for &out in protected {
            let Some(owner) = fg.var(out)?.owner() else {
                continue;
            };
            if fg.node(owner.node)?.op().destroy_map().contains_key(&owner.index) {
                return Err(GraphError::Inconsistency(format!(
                    "a feature has requested that outputs of the graph be prevented from being \
                     the result of in-place operations; this prevented output {out} from being \
                     computed by modifying another variable in place"
                ))
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DType, DestroyMap, Op, VarTag, VarType};
    use std::borrow::Cow;

    #[derive(Debug)]
    struct Inplace(bool);

    impl Op for Inplace {
        fn name(&self) -> Cow<'_, str> {
            Cow::Borrowed(if self.0 { "add_inplace" } else { "add" })
        }

        fn destroy_map(&self) -> DestroyMap {
            if self.0 {
                DestroyMap::from([(0, vec![0])])
            } else {
                DestroyMap::new()
            }
        }
    }

    #[test]
    fn inplace_outputs_are_rejected() {
        let ty = VarType::scalar(DType::Float64);
        let mut fg = FunctionGraph::default();
        let x = fg.add_input(ty.clone(), None);
        let y = fg.apply_single(Arc::new(Inplace(true)), &[x, x], ty.clone()).unwrap();
        let z = fg.apply_single(Arc::new(Inplace(false)), &[x, x], ty).unwrap();
        fg.add_output(y, Reason::Init).unwrap();
        fg.add_output(z, Reason::Init).unwrap();

        assert!(NoOutputFromInplace::all().validate(&mut fg).is_err());
        assert!(NoOutputFromInplace::new(1, None).validate(&mut fg).is_ok());
        assert!(NoOutputFromInplace::new(5, Some(9)).validate(&mut fg).is_ok());
    }

    #[test]
    fn names_follow_replacements() {
        let ty = VarType::scalar(DType::Float64);
        let mut fg = FunctionGraph::default();
        fg.attach_feature(Arc::new(PreserveVariableAttributes)).unwrap();
        let x = fg.add_input(ty.clone(), Some("x"));
        let y = fg.apply_single(Arc::new(Inplace(false)), &[x, x], ty.clone()).unwrap();
        fg.set_var_name(y, Some("doubled".to_string())).unwrap();
        fg.set_var_tag(y, VarTag { nan_guard_mode_check: true }).unwrap();
        let z = fg.apply_single(Arc::new(Inplace(true)), &[x, x], ty).unwrap();
        fg.add_output(y, Reason::Init).unwrap();

        fg.replace(&[(y, z)], "to_inplace", None).unwrap();
        let record = fg.var(z).unwrap();
        assert_eq!(record.name(), Some("doubled"));
        assert!(record.tag().nan_guard_mode_check);
    }
}
