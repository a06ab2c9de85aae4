//! Text rendering of variable subgraphs
//!
//! ```text
//! add [id A] 'c' <float64, ()>
//!  |a [id B] <float64, ()>
//!  |b [id C] <float64, ()>
//! ```
//!
//! Every node and leaf gets a short id on first appearance; a node that
//! was already printed is shown again by id only. A [`DebugPrinter`] keeps
//! its ids across calls, so several excerpts of one graph agree on them.

use crate::graph::FunctionGraph;
use crate::types::{NodeId, VarId};
use std::collections::HashMap;
use std::fmt::Write;

/// Render the subgraph computing `var`, at most `depth` levels deep
///
/// Ids that this graph never allocated are rendered as `<unknown vN>`.
#[must_use]
pub fn debugprint(fg: &FunctionGraph, var: VarId, depth: usize, print_type: bool) -> String {
    DebugPrinter::new(fg, print_type).print(var, depth)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Label {
    Node(NodeId),
    Var(VarId),
}

/// Renders several subgraphs of one graph with a shared id table
///
/// A node expanded by an earlier [`print`](Self::print) is shown by id
/// only in later ones.
pub struct DebugPrinter<'a> {
    fg: &'a FunctionGraph,
    print_type: bool,
    ids: HashMap<Label, String>,
    expanded: Vec<NodeId>,
    out: String,
}

impl<'a> DebugPrinter<'a> {
    /// Printer with an empty id table
    #[must_use]
    pub fn new(fg: &'a FunctionGraph, print_type: bool) -> Self {
        Self {
            fg,
            print_type,
            ids: HashMap::new(),
            expanded: Vec::new(),
            out: String::new(),
        }
    }

    /// Render the subgraph computing `var`, at most `depth` levels deep
    pub fn print(&mut self, var: VarId, depth: usize) -> String {
        self.var(var, "", "", depth);
        std::mem::take(&mut self.out)
    }
}

impl DebugPrinter<'_> {
    fn id(&mut self, label: Label) -> String {
        let next = self.ids.len();
        self.ids.entry(label).or_insert_with(|| alpha_id(next)).clone()
    }

    fn var(&mut self, var: VarId, prefix: &str, prefix_child: &str, depth: usize) {
        let fg = self.fg;
        let Ok(record) = fg.var(var) else {
            let _ = writeln!(self.out, "{prefix}<unknown {var}>");
            return;
        };
        let name = record.name().map(|n| format!(" '{n}'")).unwrap_or_default();
        let ty = if self.print_type {
            format!(" <{}>", record.ty())
        } else {
            String::new()
        };

        let Some(owner) = record.owner() else {
            let id = self.id(Label::Var(var));
            let shown = record.name().map_or_else(|| var.to_string(), str::to_string);
            let _ = writeln!(self.out, "{prefix}{shown} [id {id}]{ty}");
            return;
        };
        let Ok(node) = fg.node(owner.node) else {
            let _ = writeln!(self.out, "{prefix}<unknown {}>", owner.node);
            return;
        };

        let id = self.id(Label::Node(owner.node));
        let op = if node.outputs().len() > 1 {
            format!("{}.{}", node.op().name(), owner.index)
        } else {
            node.op().name().into_owned()
        };
        let seen = self.expanded.contains(&owner.node);
        let elided = if seen && !node.inputs().is_empty() { " ..." } else { "" };
        let _ = writeln!(self.out, "{prefix}{op} [id {id}]{name}{ty}{elided}");

        if seen || depth <= 1 {
            return;
        }
        self.expanded.push(owner.node);
        let inputs = node.inputs();
        let head = format!("{prefix_child} |");
        for (position, &input) in inputs.iter().enumerate() {
            let tail = if position + 1 == inputs.len() {
                format!("{prefix_child}  ")
            } else {
                format!("{prefix_child} |")
            };
            self.var(input, &head, &tail, depth - 1);
        }
    }
}

/// A, B, ..., Z, BA, BB, ...
fn alpha_id(mut n: usize) -> String {
    let mut digits = Vec::new();
    loop {
        digits.push(b'A' + u8::try_from(n % 26).unwrap_or(0));
        n /= 26;
        if n == 0 {
            break;
        }
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}
