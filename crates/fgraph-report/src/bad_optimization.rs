//! Report for a replacement that changed a computed value

use crate::stats::divergence;
use crate::value::RuntimeValue;
use fgraph_core::{DebugPrinter, FunctionGraph, Reason, VarId};
use std::fmt::{self, Write};

/// Longest printed form of a value before it is cut
pub const VALUE_TEXT_LIMIT: usize = 800;

/// Depth of the graph excerpts captured for old and new
pub const GRAPH_DEPTH: usize = 6;

/// A variable and its replacement took different values at run time
///
/// Everything that depends on the graph is captured when the report is
/// built, so it stays accurate after the graph is reverted. The text itself
/// is only assembled when the report is displayed.
#[derive(Debug, Clone, PartialEq)]
pub struct BadOptimization {
    report: Report,
}

#[derive(Debug, Clone, PartialEq)]
enum Report {
    Message(String),
    Divergent(Box<Divergent>),
}

#[derive(Debug, Clone, PartialEq)]
struct Divergent {
    old: VarId,
    new: VarId,
    old_value: Option<RuntimeValue>,
    new_value: Option<RuntimeValue>,
    reason: Reason,
    new_label: String,
    new_op: String,
    old_graph: String,
    new_graph: String,
    tolerance_hint: String,
}

impl BadOptimization {
    /// Report on `new` having replaced `old` in `fg` because of `reason`
    ///
    /// Both graph excerpts share one id table: a subgraph already shown
    /// under the old variable keeps its id and is elided under the new one.
    #[must_use]
    pub fn new(fg: &FunctionGraph, old: VarId, new: VarId, reason: impl Into<Reason>) -> Self {
        let mut printer = DebugPrinter::new(fg, true);
        let old_graph = indent(&printer.print(old, GRAPH_DEPTH));
        let new_graph = indent(&printer.print(new, GRAPH_DEPTH));
        let report = Divergent {
            old,
            new,
            old_value: None,
            new_value: None,
            reason: reason.into(),
            new_label: label(fg, new),
            new_op: op_text(fg, new),
            old_graph,
            new_graph,
            tolerance_hint: fg.config().tolerance_hint.clone(),
        };
        Self {
            report: Report::Divergent(Box::new(report)),
        }
    }

    /// Preformatted report, rendered verbatim
    #[must_use]
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            report: Report::Message(text.into()),
        }
    }

    /// Attach the values computed for old and new
    #[must_use]
    pub fn with_values(mut self, old_value: RuntimeValue, new_value: RuntimeValue) -> Self {
        if let Report::Divergent(report) = &mut self.report {
            report.old_value = Some(old_value);
            report.new_value = Some(new_value);
        }
        self
    }

    /// The `(old, new)` pair, unless this is a preformatted message
    #[must_use]
    pub fn pair(&self) -> Option<(VarId, VarId)> {
        match &self.report {
            Report::Divergent(report) => Some((report.old, report.new)),
            Report::Message(_) => None,
        }
    }

    /// Graph excerpt leading to the old variable, as captured
    #[must_use]
    pub fn old_graph(&self) -> Option<&str> {
        match &self.report {
            Report::Divergent(report) => Some(&report.old_graph),
            Report::Message(_) => None,
        }
    }

    /// Graph excerpt leading to the new variable, as captured
    #[must_use]
    pub fn new_graph(&self) -> Option<&str> {
        match &self.report {
            Report::Divergent(report) => Some(&report.new_graph),
            Report::Message(_) => None,
        }
    }

    /// Multi-line description of the divergence
    #[must_use]
    pub fn str_diagnostic(&self) -> String {
        match &self.report {
            Report::Message(text) => text.clone(),
            Report::Divergent(report) => report.render(),
        }
    }
}

impl Divergent {
    fn render(&self) -> String {
        let mut out = String::new();
        let _ = self.write_to(&mut out);
        out
    }

    fn write_to(&self, out: &mut String) -> fmt::Result {
        writeln!(out, "BadOptimization Error")?;
        writeln!(out, "  Variable: id {}", self.new_label)?;
        writeln!(out, "  Op {}", self.new_op)?;
        let value_type = self.new_value.as_ref().map_or("None", RuntimeValue::type_name);
        writeln!(out, "  Value Type: {value_type}")?;

        write_value(out, "Old", self.old_value.as_ref())?;
        write_value(out, "New", self.new_value.as_ref())?;

        if let (Some(old), Some(new)) = (&self.old_value, &self.new_value) {
            match divergence(old, new) {
                Ok(stats) => write!(out, "{stats}")?,
                Err(err) => tracing::debug!("Omitting difference statistics: {}", err),
            }
        }

        writeln!(out, "  Reason:  {}", self.reason)?;
        writeln!(out, "  Old Graph:")?;
        writeln!(out, "{}", self.old_graph)?;
        writeln!(out, "  New Graph:")?;
        writeln!(out, "{}", self.new_graph)?;
        writeln!(out)?;
        writeln!(out, "{}", self.tolerance_hint)
    }
}

fn write_value(out: &mut String, which: &str, value: Option<&RuntimeValue>) -> fmt::Result {
    if let Some((shape, dtype, strides)) = value.and_then(RuntimeValue::layout) {
        writeln!(
            out,
            "  {which} Value shape, dtype, strides: {} {dtype} {}",
            tuple(shape),
            tuple(strides)
        )?;
    }
    let text = value.map_or_else(|| "None".to_string(), ToString::to_string);
    if text.chars().count() > VALUE_TEXT_LIMIT {
        let cut: String = text.chars().take(VALUE_TEXT_LIMIT).collect();
        writeln!(out, "  {which} Value:  {cut} ...")
    } else {
        writeln!(out, "  {which} Value:  {text}")
    }
}

/// `(2, 3)`, `(2,)` or `()`
fn tuple<T: fmt::Display>(items: &[T]) -> String {
    let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
    match parts.as_slice() {
        [single] => format!("({single},)"),
        _ => format!("({})", parts.join(", ")),
    }
}

fn indent(text: &str) -> String {
    text.lines().map(|line| format!("  {line}")).collect::<Vec<_>>().join("\n")
}

fn label(fg: &FunctionGraph, var: VarId) -> String {
    match fg.var(var).ok().and_then(|record| record.name()) {
        Some(name) => format!("{var} '{name}'"),
        None => var.to_string(),
    }
}

fn op_text(fg: &FunctionGraph, var: VarId) -> String {
    let Some(owner) = fg.var(var).ok().and_then(|record| record.owner()) else {
        return "None".to_string();
    };
    let Ok(node) = fg.node(owner.node) else {
        return "None".to_string();
    };
    let inputs: Vec<String> = node.inputs().iter().map(|&input| label(fg, input)).collect();
    format!("{}({})", node.op().name(), inputs.join(", "))
}

impl fmt::Display for BadOptimization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.str_diagnostic())
    }
}

impl std::error::Error for BadOptimization {}
