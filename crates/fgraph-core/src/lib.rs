//! fgraph core - computation graph mutation and rewrite validation
//!
//! The store and its observers:
//! - [`FunctionGraph`] owns nodes and variables and mutates them through
//!   import, prune and replace
//! - [`Feature`]s observe every mutation and may install capabilities
//! - [`History`] records replacements since the last checkpoint
//! - [`ReplaceValidate`] turns replace + validate into an atomic step
//! - [`NodeFinder`] indexes live nodes by op
//!
//! # Example
//!
//! ```rust,ignore
//! use fgraph_core::prelude::*;
//! use std::sync::Arc;
//!
//! let mut fg = FunctionGraph::default();
//! fg.attach_feature(Arc::new(ReplaceValidate::new()))?;
//! fg.attach_feature(Arc::new(NodeFinder::new()))?;
//!
//! let ty = VarType::scalar(DType::Float64);
//! let a = fg.add_input(ty.clone(), Some("a"));
//! let b = fg.add_input(ty.clone(), Some("b"));
//! let c = fg.apply_single(add, &[a, b], ty.clone())?;
//! fg.add_output(c, Reason::Init)?;
//!
//! let d = fg.apply_single(mul, &[a, b], ty)?;
//! fg.replace_validate(c, d, "add_to_mul")?;
//! ```

pub mod config;
pub mod error;
pub mod feature;
pub mod graph;
pub mod printing;
pub mod types;

pub use config::{FgraphConfig, DEFAULT_TOLERANCE_HINT};
pub use error::{Error, FatalError, FeatureError, GraphError, ReplaceError, Result};
pub use feature::{
    Bookkeeper, Capabilities, Checkpoint, Feature, History, LogMode, Memo, Move,
    NoOutputFromInplace, NodeFinder, Orderings, PreserveVariableAttributes, PrintListener,
    ReplaceEvent, ReplaceValidate, ValidateOptions, ValidationStats, Validator,
};
pub use graph::{
    ApplyNode, Fingerprint, FunctionGraph, GraphSnapshot, NodeShape, ReplaceOutcome, Schedule,
    Variable,
};
pub use printing::{debugprint, DebugPrinter};
pub use types::{
    Client, DType, DestroyMap, GraphId, GraphItem, NodeId, Op, OpKey, Owner, Reason, VarId,
    VarTag, VarType,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with fgraph
    pub use crate::{
        Checkpoint, DType, Feature, FgraphConfig, FunctionGraph, GraphItem, History, NodeFinder,
        NodeId, Op, Reason, ReplaceValidate, Result, VarId, VarType, Validator,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
