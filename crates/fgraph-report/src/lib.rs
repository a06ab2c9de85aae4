//! fgraph report - diagnostics for rewrites that changed program values
//!
//! When an external checker finds that a variable and its replacement
//! computed different values, it builds a [`BadOptimization`] from the
//! graph and both values:
//!
//! ```rust,ignore
//! use fgraph_report::{BadOptimization, RuntimeValue};
//!
//! let report = BadOptimization::new(&fg, old, new, "add_to_mul")
//!     .with_values(old_value, new_value);
//! eprintln!("{report}");
//! ```
//!
//! The graph excerpts are captured on construction; the report text,
//! including the difference statistics, is built when it is displayed.

mod bad_optimization;
pub mod stats;
mod value;

pub use bad_optimization::{BadOptimization, GRAPH_DEPTH, VALUE_TEXT_LIMIT};
pub use stats::{divergence, DiffStats, Divergence, StatsError};
pub use value::{RuntimeValue, ValueError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
