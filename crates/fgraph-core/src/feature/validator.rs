//! Validation capability

use super::Feature;
use crate::error::{FeatureError, Result};
use crate::graph::FunctionGraph;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How a validation failure is reported
///
/// Callers that format the failure themselves pass `report_failure: false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidateOptions {
    /// Log the failure from inside the validator
    pub report_failure: bool,
    /// Caller runs in verbose mode
    pub verbose: bool,
}

impl ValidateOptions {
    /// Let the validator log failures when `verbose` is set
    #[must_use]
    pub fn reporting(verbose: bool) -> Self {
        Self {
            report_failure: true,
            verbose,
        }
    }

    /// Never log; the caller reports
    #[must_use]
    pub fn quiet() -> Self {
        Self::default()
    }
}

/// Cumulative validation cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationStats {
    /// Validation passes run
    pub calls: u64,
    /// Passes that failed
    pub failures: u64,
    /// Time spent validating
    pub total: Duration,
}

/// Runs every feature's `validate` hook on demand
#[derive(Debug, Default)]
pub struct Validator {
    stats: Mutex<ValidationStats>,
}

impl Validator {
    /// Fresh validator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Statistics so far
    #[must_use]
    pub fn stats(&self) -> ValidationStats {
        *self.stats.lock()
    }

    /// Run every attached feature's validation hook, in attachment order
    ///
    /// # Errors
    /// The first hook failure.
    pub fn validate(&self, fg: &mut FunctionGraph, options: ValidateOptions) -> Result<()> {
        let started = Instant::now();
        let result = fg.execute_callbacks(|feature, fg| feature.validate(fg));
        let elapsed = started.elapsed();

        {
            let mut stats = self.stats.lock();
            stats.calls += 1;
            stats.total += elapsed;
            if result.is_err() {
                stats.failures += 1;
            }
        }

        if let Err(err) = &result {
            if options.report_failure && options.verbose {
                tracing::info!(target: "fgraph::validate", "validate failed: {}", err);
            }
        }
        result
    }

    /// Whether validation passes right now
    pub fn consistent(&self, fg: &mut FunctionGraph) -> bool {
        self.validate(fg, ValidateOptions::quiet()).is_ok()
    }
}

impl Feature for Validator {
    fn name(&self) -> &'static str {
        "Validator"
    }

    fn on_attach(self: Arc<Self>, fg: &mut FunctionGraph) -> Result<()> {
        if fg.capabilities.validator.is_some() {
            return Err(FeatureError::AlreadyThere {
                feature: self.name().to_string(),
            }
            .into());
        }
        fg.capabilities.validator = Some(self);
        Ok(())
    }

    fn on_detach(self: Arc<Self>, fg: &mut FunctionGraph) -> Result<()> {
        if fg
            .capabilities
            .validator
            .as_ref()
            .is_some_and(|installed| Arc::ptr_eq(installed, &self))
        {
            fg.capabilities.validator = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GraphError;

    #[derive(Debug)]
    struct Reject;

    impl Feature for Reject {
        fn name(&self) -> &'static str {
            "Reject"
        }

        fn validate(&self, _fg: &mut FunctionGraph) -> Result<()> {
            Err(GraphError::Inconsistency("rejected".to_string()).into())
        }
    }

    #[test]
    fn counts_calls_and_failures() {
        let mut fg = FunctionGraph::default();
        fg.attach_feature(Arc::new(Validator::new())).unwrap();
        assert!(fg.consistent());

        let reject: Arc<dyn Feature> = Arc::new(Reject);
        fg.attach_feature(reject.clone()).unwrap();
        assert!(!fg.consistent());
        assert!(fg.validate().is_err());

        let stats = fg.validation_stats().unwrap();
        assert_eq!(stats.calls, 3);
        assert_eq!(stats.failures, 2);

        fg.remove_feature(&reject).unwrap();
        assert!(fg.consistent());
    }

    #[test]
    fn without_validator_nothing_is_consistent() {
        let mut fg = FunctionGraph::default();
        assert!(!fg.consistent());
        assert!(fg.validate().is_err());
    }
}
