//! Plugin registries: name-to-capability lookup tables.
//!
//! One immutable `Registries` value is constructed at process start and
//! injected into the validator, the executor, and the node handlers. There
//! is no global registry state.

pub mod metrics;
pub mod models;
pub mod plots;
pub mod preprocess;

pub use metrics::MetricsRegistry;
pub use models::ModelRegistry;
pub use plots::PlotRegistry;
pub use preprocess::PreprocessRegistry;

use flowforge_core::RegistryLookup;

/// The four plugin catalogs, bundled for injection.
pub struct Registries {
    pub models: ModelRegistry,
    pub operations: PreprocessRegistry,
    pub metrics: MetricsRegistry,
    pub plots: PlotRegistry,
}

impl Registries {
    /// Empty catalogs; register capabilities by hand.
    pub fn empty() -> Self {
        Self {
            models: ModelRegistry::new(),
            operations: PreprocessRegistry::new(),
            metrics: MetricsRegistry::new(),
            plots: PlotRegistry::new(),
        }
    }

    /// Catalogs preloaded with the built-in capabilities.
    pub fn builtin() -> Self {
        Self {
            models: ModelRegistry::builtin(),
            operations: PreprocessRegistry::builtin(),
            metrics: MetricsRegistry::builtin(),
            plots: PlotRegistry::builtin(),
        }
    }
}

impl RegistryLookup for Registries {
    fn has_algorithm(&self, slug: &str) -> bool {
        self.models.contains(slug)
    }

    fn has_operation(&self, slug: &str) -> bool {
        self.operations.contains(slug)
    }

    fn has_metric(&self, key: &str) -> bool {
        self.metrics.contains(key)
    }

    fn has_plot(&self, key: &str) -> bool {
        self.plots.contains(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalogs_resolve_expected_slugs() {
        let registries = Registries::builtin();
        assert!(registries.has_algorithm("logistic_regression"));
        assert!(registries.has_operation("impute_mean"));
        assert!(registries.has_metric("accuracy"));
        assert!(registries.has_plot("confusion_matrix"));

        assert!(!registries.has_algorithm("skynet"));
        assert!(!registries.has_metric("vibes"));
    }

    #[test]
    fn empty_catalogs_resolve_nothing() {
        let registries = Registries::empty();
        assert!(!registries.has_algorithm("logistic_regression"));
        assert!(!registries.has_operation("impute_mean"));
    }
}
