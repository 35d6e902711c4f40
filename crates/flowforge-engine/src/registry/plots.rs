//! Plot renderer registry and built-in renderings.
//!
//! Rendering internals are opaque to the engine; the built-ins emit small
//! JSON documents a frontend can turn into real charts. A renderer that
//! fails produces no plot and never fails the owning node.

use std::sync::Arc;

use dashmap::DashMap;

use flowforge_core::{EngineError, EngineResult, ProblemType, RenderedPlot};

/// Read-only view of the pipeline state a renderer may draw from.
pub struct PlotView<'a> {
    pub problem_type: ProblemType,
    pub y_true: &'a [f64],
    pub y_pred: &'a [f64],
    pub probabilities: Option<&'a [Vec<f64>]>,
    pub feature_names: &'a [String],
}

/// A named plot renderer.
pub trait PlotRenderer: Send + Sync {
    fn key(&self) -> &str;

    /// Human-readable plot title.
    fn name(&self) -> &str;

    fn render(&self, view: &PlotView<'_>) -> EngineResult<Vec<u8>>;
}

/// Concurrent plot registry.
pub struct PlotRegistry {
    renderers: DashMap<String, Arc<dyn PlotRenderer>>,
}

impl PlotRegistry {
    pub fn new() -> Self {
        Self {
            renderers: DashMap::new(),
        }
    }

    pub fn builtin() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(ConfusionMatrixPlot));
        registry.register(Arc::new(RocCurvePlot));
        registry.register(Arc::new(PredictionScatterPlot));
        registry.register(Arc::new(ResidualHistogramPlot));
        registry
    }

    pub fn register(&self, renderer: Arc<dyn PlotRenderer>) {
        self.renderers
            .insert(renderer.key().to_string(), renderer);
    }

    pub fn resolve(&self, key: &str) -> Option<Arc<dyn PlotRenderer>> {
        self.renderers.get(key).map(|e| Arc::clone(e.value()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.renderers.contains_key(key)
    }

    /// Renders one plot, wrapping the payload with its display name.
    pub fn render(&self, key: &str, view: &PlotView<'_>) -> Option<EngineResult<RenderedPlot>> {
        let renderer = self.resolve(key)?;
        Some(renderer.render(view).map(|image| RenderedPlot {
            key: key.to_string(),
            name: renderer.name().to_string(),
            image,
        }))
    }
}

impl Default for PlotRegistry {
    fn default() -> Self {
        Self::new()
    }
}

struct ConfusionMatrixPlot;

impl PlotRenderer for ConfusionMatrixPlot {
    fn key(&self) -> &str {
        "confusion_matrix"
    }

    fn name(&self) -> &str {
        "Confusion Matrix"
    }

    fn render(&self, view: &PlotView<'_>) -> EngineResult<Vec<u8>> {
        if !view.problem_type.is_classification() {
            return Err(EngineError::State(
                "confusion_matrix requires a classification problem".to_string(),
            ));
        }
        let mut labels: Vec<f64> = view.y_true.to_vec();
        labels.extend_from_slice(view.y_pred);
        labels.retain(|v| !v.is_nan());
        labels.sort_by(|a, b| a.partial_cmp(b).expect("non-NaN labels"));
        labels.dedup();

        let index_of = |v: f64| labels.iter().position(|l| *l == v);
        let mut matrix = vec![vec![0u64; labels.len()]; labels.len()];
        for (t, p) in view.y_true.iter().zip(view.y_pred) {
            if let (Some(i), Some(j)) = (index_of(*t), index_of(*p)) {
                matrix[i][j] += 1;
            }
        }

        let doc = serde_json::json!({
            "kind": "confusion_matrix",
            "labels": labels,
            "matrix": matrix,
        });
        Ok(serde_json::to_vec(&doc).expect("static document serializes"))
    }
}

struct RocCurvePlot;

impl PlotRenderer for RocCurvePlot {
    fn key(&self) -> &str {
        "roc_curve"
    }

    fn name(&self) -> &str {
        "ROC Curve"
    }

    fn render(&self, view: &PlotView<'_>) -> EngineResult<Vec<u8>> {
        let probabilities = view.probabilities.ok_or_else(|| {
            EngineError::State("roc_curve requires class probabilities".to_string())
        })?;

        // Sweep thresholds over the positive-class probability.
        let mut points = Vec::new();
        for step in 0..=20 {
            let threshold = step as f64 / 20.0;
            let mut tp = 0.0;
            let mut fp = 0.0;
            let mut positives = 0.0;
            let mut negatives = 0.0;
            for (t, proba) in view.y_true.iter().zip(probabilities) {
                let p_positive = proba.last().copied().unwrap_or(0.0);
                let predicted_positive = p_positive >= threshold;
                if *t == 1.0 {
                    positives += 1.0;
                    if predicted_positive {
                        tp += 1.0;
                    }
                } else {
                    negatives += 1.0;
                    if predicted_positive {
                        fp += 1.0;
                    }
                }
            }
            let tpr = if positives > 0.0 { tp / positives } else { 0.0 };
            let fpr = if negatives > 0.0 { fp / negatives } else { 0.0 };
            points.push((fpr, tpr));
        }

        let doc = serde_json::json!({
            "kind": "roc_curve",
            "points": points.iter().map(|(x, y)| serde_json::json!({"fpr": x, "tpr": y})).collect::<Vec<_>>(),
        });
        Ok(serde_json::to_vec(&doc).expect("static document serializes"))
    }
}

struct PredictionScatterPlot;

impl PlotRenderer for PredictionScatterPlot {
    fn key(&self) -> &str {
        "prediction_scatter"
    }

    fn name(&self) -> &str {
        "Predicted vs. Actual"
    }

    fn render(&self, view: &PlotView<'_>) -> EngineResult<Vec<u8>> {
        let doc = serde_json::json!({
            "kind": "prediction_scatter",
            "points": view
                .y_true
                .iter()
                .zip(view.y_pred)
                .map(|(t, p)| serde_json::json!({"actual": t, "predicted": p}))
                .collect::<Vec<_>>(),
        });
        Ok(serde_json::to_vec(&doc).expect("static document serializes"))
    }
}

struct ResidualHistogramPlot;

impl PlotRenderer for ResidualHistogramPlot {
    fn key(&self) -> &str {
        "residual_histogram"
    }

    fn name(&self) -> &str {
        "Residual Histogram"
    }

    fn render(&self, view: &PlotView<'_>) -> EngineResult<Vec<u8>> {
        if view.problem_type.is_classification() {
            return Err(EngineError::State(
                "residual_histogram requires a regression problem".to_string(),
            ));
        }
        let residuals: Vec<f64> = view
            .y_true
            .iter()
            .zip(view.y_pred)
            .map(|(t, p)| t - p)
            .collect();
        let doc = serde_json::json!({
            "kind": "residual_histogram",
            "residuals": residuals,
        });
        Ok(serde_json::to_vec(&doc).expect("static document serializes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classification_view<'a>(
        probabilities: Option<&'a [Vec<f64>]>,
        names: &'a [String],
    ) -> PlotView<'a> {
        PlotView {
            problem_type: ProblemType::Classification,
            y_true: &[1.0, 0.0, 1.0, 0.0],
            y_pred: &[1.0, 0.0, 0.0, 0.0],
            probabilities,
            feature_names: names,
        }
    }

    #[test]
    fn confusion_matrix_counts_cells() {
        let names: Vec<String> = vec![];
        let registry = PlotRegistry::builtin();
        let plot = registry
            .render("confusion_matrix", &classification_view(None, &names))
            .expect("known key")
            .expect("renders");
        let doc: serde_json::Value = serde_json::from_slice(&plot.image).unwrap();
        assert_eq!(doc["matrix"][0][0], 2); // both 0-actual rows predicted 0
        assert_eq!(doc["matrix"][1][0], 1); // one 1-actual row predicted 0
        assert_eq!(doc["matrix"][1][1], 1);
        assert_eq!(plot.name, "Confusion Matrix");
    }

    #[test]
    fn roc_curve_fails_without_probabilities() {
        let names: Vec<String> = vec![];
        let registry = PlotRegistry::builtin();
        let rendered = registry
            .render("roc_curve", &classification_view(None, &names))
            .expect("known key");
        assert!(rendered.is_err());
    }

    #[test]
    fn unknown_key_resolves_to_none() {
        let names: Vec<String> = vec![];
        let registry = PlotRegistry::builtin();
        assert!(registry
            .render("hologram", &classification_view(None, &names))
            .is_none());
    }

    #[test]
    fn residual_histogram_rejects_classification() {
        let names: Vec<String> = vec![];
        let registry = PlotRegistry::builtin();
        let rendered = registry
            .render("residual_histogram", &classification_view(None, &names))
            .expect("known key");
        assert!(rendered.is_err());
    }
}
