// 🔀 Hybrid Decision Policy - rules first, ML only when confident
//
// final = ml_category  if a model is trained and confidence > threshold
//         rule_category otherwise
//
// Equality with the threshold keeps the rule result.

use crate::category::CategoryLabel;
use crate::ml::TrainedModel;
use crate::record::ContributionRecord;
use crate::rules::{RuleEngine, RuleTier};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Confidence gate applied when no configuration is supplied.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.7;

// ============================================================================
// POLICY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HybridPolicy {
    pub threshold: f64,
}

impl Default for HybridPolicy {
    fn default() -> Self {
        HybridPolicy {
            threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        }
    }
}

impl HybridPolicy {
    pub fn new(threshold: f64) -> Self {
        HybridPolicy { threshold }
    }

    /// `ml` is `None` when no model is trained.
    pub fn decide(&self, rule: CategoryLabel, ml: Option<CategoryLabel>, confidence: f64) -> CategoryLabel {
        match ml {
            Some(ml) if confidence > self.threshold => ml,
            _ => rule,
        }
    }
}

// ============================================================================
// MODEL SLOT
// ============================================================================

/// Holder of the current model.
///
/// Readers clone the inner `Arc` and classify against a stable model while
/// a retrain runs elsewhere; `install` swaps in the new model only once
/// training has finished.
#[derive(Debug, Clone, Default)]
pub struct ModelSlot {
    inner: Arc<RwLock<Option<Arc<TrainedModel>>>>,
}

impl ModelSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(model: TrainedModel) -> Self {
        let slot = Self::new();
        slot.install(model);
        slot
    }

    pub fn current(&self) -> Option<Arc<TrainedModel>> {
        let guard = self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.clone()
    }

    /// Replace the model; returns the previous one.
    pub fn install(&self, model: TrainedModel) -> Option<Arc<TrainedModel>> {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.replace(Arc::new(model))
    }

    pub fn clear(&self) -> Option<Arc<TrainedModel>> {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.take()
    }

    pub fn is_trained(&self) -> bool {
        self.current().is_some()
    }
}

// ============================================================================
// CLASSIFICATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub rule_category: CategoryLabel,
    /// `None` when no model is trained or prediction failed.
    pub ml_category: Option<CategoryLabel>,
    /// 0.0 when `ml_category` is `None`.
    pub confidence: f64,
    pub final_category: CategoryLabel,
    pub matched_rule: Option<String>,
    pub tier: Option<RuleTier>,
}

impl ClassificationResult {
    pub fn ml_overrode(&self) -> bool {
        self.final_category != self.rule_category
    }
}

// ============================================================================
// HYBRID CLASSIFIER
// ============================================================================

#[derive(Debug, Clone)]
pub struct HybridClassifier {
    engine: Arc<RuleEngine>,
    models: ModelSlot,
    policy: HybridPolicy,
}

impl HybridClassifier {
    pub fn new(engine: Arc<RuleEngine>, models: ModelSlot, policy: HybridPolicy) -> Self {
        HybridClassifier {
            engine,
            models,
            policy,
        }
    }

    /// Rule-only classifier (no model installed).
    pub fn rules_only(engine: Arc<RuleEngine>) -> Self {
        Self::new(engine, ModelSlot::new(), HybridPolicy::default())
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    pub fn models(&self) -> &ModelSlot {
        &self.models
    }

    pub fn policy(&self) -> HybridPolicy {
        self.policy
    }

    fn classify_with(
        &self,
        model: Option<&TrainedModel>,
        employer: Option<&str>,
        name: Option<&str>,
        amount: f64,
    ) -> ClassificationResult {
        let rule = self.engine.evaluate(employer, name);

        let (ml_category, confidence) = match model.map(|m| m.predict(employer, name, amount)) {
            Some(Ok(prediction)) => (Some(prediction.category), prediction.confidence),
            Some(Err(e)) => {
                tracing::warn!(error = %e, "prediction failed; keeping rule category");
                (None, 0.0)
            }
            None => (None, 0.0),
        };

        ClassificationResult {
            rule_category: rule.category,
            ml_category,
            confidence,
            final_category: self.policy.decide(rule.category, ml_category, confidence),
            matched_rule: rule.rule_id,
            tier: rule.tier,
        }
    }

    /// Classify raw fields.
    pub fn classify_fields(&self, employer: Option<&str>, name: Option<&str>, amount: f64) -> ClassificationResult {
        let model = self.models.current();
        self.classify_with(model.as_deref(), employer, name, amount)
    }

    pub fn classify(&self, record: &ContributionRecord) -> ClassificationResult {
        self.classify_fields(record.employer(), Some(record.name()), record.contribution_amount)
    }

    /// Classify a batch against one model snapshot.
    pub fn classify_all(&self, records: &[ContributionRecord]) -> Vec<ClassificationResult> {
        let model = self.models.current();
        records
            .iter()
            .map(|r| {
                self.classify_with(model.as_deref(), r.employer(), Some(r.name()), r.contribution_amount)
            })
            .collect()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MlConfig;
    use crate::ml::TrainingExample;

    #[test]
    fn test_decide_gate() {
        let policy = HybridPolicy::default();
        use CategoryLabel::*;

        assert_eq!(policy.decide(Others, Some(BusinessOwner), 0.85), BusinessOwner);
        assert_eq!(policy.decide(Others, Some(BusinessOwner), 0.7), Others);
        assert_eq!(policy.decide(Others, Some(BusinessOwner), 0.5), Others);
        assert_eq!(policy.decide(Others, Some(BusinessOwner), 0.7000001), BusinessOwner);
        assert_eq!(policy.decide(Lawyer, Some(Individual), 0.65), Lawyer);
        assert_eq!(policy.decide(Lawyer, None, 1.0), Lawyer);
    }

    #[test]
    fn test_rule_only_when_no_model() {
        let classifier = HybridClassifier::rules_only(Arc::new(RuleEngine::builtin()));
        let record = ContributionRecord::new("Jane Roe", Some("Winthrop & Weinstine"), 500.0);

        let result = classifier.classify(&record);
        assert_eq!(result.rule_category, CategoryLabel::Lawyer);
        assert_eq!(result.final_category, CategoryLabel::Lawyer);
        assert_eq!(result.ml_category, None);
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.tier, Some(RuleTier::EmployerOverride));
        assert!(!result.ml_overrode());
    }

    fn small_model() -> TrainedModel {
        let mut examples = Vec::new();
        for i in 0..12 {
            examples.push(TrainingExample {
                employer: Some(format!("Firm {} Law Office", i)),
                name: format!("Person {}", i),
                amount: 100.0,
                label: CategoryLabel::Lawyer,
            });
            examples.push(TrainingExample {
                employer: Some("Retired".to_string()),
                name: format!("Person {}", i),
                amount: 50.0,
                label: CategoryLabel::Individual,
            });
        }
        let config = MlConfig {
            n_estimators: 20,
            ..MlConfig::default()
        };
        TrainedModel::train(&examples, &config).unwrap()
    }

    #[test]
    fn test_model_slot_swap() {
        let slot = ModelSlot::new();
        assert!(!slot.is_trained());

        let reader = slot.clone();
        assert!(slot.install(small_model()).is_none());
        assert!(reader.is_trained());

        let held = reader.current().unwrap();
        let previous = slot.install(small_model()).unwrap();
        assert!(Arc::ptr_eq(&held, &previous));

        assert!(slot.clear().is_some());
        assert!(!reader.is_trained());
    }

    #[test]
    fn test_hybrid_with_model_respects_gate() {
        let classifier = HybridClassifier::new(
            Arc::new(RuleEngine::builtin()),
            ModelSlot::with_model(small_model()),
            HybridPolicy::default(),
        );

        let record = ContributionRecord::new("Person 3", Some("Retired"), 50.0);
        let result = classifier.classify(&record);

        assert!(result.ml_category.is_some());
        assert!((0.0..=1.0).contains(&result.confidence));
        let expected = HybridPolicy::default().decide(
            result.rule_category,
            result.ml_category,
            result.confidence,
        );
        assert_eq!(result.final_category, expected);

        // a threshold of 1.0 can never be exceeded
        let strict = HybridClassifier::new(
            Arc::new(RuleEngine::builtin()),
            classifier.models().clone(),
            HybridPolicy::new(1.0),
        );
        let batch = strict.classify_all(&[record]);
        assert_eq!(batch[0].final_category, batch[0].rule_category);
    }
}
