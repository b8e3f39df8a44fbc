// 🤖 Supervised Classifier - train, evaluate, predict, persist
//
// Features per record: TF-IDF of the normalized "employer name" text,
// followed by employer length, name length and ln(1 + amount).

use crate::category::CategoryLabel;
use crate::config::MlConfig;
use crate::error::ClassifierError;
use crate::ml::forest::{argmax, ForestParams, RandomForest};
use crate::ml::metrics::EvaluationReport;
use crate::ml::vectorizer::{TfidfVectorizer, VectorizerParams};
use crate::normalize::normalize;
use crate::record::ContributionRecord;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

// ============================================================================
// INPUTS / OUTPUTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub employer: Option<String>,
    pub name: String,
    pub amount: f64,
    pub label: CategoryLabel,
}

impl TrainingExample {
    pub fn from_record(record: &ContributionRecord, label: CategoryLabel) -> Self {
        TrainingExample {
            employer: record.contributor_employer.clone(),
            name: record.contributor_name.clone(),
            amount: record.contribution_amount,
            label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub category: CategoryLabel,
    /// Maximum class probability, in [0, 1].
    pub confidence: f64,
    pub probabilities: BTreeMap<CategoryLabel, f64>,
}

/// Text the vectorizer sees for one record.
pub fn feature_text(employer: Option<&str>, name: Option<&str>) -> String {
    format!("{} {}", normalize(employer), normalize(name))
        .trim()
        .to_string()
}

// ============================================================================
// SPLITTING
// ============================================================================

/// Seeded train/test split of `labels` indices.
///
/// Stratified by label when every label has at least two examples and both
/// sides can hold one of each; otherwise a plain seeded shuffle.
pub fn train_test_split(
    labels: &[CategoryLabel],
    test_size: f64,
    seed: u64,
) -> (Vec<usize>, Vec<usize>) {
    let n = labels.len();
    let n_test = ((test_size * n as f64).ceil() as usize).clamp(1, n.saturating_sub(1).max(1));
    let mut rng = StdRng::seed_from_u64(seed);

    let mut by_label: BTreeMap<CategoryLabel, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        by_label.entry(*label).or_default().push(i);
    }

    let k = by_label.len();
    let stratifiable =
        by_label.values().all(|members| members.len() >= 2) && n_test >= k && n - n_test >= k;

    if !stratifiable {
        tracing::debug!(classes = k, "label counts too small to stratify; using shuffled split");
        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut rng);
        let train = order.split_off(n_test);
        return (train, order);
    }

    // proportional allocation, remainder to the largest fractional parts
    let mut alloc: Vec<(CategoryLabel, usize, f64)> = by_label
        .iter()
        .map(|(label, members)| {
            let exact = members.len() as f64 * n_test as f64 / n as f64;
            (*label, exact.floor() as usize, exact - exact.floor())
        })
        .collect();

    let mut assigned: usize = alloc.iter().map(|(_, a, _)| a).sum();
    let mut by_fraction: Vec<usize> = (0..alloc.len()).collect();
    by_fraction.sort_by(|&a, &b| alloc[b].2.total_cmp(&alloc[a].2).then(a.cmp(&b)));
    for idx in by_fraction {
        if assigned >= n_test {
            break;
        }
        let members = by_label[&alloc[idx].0].len();
        if alloc[idx].1 + 1 < members {
            alloc[idx].1 += 1;
            assigned += 1;
        }
    }

    let mut train = Vec::new();
    let mut test = Vec::new();
    for (label, take, _) in alloc {
        let mut members = by_label[&label].clone();
        members.shuffle(&mut rng);
        test.extend_from_slice(&members[..take]);
        train.extend_from_slice(&members[take..]);
    }
    train.sort_unstable();
    test.sort_unstable();

    (train, test)
}

// ============================================================================
// TRAINED MODEL
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    vectorizer: TfidfVectorizer,
    forest: RandomForest,
    pub trained_at: DateTime<Utc>,
    pub training_records: usize,
    pub labels: Vec<CategoryLabel>,
    pub evaluation: EvaluationReport,
}

impl TrainedModel {
    fn features(
        vectorizer: &TfidfVectorizer,
        employer: Option<&str>,
        name: Option<&str>,
        amount: f64,
    ) -> Vec<f64> {
        let mut row = vectorizer.transform(&feature_text(employer, name));
        row.push(normalize(employer).chars().count() as f64);
        row.push(normalize(name).chars().count() as f64);
        row.push(amount.max(0.0).ln_1p());
        row
    }

    /// Fit on labeled examples with a held-out evaluation split.
    ///
    /// Fails with `InsufficientData` below two examples or two distinct
    /// labels; callers then keep rule-only output.
    pub fn train(examples: &[TrainingExample], config: &MlConfig) -> Result<Self, ClassifierError> {
        let distinct: BTreeSet<CategoryLabel> = examples.iter().map(|e| e.label).collect();
        if examples.len() < 2 || distinct.len() < 2 {
            return Err(ClassifierError::InsufficientData {
                records: examples.len(),
                distinct_labels: distinct.len(),
            });
        }

        let labels: Vec<CategoryLabel> = examples.iter().map(|e| e.label).collect();
        let (train_idx, test_idx) =
            train_test_split(&labels, config.test_size, config.random_state);

        let train_texts: Vec<String> = train_idx
            .iter()
            .map(|&i| feature_text(examples[i].employer.as_deref(), Some(&examples[i].name)))
            .collect();
        let vectorizer = TfidfVectorizer::fit(
            &train_texts,
            VectorizerParams {
                max_features: config.max_features,
                min_df: config.min_df,
                ngram_range: config.ngram_range,
                stop_words: true,
            },
        );

        let rows = |indices: &[usize]| -> Vec<Vec<f64>> {
            indices
                .iter()
                .map(|&i| {
                    let e = &examples[i];
                    Self::features(&vectorizer, e.employer.as_deref(), Some(&e.name), e.amount)
                })
                .collect()
        };

        let x_train = rows(&train_idx);
        let y_train: Vec<usize> = train_idx.iter().map(|&i| labels[i].index()).collect();

        let forest = RandomForest::fit(
            &x_train,
            &y_train,
            CategoryLabel::ALL.len(),
            &ForestParams {
                n_estimators: config.n_estimators,
                seed: config.random_state,
                ..ForestParams::default()
            },
        )?;

        let truth: Vec<CategoryLabel> = test_idx.iter().map(|&i| labels[i]).collect();
        let predicted: Vec<CategoryLabel> = rows(&test_idx)
            .iter()
            .map(|row| CategoryLabel::from_index(forest.predict(row)).unwrap_or_default())
            .collect();
        let evaluation = EvaluationReport::compute(&truth, &predicted);

        tracing::info!(
            train = train_idx.len(),
            test = test_idx.len(),
            vocabulary = vectorizer.vocabulary_size(),
            accuracy = evaluation.accuracy,
            "model trained"
        );
        tracing::debug!("classification report\n{}", evaluation);

        Ok(TrainedModel {
            vectorizer,
            forest,
            trained_at: Utc::now(),
            training_records: train_idx.len(),
            labels: distinct.into_iter().collect(),
            evaluation,
        })
    }

    /// Predict the category of one record.
    pub fn predict(
        &self,
        employer: Option<&str>,
        name: Option<&str>,
        amount: f64,
    ) -> Result<Prediction, ClassifierError> {
        if !amount.is_finite() {
            return Err(ClassifierError::Prediction(format!(
                "non-finite amount {}",
                amount
            )));
        }

        let row = Self::features(&self.vectorizer, employer, name, amount);
        if row.iter().any(|v| !v.is_finite()) {
            return Err(ClassifierError::Prediction(
                "feature vector contains non-finite values".to_string(),
            ));
        }

        let proba = self.forest.predict_proba(&row);
        let best = argmax(&proba);
        let category = CategoryLabel::from_index(best).ok_or_else(|| {
            ClassifierError::Prediction(format!("class index {} has no label", best))
        })?;

        let probabilities = CategoryLabel::ALL
            .iter()
            .zip(&proba)
            .filter(|(_, &p)| p > 0.0)
            .map(|(label, &p)| (*label, p))
            .collect();

        Ok(Prediction {
            category,
            confidence: proba[best].clamp(0.0, 1.0),
            probabilities,
        })
    }

    /// Save model to JSON file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create model directory: {:?}", parent))?;
            }
        }
        let json = serde_json::to_string(self).context("Failed to serialize model")?;
        fs::write(path.as_ref(), json)
            .with_context(|| format!("Failed to write model file: {:?}", path.as_ref()))
    }

    /// Load model from JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read model file: {:?}", path.as_ref()))?;
        serde_json::from_str(&content).context("Failed to parse model JSON")
    }
}

// ============================================================================
// TESTS
// ============================================================================
