// 🔄 Analysis Pipeline - one batch run end to end
//
// quality check → (optional) training → hybrid classification →
// cluster discovery + rule suggestions on the Others residue → report.
// Training failures for lack of data leave the run rule-only.

use crate::category::CategoryLabel;
use crate::config::{ClassifierConfig, LabelSource};
use crate::data_quality::DataQualityEngine;
use crate::discovery::discover_clusters;
use crate::error::ClassifierError;
use crate::hybrid::{ClassificationResult, HybridClassifier, HybridPolicy, ModelSlot};
use crate::ml::{TrainedModel, TrainingExample};
use crate::record::{load_csv, ContributionRecord};
use crate::report::{
    category_tallies, recommendations, write_classified_csv, AnalysisReport, BeforeAfter,
    ConfidenceBands, DataSummary, GapAnalysis,
};
use crate::rules::RuleEngine;
use crate::sql::render_function;
use crate::suggest::suggest_rules;
use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

pub const CLASSIFIED_CSV: &str = "classified_contributions.csv";
pub const REPORT_JSON: &str = "analysis_report.json";
pub const SQL_FILE: &str = "classify_contributor.sql";
pub const MODEL_JSON: &str = "model.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOptions {
    /// Train a model before classifying.
    pub train: bool,
    /// Cluster the Others residue.
    pub discover: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            train: true,
            discover: true,
        }
    }
}

/// Output of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub report: AnalysisReport,
    pub results: Vec<ClassificationResult>,
}

impl RunOutput {
    pub fn others_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.final_category == CategoryLabel::Others)
            .count()
    }
}

/// Files written by `Pipeline::write_outputs`.
#[derive(Debug, Clone, Default)]
pub struct OutputPaths {
    pub classified_csv: PathBuf,
    pub report_json: PathBuf,
    pub sql_file: PathBuf,
    pub model_json: Option<PathBuf>,
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct Pipeline {
    config: ClassifierConfig,
    engine: Arc<RuleEngine>,
    models: ModelSlot,
}

impl Pipeline {
    /// Rules come from `config.rules_path` when set, else the builtin tables.
    pub fn new(config: ClassifierConfig) -> Result<Self> {
        let engine = match &config.rules_path {
            Some(path) => RuleEngine::from_file(path)?,
            None => RuleEngine::builtin(),
        };
        Ok(Self::with_engine(config, Arc::new(engine)))
    }

    pub fn with_engine(config: ClassifierConfig, engine: Arc<RuleEngine>) -> Self {
        Pipeline {
            config,
            engine,
            models: ModelSlot::new(),
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn engine(&self) -> &RuleEngine {
        &self.engine
    }

    pub fn models(&self) -> &ModelSlot {
        &self.models
    }

    pub fn classifier(&self) -> HybridClassifier {
        HybridClassifier::new(
            Arc::clone(&self.engine),
            self.models.clone(),
            HybridPolicy::new(self.config.thresholds.high_confidence),
        )
    }

    /// Labeled examples per `ml.label_source`.
    pub fn training_examples(&self, records: &[ContributionRecord]) -> Vec<TrainingExample> {
        training_examples(&self.engine, self.config.ml.label_source, records)
    }

    /// Train on `records` and install the model.
    ///
    /// `Ok(None)` when there is too little data; the slot is left as it was.
    pub fn train(&self, records: &[ContributionRecord]) -> Result<Option<Arc<TrainedModel>>, ClassifierError> {
        let examples = self.training_examples(records);
        match TrainedModel::train(&examples, &self.config.ml) {
            Ok(model) => {
                self.models.install(model);
                Ok(self.models.current())
            }
            Err(e) if e.is_insufficient_data() => {
                tracing::warn!(error = %e, "skipping model training; classification stays rule-only");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Load a CSV and run on it.
    pub fn run_csv(&self, path: &Path, options: RunOptions) -> Result<RunOutput> {
        let loaded = load_csv(path, self.config.amounts.max_contribution_amount)?;
        for rejected in &loaded.rejected {
            tracing::warn!(error = %rejected, "row rejected");
        }
        self.run(&loaded.records, options)
    }

    pub fn run(&self, records: &[ContributionRecord], options: RunOptions) -> Result<RunOutput> {
        let started_at = Utc::now();
        tracing::info!(records = records.len(), "analysis run started");

        let quality_engine = DataQualityEngine::new(self.config.amounts.max_contribution_amount);
        let quality_reports = quality_engine.validate_batch(records);
        let quality = quality_engine.batch_summary(records, &quality_reports);
        tracing::info!(score = quality.quality_score, "data quality checked");

        if options.train {
            self.train(records)
                .map_err(anyhow::Error::from)
                .context("Model training failed")?;
        }

        let classifier = self.classifier();
        let results = classifier.classify_all(records);
        let overrides = results.iter().filter(|r| r.ml_overrode()).count();

        let others: Vec<&ContributionRecord> = records
            .iter()
            .zip(&results)
            .filter(|(_, r)| r.final_category == CategoryLabel::Others)
            .map(|(record, _)| record)
            .collect();

        let cluster_analysis = if options.discover {
            discover_clusters(&others, &self.config.clustering, self.config.ml.random_state)
        } else {
            BTreeMap::new()
        };
        let suggestions = suggest_rules(&others);
        let gap_analysis = GapAnalysis::analyze(
            &others,
            records.len(),
            self.config.thresholds.high_value_contribution,
        );
        let confidence_bands = ConfidenceBands::from_results(&results, &self.config.thresholds);
        let recommendations =
            recommendations(&gap_analysis, cluster_analysis.len(), &confidence_bands);

        let model = self.models.current();
        let report = AnalysisReport {
            run_id: Uuid::new_v4(),
            generated_at: started_at,
            data_summary: DataSummary::from_records(records),
            quality,
            category_tallies: category_tallies(records, results.iter().map(|r| r.final_category)),
            ml_overrides: overrides,
            confidence_bands,
            gap_analysis,
            before_after: BeforeAfter::compare(records, &results),
            cluster_analysis,
            suggestions,
            model_trained: model.is_some(),
            evaluation: model.map(|m| m.evaluation.clone()),
            sql_function: render_function(&self.engine, &self.config.sql),
            recommendations,
        };

        tracing::info!(
            run_id = %report.run_id,
            others = others.len(),
            ml_overrides = overrides,
            "analysis run finished"
        );

        Ok(RunOutput { report, results })
    }

    /// Write the classified CSV, JSON report, SQL text and model (if any).
    pub fn write_outputs(&self, records: &[ContributionRecord], output: &RunOutput) -> Result<OutputPaths> {
        let dirs = &self.config.output;
        let paths = OutputPaths {
            classified_csv: dirs.output_dir.join(CLASSIFIED_CSV),
            report_json: dirs.reports_dir.join(REPORT_JSON),
            sql_file: dirs.output_dir.join(SQL_FILE),
            model_json: None,
        };

        write_classified_csv(&paths.classified_csv, records, &output.results)?;
        output.report.write_json(&paths.report_json)?;

        fs::create_dir_all(&dirs.output_dir)
            .with_context(|| format!("Failed to create directory: {:?}", dirs.output_dir))?;
        fs::write(&paths.sql_file, &output.report.sql_function)
            .with_context(|| format!("Failed to write SQL file: {:?}", paths.sql_file))?;

        let model_json = match self.models.current() {
            Some(model) => {
                let path = dirs.models_dir.join(MODEL_JSON);
                model.save(&path)?;
                Some(path)
            }
            None => None,
        };

        Ok(OutputPaths { model_json, ..paths })
    }
}

/// Build training examples from records.
///
/// `Rules` labels every record with the rule engine output. `Existing` uses
/// the records' own `existing_category`, skipping those without one.
pub fn training_examples(
    engine: &RuleEngine,
    source: LabelSource,
    records: &[ContributionRecord],
) -> Vec<TrainingExample> {
    match source {
        LabelSource::Rules => records
            .iter()
            .map(|r| TrainingExample::from_record(r, engine.classify(r.employer(), Some(r.name()))))
            .collect(),
        LabelSource::Existing => records
            .iter()
            .filter_map(|r| r.existing_label().map(|label| TrainingExample::from_record(r, label)))
            .collect(),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MlConfig;

    fn corpus() -> Vec<ContributionRecord> {
        let mut records = Vec::new();
        for i in 0..6 {
            records.push(
                ContributionRecord::new(&format!("Lawyer {}", i), Some("Smith Law Office"), 500.0)
                    .with_existing_category("Lawyer"),
            );
            records.push(
                ContributionRecord::new(&format!("Owner {}", i), Some("Acme Holdings LLC"), 250.0)
                    .with_existing_category("BusinessOwner"),
            );
            records.push(
                ContributionRecord::new(&format!("Retiree {}", i), Some("Retired"), 50.0)
                    .with_existing_category("Individual"),
            );
            records.push(
                ContributionRecord::new(&format!("Cook {}", i), Some("Lakeside Grill"), 1500.0)
                    .with_existing_category("Others"),
            );
            records.push(ContributionRecord::new(
                &format!("Nurse {}", i),
                Some("Sunrise Yoga"),
                40.0,
            ));
        }
        records
    }

    fn small_config() -> ClassifierConfig {
        ClassifierConfig {
            ml: MlConfig {
                n_estimators: 15,
                min_df: 1,
                ..MlConfig::default()
            },
            ..ClassifierConfig::default()
        }
    }

    #[test]
    fn test_rule_only_run() {
        let pipeline = Pipeline::new(ClassifierConfig::default()).unwrap();
        let records = corpus();
        let output = pipeline
            .run(&records, RunOptions { train: false, discover: true })
            .unwrap();

        assert_eq!(output.results.len(), records.len());
        assert!(!output.report.model_trained);
        assert!(output.report.evaluation.is_none());
        assert_eq!(output.report.ml_overrides, 0);
        assert_eq!(output.report.confidence_bands, ConfidenceBands::default());

        let others = output.others_count();
        assert_eq!(others, 12);
        assert_eq!(output.report.gap_analysis.others_count, others);
        assert_eq!(output.report.gap_analysis.high_value_count, 6);
        assert!(!output.report.cluster_analysis.is_empty());
        assert!(output.report.sql_function.contains("CREATE OR REPLACE FUNCTION"));

        let lawyer = output.report.tally(CategoryLabel::Lawyer).unwrap();
        assert_eq!(lawyer.count, 6);
    }

    #[test]
    fn test_training_examples_by_source() {
        let engine = RuleEngine::builtin();
        let records = corpus();

        let from_rules = training_examples(&engine, LabelSource::Rules, &records);
        assert_eq!(from_rules.len(), records.len());

        let from_existing = training_examples(&engine, LabelSource::Existing, &records);
        assert_eq!(from_existing.len(), 24);
        assert!(from_existing.iter().any(|e| e.label == CategoryLabel::Others));
    }

    #[test]
    fn test_insufficient_data_stays_rule_only() {
        let pipeline = Pipeline::new(small_config()).unwrap();
        let records = vec![ContributionRecord::new("Solo", Some("Retired"), 10.0)];

        assert!(pipeline.train(&records).unwrap().is_none());
        let output = pipeline.run(&records, RunOptions::default()).unwrap();
        assert!(!output.report.model_trained);
        assert_eq!(output.results[0].final_category, CategoryLabel::Individual);
    }

    #[test]
    fn test_trained_run_writes_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config();
        config.output.output_dir = dir.path().join("output");
        config.output.reports_dir = dir.path().join("output").join("reports");
        config.output.models_dir = dir.path().join("output").join("models");

        let pipeline = Pipeline::new(config).unwrap();
        let records = corpus();
        let output = pipeline.run(&records, RunOptions::default()).unwrap();
        assert!(output.report.model_trained);
        assert!(output.report.evaluation.is_some());
        assert_eq!(output.report.confidence_bands.predicted(), records.len());
        assert_eq!(
            output.report.confidence_bands.high,
            output.results.iter().filter(|r| r.confidence > 0.7).count()
        );

        for result in &output.results {
            let expected = pipeline
                .classifier()
                .policy()
                .decide(result.rule_category, result.ml_category, result.confidence);
            assert_eq!(result.final_category, expected);
        }

        let paths = pipeline.write_outputs(&records, &output).unwrap();
        assert!(paths.classified_csv.exists());
        assert!(paths.sql_file.exists());
        assert!(paths.model_json.as_ref().unwrap().exists());

        let report = AnalysisReport::read_json(&paths.report_json).unwrap();
        assert_eq!(report.run_id, output.report.run_id);
        assert_eq!(report.data_summary.total_records, records.len());
    }
}
