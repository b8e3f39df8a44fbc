// Contribution Category - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod category;
pub mod config;
pub mod data_quality;
pub mod db;
pub mod discovery;
pub mod error;
pub mod hybrid;
pub mod ml;
pub mod normalize;
pub mod pipeline;
pub mod record;
pub mod report;
pub mod rules;
pub mod sql;
pub mod suggest;

// Re-export commonly used types
pub use category::CategoryLabel;
pub use config::{
    AmountConfig, ClassifierConfig, ClusteringConfig, LabelSource, MlConfig, OutputConfig,
    Thresholds, CONFIG_ENV,
};
pub use data_quality::{
    BatchSummary, DataQualityEngine, QualityIssue, QualityReport, Severity,
    ValidationResult as QualityValidationResult,
};
pub use db::{
    category_stats, get_all_records, get_events_for_entity, insert_event, insert_records,
    insert_run, latest_run, open_database, setup_database, verify_count, CategoryStat, Event,
    ImportStats, RunRecord,
};
pub use discovery::{discover_clusters, ClusterSummary, KMeans};
pub use error::ClassifierError;
pub use hybrid::{
    ClassificationResult, HybridClassifier, HybridPolicy, ModelSlot, DEFAULT_CONFIDENCE_THRESHOLD,
};
pub use ml::{EvaluationReport, Prediction, TrainedModel, TrainingExample};
pub use normalize::{clean_text, expand_abbreviations, normalize};
pub use pipeline::{Pipeline, RunOptions, RunOutput};
pub use record::{load_csv, AmountIssue, ContributionRecord, LoadSummary, RawContribution};
pub use report::{AnalysisReport, CategoryTally, ConfidenceBands, GapAnalysis};
pub use rules::{MatchKind, PatternRule, RuleEngine, RuleMatch, RuleScope, RuleSet, RuleTier};
pub use sql::{render_function, CaseExpression, RuleFunction, SqlTarget};
pub use suggest::{suggest_rules, RuleSuggestion, SuggestionSummary};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
