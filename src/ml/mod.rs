// Supervised classification: vectorizer, forest, evaluation, trained model

pub mod forest;
pub mod metrics;
pub mod model;
pub mod vectorizer;

pub use metrics::EvaluationReport;
pub use model::{feature_text, Prediction, TrainedModel, TrainingExample};
pub use vectorizer::{TfidfVectorizer, VectorizerParams};
