// Contribution Category - Web Server
// REST API with Axum
//
// GET  /api/health     liveness + model state
// GET  /api/rules      rules in evaluation order
// GET  /api/rules/sql  generated SQL function
// POST /api/classify   classify a batch of contributors
// POST /api/train      retrain from the store, swap model on completion
// GET  /api/stats      category tallies of the latest run

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use contribution_category::pipeline::{training_examples, MODEL_JSON};
use contribution_category::{
    category_stats, get_all_records, latest_run, open_database, render_function, CategoryStat,
    ClassificationResult, ClassifierConfig, HybridClassifier, HybridPolicy, ModelSlot,
    PatternRule, RuleEngine, RunRecord, TrainedModel,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use tower_http::cors::CorsLayer;

/// Shared application state
#[derive(Clone)]
struct AppState {
    db: Arc<Mutex<Connection>>,
    engine: Arc<RuleEngine>,
    models: ModelSlot,
    config: Arc<ClassifierConfig>,
}

impl AppState {
    fn classifier(&self) -> HybridClassifier {
        HybridClassifier::new(
            Arc::clone(&self.engine),
            self.models.clone(),
            HybridPolicy::new(self.config.thresholds.high_confidence),
        )
    }

    fn db(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }
}

type ApiError = (StatusCode, Json<ApiResponse<()>>);
type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    let message = message.into();
    tracing::error!(%status, %message, "request failed");
    (
        status,
        Json(ApiResponse {
            success: false,
            data: (),
            error: Some(message),
        }),
    )
}

fn internal(e: anyhow::Error) -> ApiError {
    api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    model_trained: bool,
    rules: usize,
}

#[derive(Deserialize)]
struct ContributorInput {
    employer: Option<String>,
    name: String,
    #[serde(default)]
    amount: f64,
}

#[derive(Deserialize)]
struct ClassifyRequest {
    contributions: Vec<ContributorInput>,
}

#[derive(Serialize)]
struct TrainResponse {
    records: usize,
    trained: bool,
    accuracy: Option<f64>,
}

#[derive(Serialize)]
struct StatsResponse {
    run: RunRecord,
    categories: Vec<CategoryStat>,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthResponse>> {
    Json(ApiResponse::ok(HealthResponse {
        status: "OK",
        model_trained: state.models.is_trained(),
        rules: state.engine.rule_count(),
    }))
}

/// GET /api/rules - Rules in evaluation order
async fn get_rules(State(state): State<AppState>) -> Json<ApiResponse<Vec<PatternRule>>> {
    Json(ApiResponse::ok(state.engine.rules().to_vec()))
}

/// GET /api/rules/sql - Generated SQL function
async fn get_rules_sql(State(state): State<AppState>) -> Json<ApiResponse<String>> {
    Json(ApiResponse::ok(render_function(&state.engine, &state.config.sql)))
}

/// POST /api/classify - Classify contributors
async fn classify(
    State(state): State<AppState>,
    Json(request): Json<ClassifyRequest>,
) -> ApiResult<Vec<ClassificationResult>> {
    if let Some(bad) = request.contributions.iter().find(|c| c.name.trim().is_empty()) {
        return Err(api_error(
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("contributor name is required (employer: {:?})", bad.employer),
        ));
    }

    let classifier = state.classifier();
    let results = request
        .contributions
        .iter()
        .map(|c| classifier.classify_fields(c.employer.as_deref(), Some(&c.name), c.amount))
        .collect();

    Ok(Json(ApiResponse::ok(results)))
}

/// POST /api/train - Retrain from stored contributions
async fn train(State(state): State<AppState>) -> ApiResult<TrainResponse> {
    let records = get_all_records(&state.db()).map_err(internal)?;

    let engine = Arc::clone(&state.engine);
    let config = Arc::clone(&state.config);
    let count = records.len();

    // Readers keep using the current model until install() swaps it
    let trained = tokio::task::spawn_blocking(move || {
        let examples = training_examples(&engine, config.ml.label_source, &records);
        TrainedModel::train(&examples, &config.ml)
    })
    .await
    .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    match trained {
        Ok(model) => {
            let accuracy = model.evaluation.accuracy;
            let path = state.config.output.models_dir.join(MODEL_JSON);
            if let Err(e) = model.save(&path) {
                tracing::warn!(error = %e, "failed to persist model");
            }
            state.models.install(model);
            tracing::info!(records = count, accuracy, "model swapped in");
            Ok(Json(ApiResponse::ok(TrainResponse {
                records: count,
                trained: true,
                accuracy: Some(accuracy),
            })))
        }
        Err(e) if e.is_insufficient_data() => {
            tracing::warn!(error = %e, "training skipped");
            Ok(Json(ApiResponse::ok(TrainResponse {
                records: count,
                trained: false,
                accuracy: None,
            })))
        }
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())),
    }
}

/// GET /api/stats - Category tallies of the latest run
async fn get_stats(State(state): State<AppState>) -> ApiResult<StatsResponse> {
    let conn = state.db();
    let run = latest_run(&conn)
        .map_err(internal)?
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "no classification run stored yet"))?;
    let categories = category_stats(&conn, &run.run_id).map_err(internal)?;

    Ok(Json(ApiResponse::ok(StatsResponse { run, categories })))
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    println!("🌐 Contribution Category - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = ClassifierConfig::from_env()?;
    let engine = match &config.rules_path {
        Some(path) => RuleEngine::from_file(path)?,
        None => RuleEngine::builtin(),
    };

    let db_path = std::env::var("CONTRIB_DB").unwrap_or_else(|_| "contributions.db".to_string());
    let conn = open_database(&db_path)?;
    println!("✓ Database opened: {:?}", db_path);

    let models = ModelSlot::new();
    let model_path = config.output.models_dir.join(MODEL_JSON);
    if model_path.exists() {
        match TrainedModel::load(&model_path) {
            Ok(model) => {
                models.install(model);
                println!("✓ Model loaded: {:?}", model_path);
            }
            Err(e) => tracing::warn!(error = %e, "ignoring unreadable model file"),
        }
    }

    // Create shared state
    let state = AppState {
        db: Arc::new(Mutex::new(conn)),
        engine: Arc::new(engine),
        models,
        config: Arc::new(config),
    };

    // Build API routes
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/rules", get(get_rules))
        .route("/rules/sql", get(get_rules_sql))
        .route("/classify", post(classify))
        .route("/train", post(train))
        .route("/stats", get(get_stats))
        .with_state(state);

    let app = Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive());

    // Start server
    let addr = std::env::var("CONTRIB_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/health", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, app).await?;
    Ok(())
}
