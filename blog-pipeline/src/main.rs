use axum::extract::State;
use axum::{
    Router,
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use blog_pipeline::{Pipeline, PipelineConfig, PipelineInput};
use serde::Serialize;
use std::sync::Arc;
use stategraph::GraphError;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{Level, error, info};
use uuid::Uuid;

#[derive(Debug, Serialize)]
struct GenerateResponse {
    run_id: String,
    status: String,
    final_document: Option<String>,
    sections: usize,
    total_tokens: u64,
    remaining_credits: u32,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Clone)]
struct AppState {
    pipeline: Arc<Pipeline>,
}

async fn health_check() -> &'static str {
    "OK"
}

fn error_response(status: StatusCode, message: String) -> (StatusCode, Json<ErrorResponse>) {
    (status, Json(ErrorResponse { error: message }))
}

async fn generate(
    State(state): State<AppState>,
    Json(input): Json<PipelineInput>,
) -> Result<Json<GenerateResponse>, (StatusCode, Json<ErrorResponse>)> {
    let run_id = Uuid::new_v4().to_string();
    info!(run_id = %run_id, "received generation request");

    let final_state = state.pipeline.run(input).await.map_err(|e| {
        error!(run_id = %run_id, error = %e, "pipeline run failed");
        let status = match &e {
            GraphError::MissingInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error_response(status, format!("pipeline run failed: {e}"))
    })?;

    info!(run_id = %run_id, "generation request completed");
    Ok(Json(GenerateResponse {
        run_id,
        status: "completed".to_string(),
        sections: final_state.section_drafts.len(),
        total_tokens: final_state.total_tokens(),
        remaining_credits: final_state.free_tier_credits,
        final_document: final_state.final_document,
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .compact()
        .init();

    info!("starting blog pipeline service");

    let config = PipelineConfig::from_env()?;
    let pipeline = Arc::new(Pipeline::new(config)?);
    let state = AppState { pipeline };

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/generate", post(generate))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    info!("server running on http://0.0.0.0:3000");
    info!("endpoints: GET /health, POST /generate");

    axum::serve(listener, app).await?;

    Ok(())
}
