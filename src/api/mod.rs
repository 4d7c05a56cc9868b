use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

use crate::service::{MatchInput, PredictionResponse, PredictionService};

pub struct AppState {
    model_path: PathBuf,
    /// Built on first use; concurrent first requests share one initialisation.
    service: OnceCell<PredictionService>,
}

impl AppState {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            service: OnceCell::new(),
        }
    }

    /// State around an already-constructed service.
    #[cfg(test)]
    pub fn with_service(service: PredictionService) -> Self {
        Self {
            model_path: PathBuf::new(),
            service: OnceCell::from(service),
        }
    }

    /// The prediction service, loading the model on first call.
    ///
    /// A failed construction is not cached; the next call tries again.
    pub async fn service(&self) -> anyhow::Result<&PredictionService> {
        self.service
            .get_or_try_init(|| async {
                let path = self.model_path.clone();
                let service =
                    tokio::task::spawn_blocking(move || PredictionService::from_model_path(&path))
                        .await??;
                if service.model_loaded() {
                    info!("Prediction service ready (model-backed)");
                } else {
                    warn!("Prediction service running without a model; predictions are mocked");
                }
                Ok(service)
            })
            .await
    }
}

/// Build the Axum router for the prediction API.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/predict", post(predict_handler))
        .route("/api/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// POST /api/predict
async fn predict_handler(
    State(state): State<Arc<AppState>>,
    Json(input): Json<MatchInput>,
) -> Result<Json<PredictionResponse>, (StatusCode, String)> {
    let service = state.service().await.map_err(|e| {
        error!("Failed to initialise prediction service: {}", e);
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "Prediction service unavailable".to_string(),
        )
    })?;
    Ok(Json(service.predict(&input).await))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    /// The service could be constructed.
    pub ready: bool,
    /// A real model backs the predictions.
    pub model_loaded: bool,
}

/// GET /api/health
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Health> {
    let health = match state.service().await {
        Ok(service) => Health {
            ready: true,
            model_loaded: service.model_loaded(),
        },
        Err(e) => {
            error!("Failed to initialise prediction service during health check: {}", e);
            Health {
                ready: false,
                model_loaded: false,
            }
        }
    };
    Json(health)
}
