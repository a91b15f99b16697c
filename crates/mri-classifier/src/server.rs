//! HTTP endpoints using axum.
//!
//! Endpoints:
//! - GET /                 - landing page
//! - GET /get-random-image - random corpus sample with its prediction
//! - GET /health           - liveness and model readiness
//! - GET /static/...       - corpus images

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use burn::prelude::Backend;
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;

use crate::error::ClassifierError;
use crate::service::{PredictionResult, PredictionService};

const INDEX_TEMPLATE: &str = include_str!("../templates/index.html");

pub type SharedService<B> = Arc<PredictionService<B>>;

/// Build the axum router with all endpoints.
pub fn router<B: Backend>(service: SharedService<B>) -> Router {
	let static_files = ServeDir::new(service.corpus().root());

	Router::new()
		.route("/", get(index))
		.route("/get-random-image", get(random_image::<B>))
		.route("/health", get(health::<B>))
		.nest_service(service.static_route(), static_files)
		.with_state(service)
}

pub async fn serve<B: Backend>(service: SharedService<B>, bind_address: &str) -> anyhow::Result<()> {
	let listener = tokio::net::TcpListener::bind(bind_address).await?;
	log::info!("Listening on http://{}", listener.local_addr()?);

	axum::serve(listener, router(service)).await?;
	Ok(())
}

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
	pub error: String,
}

#[derive(Serialize, Deserialize)]
pub struct HealthResponse {
	pub status: String,
	pub model_ready: bool,
}

impl IntoResponse for ClassifierError {
	fn into_response(self) -> Response {
		log::error!("Error in get-random-image route ({}): {}", self.kind(), self);

		let body = ErrorResponse {
			error: "An error occurred".to_string(),
		};
		(StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
	}
}

// ── Handlers ────────────────────────────────────────────────────────

async fn index() -> Html<&'static str> {
	Html(INDEX_TEMPLATE)
}

async fn random_image<B: Backend>(
	State(service): State<SharedService<B>>,
) -> Result<Json<PredictionResult>, ClassifierError> {
	// directory listing and the forward pass both block
	let result = tokio::task::spawn_blocking(move || service.random_prediction())
		.await
		.map_err(|err| ClassifierError::Inference(format!("prediction task failed: {err}")))??;

	Ok(Json(result))
}

async fn health<B: Backend>(State(service): State<SharedService<B>>) -> Json<HealthResponse> {
	Json(HealthResponse {
		status: "ok".to_string(),
		model_ready: service.is_ready(),
	})
}
