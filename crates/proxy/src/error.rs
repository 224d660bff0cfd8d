//! Error taxonomy shared by both gateway backends: client-caused (4xx),
//! upstream timeout/protocol/failure, mapped to an HTTP response by a single
//! `IntoResponse` impl per enum. `Recoverable` conditions (a bad body parse
//! during accounting rewriting, a token-count failure, a liveness retry) are
//! deliberately not part of either enum — they are logged inline and the
//! request continues, per the propagation policy.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum CloudError {
	#[error("unknown service {0:?}")]
	UnknownService(String),
	#[error("missing inference-service header and no model fallback available")]
	MissingService,
	#[error("service {0:?} is disabled")]
	ServiceDisabled(String),
	#[error("upstream request failed: {0}")]
	Upstream(#[from] anyhow::Error),
}

impl IntoResponse for CloudError {
	fn into_response(self) -> Response {
		let (status, message) = match &self {
			CloudError::UnknownService(_) => (StatusCode::NOT_FOUND, self.to_string()),
			CloudError::MissingService => (StatusCode::BAD_REQUEST, self.to_string()),
			CloudError::ServiceDisabled(_) => (StatusCode::FORBIDDEN, self.to_string()),
			CloudError::Upstream(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
		};
		(status, Json(json!({ "error": message }))).into_response()
	}
}

#[derive(Debug, thiserror::Error)]
pub enum HpcError {
	#[error("missing inference-service header and no model fallback available")]
	MissingService,
	#[error("header parsing exceeded the read timeout")]
	UpstreamTimeout,
	#[error("remote process ended before headers completed: {0}")]
	UpstreamProtocol(String),
	#[error("remote transport failure: {0}")]
	UpstreamFailure(#[from] gateway_hpc_transport::TransportError),
}

impl IntoResponse for HpcError {
	fn into_response(self) -> Response {
		let (status, message) = match &self {
			HpcError::MissingService => (StatusCode::BAD_REQUEST, self.to_string()),
			HpcError::UpstreamTimeout => (StatusCode::GATEWAY_TIMEOUT, self.to_string()),
			HpcError::UpstreamProtocol(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
			HpcError::UpstreamFailure(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
		};
		(status, Json(json!({ "error": message }))).into_response()
	}
}
