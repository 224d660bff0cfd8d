//! Axum wiring for the cloud gateway: a single passthrough endpoint that
//! resolves a service tag, translates the request, and streams the
//! chat-completion response back to the caller.

use std::sync::Arc;

use async_openai::Client;
use async_openai::config::AzureConfig;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::Value;

use crate::audit::{AuditSink, InferenceRecord};
use crate::cloud::stream;
use crate::cloud::translate::prepare;
use crate::error::CloudError;
use crate::http::extract as extract_headers;
use crate::registry::ServiceRegistry;

/// The single path family this gateway mounts its route under. The service
/// tag is resolved from headers/body rather than the path, but the route
/// still lives under this fixed prefix to match the HPC gateway's shape.
pub const PASSTHROUGH_PREFIX: &str = "passthrough";

/// Azure OpenAI encodes the deployment id into the request URL itself, so a
/// `Client` is scoped to one deployment. Since the deployment is only known
/// once the service tag in this request has been resolved, the gateway keeps
/// the bare credentials here and builds a fresh per-deployment client per
/// request rather than a single client at startup.
pub struct CloudGatewayState {
	pub api_key: String,
	pub api_base: String,
	pub api_version: String,
	pub registry: ServiceRegistry,
	pub system_prompt: String,
	pub default_portal: String,
	pub sink: AuditSink,
	/// Administrative kill switch for the whole cloud backend. When false,
	/// every request is rejected with 403 regardless of service tag.
	pub service_enabled: bool,
}

pub type SharedCloudState = Arc<CloudGatewayState>;

pub async fn handle(
	State(state): State<SharedCloudState>,
	method: Method,
	headers: HeaderMap,
	body: Bytes,
) -> Result<Response, CloudError> {
	if method == Method::GET {
		return Ok((StatusCode::OK, "OK").into_response());
	}

	if !state.service_enabled {
		return Err(CloudError::ServiceDisabled("cloud".to_string()));
	}

	let trusted = extract_headers(&headers, &state.default_portal);
	let service = trusted.service.clone().ok_or(CloudError::MissingService)?;

	let payload: Value = serde_json::from_slice(&body).map_err(|e| CloudError::Upstream(e.into()))?;
	let messages: Vec<Value> = payload
		.get("messages")
		.and_then(|m| m.as_array())
		.cloned()
		.unwrap_or_default();
	let model = payload.get("model").and_then(|m| m.as_str()).unwrap_or_default().to_string();

	let prepared = prepare(&state.registry, &service, &messages, &state.system_prompt)?;
	let token_model = if model.is_empty() { prepared.deployment.clone() } else { model };

	let portal = trusted.portal.unwrap_or_else(|| state.default_portal.clone());
	let record = InferenceRecord::new(
		trusted.inference_id,
		trusted.uid,
		trusted.o,
		trusted.ou,
		service,
		portal,
		body.len() as u64,
	);

	let config = AzureConfig::new()
		.with_api_key(&state.api_key)
		.with_api_base(&state.api_base)
		.with_api_version(&state.api_version)
		.with_deployment_id(&prepared.deployment);
	let client = Client::with_config(config);

	let body_stream = stream::run(client, prepared, token_model, record, state.sink.clone());

	Ok(Response::builder()
		.status(StatusCode::OK)
		.header("content-type", "text/event-stream")
		.body(Body::from_stream(body_stream))
		.expect("static response parts always build"))
}
