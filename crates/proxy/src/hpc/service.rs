//! Axum wiring for the HPC gateway: translate the inbound request onto the
//! remote-shell transport, parse the framed response head, and stream the
//! body back with the original status and headers.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use gateway_hpc_transport::TransportPool;

use crate::audit::{AuditSink, InferenceRecord};
use crate::error::HpcError;
use crate::hpc::stream::{read_head, run};
use crate::hpc::translate::{TranslateInput, translate};
use crate::http::extract as extract_headers;

/// The single path family this gateway mounts its route under: every request
/// arrives as `/passthrough/<rest>`, and only `<rest>` is forwarded to the
/// remote command.
pub const PASSTHROUGH_PREFIX: &str = "passthrough";

pub struct HpcGatewayState {
	pub pool: Arc<TransportPool>,
	pub default_portal: String,
	pub sink: AuditSink,
	pub inline_body_enabled: bool,
	pub accounting_enabled: bool,
	pub service_from_body_enabled: bool,
}

pub type SharedHpcState = Arc<HpcGatewayState>;

pub async fn handle(
	State(state): State<SharedHpcState>,
	method: Method,
	uri: Uri,
	headers: HeaderMap,
	body: Bytes,
) -> Result<Response, HpcError> {
	if method == Method::GET {
		return Ok((StatusCode::OK, "OK").into_response());
	}

	let trusted = extract_headers(&headers, &state.default_portal);
	let forwardable: Vec<(String, String)> = headers
		.iter()
		.filter_map(|(name, value)| {
			let value = value.to_str().ok()?;
			Some((name.as_str().to_string(), value.to_string()))
		})
		.collect();

	let body_opt = if body.is_empty() { None } else { Some(body.as_ref()) };
	let input_size = body.len() as u64;
	let path = uri
		.path()
		.trim_start_matches('/')
		.strip_prefix(PASSTHROUGH_PREFIX)
		.unwrap_or_default()
		.trim_start_matches('/');

	let translated = translate(TranslateInput {
		inference_id: &trusted.inference_id,
		uid: &trusted.uid,
		method: method.as_str(),
		path,
		query: uri.query(),
		headers: &forwardable,
		body: body_opt,
		service_header: trusted.service.as_deref(),
		inline_body_enabled: state.inline_body_enabled,
		accounting_enabled: state.accounting_enabled,
		service_from_body_enabled: state.service_from_body_enabled,
	})?;

	let portal = trusted.portal.unwrap_or_else(|| state.default_portal.clone());
	let record = InferenceRecord::new(
		trusted.inference_id,
		trusted.uid,
		trusted.o,
		trusted.ou,
		translated.service,
		portal,
		input_size,
	);

	let mut proc = state.pool.exec(&translated.command).await?;
	let (head, body_prefix) = read_head(&mut proc).await?;

	let mut response = Response::builder().status(head.status_code);
	for (name, value) in &head.headers {
		response = response.header(name, value);
	}

	let body_stream = run(proc, body_prefix, translated.accounting_enabled, record, state.sink.clone());
	response
		.body(Body::from_stream(body_stream))
		.map_err(|e| HpcError::UpstreamProtocol(e.to_string()))
}
