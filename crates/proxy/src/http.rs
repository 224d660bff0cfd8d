//! Extraction of the trusted, edge-supplied headers both backends rely on to
//! build the inference audit record and select a backend service.

use axum::http::HeaderMap;
use uuid::Uuid;

pub const HEADER_INFERENCE_ID: &str = "inference-id";
pub const HEADER_CONSUMER_ID: &str = "x-consumer-custom-id";
pub const HEADER_CONSUMER_GROUPS: &str = "x-consumer-groups";
pub const HEADER_INFERENCE_SERVICE: &str = "inference-service";
pub const HEADER_INFERENCE_PORTAL: &str = "inference-portal";

pub const DEFAULT_UID: &str = "anon";

#[derive(Debug, Clone)]
pub struct TrustedHeaders {
	pub inference_id: String,
	pub uid: String,
	pub o: Option<String>,
	pub ou: Option<String>,
	pub service: Option<String>,
	pub portal: Option<String>,
}

pub fn extract(headers: &HeaderMap, default_portal: &str) -> TrustedHeaders {
	let inference_id = header_str(headers, HEADER_INFERENCE_ID)
		.map(str::to_string)
		.unwrap_or_else(|| Uuid::new_v4().to_string());
	let uid = header_str(headers, HEADER_CONSUMER_ID).unwrap_or(DEFAULT_UID).to_string();
	let (o, ou) = header_str(headers, HEADER_CONSUMER_GROUPS)
		.map(parse_groups)
		.unwrap_or((None, None));
	let service = header_str(headers, HEADER_INFERENCE_SERVICE).map(str::to_string);
	let portal = Some(
		header_str(headers, HEADER_INFERENCE_PORTAL)
			.map(str::to_string)
			.unwrap_or_else(|| default_portal.to_string()),
	);
	TrustedHeaders { inference_id, uid, o, ou, service, portal }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
	headers.get(name).and_then(|v| v.to_str().ok())
}

/// Splits a comma-separated group-membership header into org (`org_*`) and
/// org-unit (`orgunit_*`) tags. Only the first match of each prefix wins.
fn parse_groups(raw: &str) -> (Option<String>, Option<String>) {
	let mut o = None;
	let mut ou = None;
	for part in raw.split(',') {
		let part = part.trim();
		if o.is_none()
			&& let Some(rest) = part.strip_prefix("org_")
		{
			o = Some(rest.to_string());
		} else if ou.is_none()
			&& let Some(rest) = part.strip_prefix("orgunit_")
		{
			ou = Some(rest.to_string());
		}
	}
	(o, ou)
}

#[cfg(test)]
mod tests {
	use axum::http::HeaderValue;

	use super::*;

	#[test]
	fn synthesizes_distinct_ids_when_absent() {
		let a = extract(&HeaderMap::new(), "default");
		let b = extract(&HeaderMap::new(), "default");
		assert_ne!(a.inference_id, b.inference_id);
		assert!(Uuid::parse_str(&a.inference_id).is_ok());
	}

	#[test]
	fn uses_inbound_inference_id_when_present() {
		let mut headers = HeaderMap::new();
		headers.insert(HEADER_INFERENCE_ID, HeaderValue::from_static("req-123"));
		let got = extract(&headers, "default");
		assert_eq!(got.inference_id, "req-123");
	}

	#[test]
	fn parses_org_and_orgunit_from_groups() {
		let (o, ou) = parse_groups("org_acme, orgunit_research, other");
		assert_eq!(o.as_deref(), Some("acme"));
		assert_eq!(ou.as_deref(), Some("research"));
	}

	#[test]
	fn missing_consumer_id_defaults_to_anon() {
		let got = extract(&HeaderMap::new(), "default");
		assert_eq!(got.uid, DEFAULT_UID);
	}
}
