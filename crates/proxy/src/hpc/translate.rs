//! Request translation for the HPC backend: resolve the service tag (header,
//! falling back to the JSON body's `model` field), rewrite the body for
//! accounting when streaming is requested, and hand off to the remote
//! command builder.

use gateway_hpc_transport::command::{RemoteCommand, RemoteCommandInput, build};
use serde_json::Value;
use tracing::warn;

use crate::error::HpcError;

pub struct TranslateInput<'a> {
	pub inference_id: &'a str,
	pub uid: &'a str,
	pub method: &'a str,
	pub path: &'a str,
	pub query: Option<&'a str>,
	pub headers: &'a [(String, String)],
	pub body: Option<&'a [u8]>,
	pub service_header: Option<&'a str>,
	pub inline_body_enabled: bool,
	pub accounting_enabled: bool,
	pub service_from_body_enabled: bool,
}

pub struct Translated {
	pub command: RemoteCommand,
	pub service: String,
	pub accounting_enabled: bool,
}

/// Build the outbound remote command, resolving the service tag and
/// rewriting the body for usage accounting per §4.5. A JSON parse failure is
/// non-fatal: accounting is disabled for this request and the body passes
/// through untouched, matching the recoverable-error policy in §7.
pub fn translate(input: TranslateInput<'_>) -> Result<Translated, HpcError> {
	let mut service = input.service_header.map(str::to_string);
	let mut accounting_enabled = input.accounting_enabled;
	let mut rewritten_body: Option<Vec<u8>> = None;

	if let Some(body) = input.body {
		match serde_json::from_slice::<Value>(body) {
			Ok(mut json) => {
				if service.is_none() && input.service_from_body_enabled {
					service = json.get("model").and_then(|m| m.as_str()).map(str::to_string);
				}
				let wants_stream = json.get("stream").and_then(|s| s.as_bool()) == Some(true);
				if accounting_enabled && wants_stream {
					merge_include_usage(&mut json);
					rewritten_body = Some(serde_json::to_vec(&json).unwrap_or_else(|_| body.to_vec()));
				}
			},
			Err(e) => {
				warn!(error = %e, "request body is not valid JSON, disabling accounting for this request");
				accounting_enabled = false;
			},
		}
	}

	let service = service.ok_or(HpcError::MissingService)?;
	let effective_body = rewritten_body.as_deref().or(input.body);

	let command = build(RemoteCommandInput {
		inference_id: input.inference_id,
		uid: input.uid,
		service: &service,
		path: input.path,
		query: input.query,
		method: input.method,
		headers: input.headers,
		body: effective_body,
		inline_body_enabled: input.inline_body_enabled,
	});

	Ok(Translated { command, service, accounting_enabled })
}

fn merge_include_usage(json: &mut Value) {
	let Some(obj) = json.as_object_mut() else { return };
	match obj.get_mut("stream_options") {
		Some(Value::Object(existing)) => {
			existing.insert("include_usage".to_string(), Value::Bool(true));
		},
		_ => {
			obj.insert(
				"stream_options".to_string(),
				serde_json::json!({"include_usage": true}),
			);
		},
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn base_input<'a>(body: Option<&'a [u8]>, headers: &'a [(String, String)]) -> TranslateInput<'a> {
		TranslateInput {
			inference_id: "req-1",
			uid: "anon",
			method: "POST",
			path: "v1/chat/completions",
			query: None,
			headers,
			body,
			service_header: Some("svc"),
			inline_body_enabled: true,
			accounting_enabled: true,
			service_from_body_enabled: true,
		}
	}

	#[test]
	fn merges_include_usage_when_streaming_and_accounting_enabled() {
		let body = br#"{"model":"m","stream":true,"messages":[{"role":"user","content":"hi"}]}"#;
		let result = translate(base_input(Some(body), &[])).unwrap();
		assert!(result.accounting_enabled);
		let text = result
			.command
			.stdin_body
			.map(|b| String::from_utf8(b).unwrap())
			.unwrap_or_else(|| String::from_utf8(result.command.command).unwrap());
		let value: Value = serde_json::from_str(text.split_once("-d ").map(|(_, b)| b).unwrap_or(&text)).unwrap();
		assert_eq!(value["stream_options"]["include_usage"], true);
		assert_eq!(value["model"], "m");
	}

	#[test]
	fn non_streaming_body_is_untouched() {
		let body = br#"{"model":"m","stream":false}"#;
		let result = translate(base_input(Some(body), &[])).unwrap();
		let text = String::from_utf8(result.command.command).unwrap();
		assert!(text.contains(r#"-d {"model":"m","stream":false}"#));
	}

	#[test]
	fn service_falls_back_to_model_field_when_header_absent() {
		let mut input = base_input(Some(br#"{"model":"fallback-model"}"#), &[]);
		input.service_header = None;
		let result = translate(input).unwrap();
		assert_eq!(result.service, "fallback-model");
	}

	#[test]
	fn missing_service_after_both_paths_fails() {
		let mut input = base_input(Some(b"{}"), &[]);
		input.service_header = None;
		let err = translate(input).unwrap_err();
		assert!(matches!(err, HpcError::MissingService));
	}

	#[test]
	fn malformed_json_disables_accounting_without_failing() {
		let mut input = base_input(Some(b"not json"), &[]);
		input.service_header = Some("svc");
		let result = translate(input).unwrap();
		assert!(!result.accounting_enabled);
	}
}
