//! Request translation for the cloud backend: resolve a service tag to a
//! deployment id, strip inbound system messages, and splice in the gateway's
//! own system prompt — folded into the first message for reasoning-family
//! models that reject a system role, prepended as its own message otherwise.

use serde_json::{Value, json};

use crate::error::CloudError;
use crate::registry::ServiceRegistry;

/// Deployment-name segments (split on `-`/`_`) known not to accept a system
/// role. Matched against the resolved deployment id, not the inbound service
/// tag, since that's what actually selects the backend model family.
const REASONING_FAMILY_SEGMENTS: &[&str] = &["o1", "o3", "o4"];

pub struct PreparedRequest {
	pub deployment: String,
	pub reasoning_family: bool,
	pub messages: Vec<Value>,
}

pub fn is_reasoning_family(deployment: &str) -> bool {
	deployment
		.split(['-', '_'])
		.any(|segment| REASONING_FAMILY_SEGMENTS.contains(&segment))
}

/// Resolve `service` against the registry and rebuild the message list per
/// §4.2: drop every system-role message from the inbound history, then splice
/// in `system_prompt` according to the deployment's model family.
pub fn prepare(
	registry: &ServiceRegistry,
	service: &str,
	messages: &[Value],
	system_prompt: &str,
) -> Result<PreparedRequest, CloudError> {
	let deployment = registry
		.deployment_for(service)
		.ok_or_else(|| CloudError::UnknownService(service.to_string()))?
		.to_string();

	let mut history: Vec<Value> = messages
		.iter()
		.filter(|m| m.get("role").and_then(|r| r.as_str()) != Some("system"))
		.cloned()
		.collect();

	let reasoning_family = is_reasoning_family(&deployment);
	if reasoning_family {
		if let Some(first) = history.first_mut() {
			let existing = first.get("content").and_then(|c| c.as_str()).unwrap_or_default();
			let folded = format!("{system_prompt}\n{existing}");
			first["content"] = Value::String(folded);
		} else {
			history.push(json!({"role": "user", "content": system_prompt}));
		}
	} else {
		history.insert(0, json!({"role": "system", "content": system_prompt}));
	}

	Ok(PreparedRequest { deployment, reasoning_family, messages: history })
}

#[cfg(test)]
mod tests {
	use super::*;

	fn registry() -> ServiceRegistry {
		ServiceRegistry::from_json(r#"{"openai-gpt4o-mini": "gpt4o-mini-prod", "openai-o3": "o3-mini-prod"}"#).unwrap()
	}

	#[test]
	fn unknown_service_is_rejected() {
		let err = prepare(&registry(), "nope", &[], "be terse").unwrap_err();
		assert!(matches!(err, CloudError::UnknownService(_)));
	}

	#[test]
	fn drops_all_system_messages_and_prepends_one() {
		let messages = vec![
			json!({"role": "system", "content": "ignored one"}),
			json!({"role": "user", "content": "hi"}),
			json!({"role": "system", "content": "ignored two"}),
		];
		let prepared = prepare(&registry(), "openai-gpt4o-mini", &messages, "be terse").unwrap();
		assert!(!prepared.reasoning_family);
		assert_eq!(prepared.messages.len(), 2);
		assert_eq!(prepared.messages[0]["role"], "system");
		assert_eq!(prepared.messages[0]["content"], "be terse");
		assert_eq!(prepared.messages[1]["content"], "hi");
	}

	#[test]
	fn reasoning_family_folds_into_first_message() {
		let messages = vec![json!({"role": "user", "content": "hi"})];
		let prepared = prepare(&registry(), "openai-o3", &messages, "be terse").unwrap();
		assert!(prepared.reasoning_family);
		assert_eq!(prepared.messages.len(), 1);
		assert_eq!(prepared.messages[0]["content"], "be terse\nhi");
	}

	#[test]
	fn reasoning_family_detection_matches_segments() {
		assert!(is_reasoning_family("o1-preview"));
		assert!(is_reasoning_family("team_o3_mini"));
		assert!(!is_reasoning_family("gpt-4o-mini"));
	}
}
