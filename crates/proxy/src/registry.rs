//! Static mapping from a cloud inference service tag (e.g. `openai-gpt4o-mini`)
//! to the cloud SDK's deployment identifier. Loaded once from a secrets blob
//! at startup; there is no runtime mutation.

use std::collections::HashMap;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceRegistry {
	services: HashMap<String, String>,
}

impl ServiceRegistry {
	pub fn from_json(blob: &str) -> serde_json::Result<Self> {
		let services: HashMap<String, String> = serde_json::from_str(blob)?;
		Ok(Self { services })
	}

	pub fn deployment_for(&self, service: &str) -> Option<&str> {
		self.services.get(service).map(String::as_str)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn looks_up_known_service() {
		let registry = ServiceRegistry::from_json(r#"{"openai-gpt4o-mini": "gpt4o-mini-prod"}"#).unwrap();
		assert_eq!(registry.deployment_for("openai-gpt4o-mini"), Some("gpt4o-mini-prod"));
	}

	#[test]
	fn unknown_service_is_none() {
		let registry = ServiceRegistry::from_json("{}").unwrap();
		assert_eq!(registry.deployment_for("nope"), None);
	}
}
