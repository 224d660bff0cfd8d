//! Small env-var helpers shared by both gateway binaries.
//!
//! Configuration is loaded once at process start from environment variables;
//! there is no hot-reload. A missing required variable or a value that fails
//! to parse is a startup error, not a runtime one.

use std::env::VarError;
use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, thiserror::Error)]
pub enum EnvError {
	#[error("missing required environment variable {0}")]
	Missing(String),
	#[error("environment variable {0} has invalid value {1:?}: {2}")]
	Invalid(String, String, String),
}

pub fn required(key: &str) -> Result<String, EnvError> {
	match std::env::var(key) {
		Ok(v) => Ok(v),
		Err(VarError::NotPresent) => Err(EnvError::Missing(key.to_string())),
		Err(VarError::NotUnicode(_)) => Err(EnvError::Invalid(
			key.to_string(),
			"<non-utf8>".to_string(),
			"not valid UTF-8".to_string(),
		)),
	}
}

pub fn required_parsed<T>(key: &str) -> Result<T, EnvError>
where
	T: FromStr,
	T::Err: Display,
{
	let raw = required(key)?;
	raw
		.parse()
		.map_err(|e: T::Err| EnvError::Invalid(key.to_string(), raw, e.to_string()))
}

pub fn optional_parsed<T>(key: &str, default: T) -> Result<T, EnvError>
where
	T: FromStr,
	T::Err: Display,
{
	match std::env::var(key) {
		Ok(raw) => raw
			.parse()
			.map_err(|e: T::Err| EnvError::Invalid(key.to_string(), raw, e.to_string())),
		Err(VarError::NotPresent) => Ok(default),
		Err(VarError::NotUnicode(_)) => Err(EnvError::Invalid(
			key.to_string(),
			"<non-utf8>".to_string(),
			"not valid UTF-8".to_string(),
		)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn missing_required_errors() {
		// SAFETY: test-only, single-threaded access to a var that does not collide
		// with real configuration.
		unsafe { std::env::remove_var("GATEWAY_CORE_TEST_MISSING") };
		let err = required("GATEWAY_CORE_TEST_MISSING").unwrap_err();
		assert!(matches!(err, EnvError::Missing(_)));
	}

	#[test]
	fn optional_parsed_falls_back_to_default() {
		unsafe { std::env::remove_var("GATEWAY_CORE_TEST_OPTIONAL") };
		let v: u16 = optional_parsed("GATEWAY_CORE_TEST_OPTIONAL", 7).unwrap();
		assert_eq!(v, 7);
	}

	#[test]
	fn required_parsed_rejects_bad_value() {
		unsafe { std::env::set_var("GATEWAY_CORE_TEST_PORT", "not-a-number") };
		let err = required_parsed::<u16>("GATEWAY_CORE_TEST_PORT").unwrap_err();
		assert!(matches!(err, EnvError::Invalid(..)));
		unsafe { std::env::remove_var("GATEWAY_CORE_TEST_PORT") };
	}
}
