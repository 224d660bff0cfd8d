//! One-shot secrets loading.
//!
//! Both gateways read a handful of small secret files (API keys, SSH private
//! keys) from a directory on disk exactly once at startup. There is no
//! watch/reload: rotating a secret means restarting the process, which keeps
//! the hot path free of any locking around secret material.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum SecretsError {
	#[error("secrets directory {0} does not exist")]
	MissingDir(PathBuf),
	#[error("required secret file {0} is missing from {1}")]
	MissingFile(String, PathBuf),
	#[error("failed to read secret file {0}: {1}")]
	Read(PathBuf, std::io::Error),
}

/// Secret file contents, keyed by file name, loaded from a single directory.
#[derive(Clone)]
pub struct Secrets {
	dir: PathBuf,
	values: BTreeMap<String, String>,
}

impl std::fmt::Debug for Secrets {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Secrets")
			.field("dir", &self.dir)
			.field("keys", &self.values.keys().collect::<Vec<_>>())
			.finish()
	}
}

impl Secrets {
	/// Load every required file out of `dir`. Fails fast if the directory or
	/// any named file is missing, rather than leaving a backend to discover a
	/// missing credential mid-request.
	pub fn load(dir: impl AsRef<Path>, required_files: &[&str]) -> Result<Self, SecretsError> {
		let dir = dir.as_ref().to_path_buf();
		if !dir.is_dir() {
			return Err(SecretsError::MissingDir(dir));
		}
		let mut values = BTreeMap::new();
		for name in required_files {
			let path = dir.join(name);
			if !path.is_file() {
				return Err(SecretsError::MissingFile((*name).to_string(), dir.clone()));
			}
			let contents =
				fs_err::read_to_string(&path).map_err(|e| SecretsError::Read(path.clone(), e.into_inner()))?;
			values.insert((*name).to_string(), contents.trim_end().to_string());
		}
		Ok(Self { dir, values })
	}

	pub fn get(&self, name: &str) -> Option<&str> {
		self.values.get(name).map(|s| s.as_str())
	}

	pub fn require(&self, name: &str) -> Result<&str, SecretsError> {
		self
			.get(name)
			.ok_or_else(|| SecretsError::MissingFile(name.to_string(), self.dir.clone()))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn loads_required_files() {
		let dir = tempfile::tempdir().unwrap();
		fs_err::write(dir.path().join("api-key"), "sk-test\n").unwrap();
		let secrets = Secrets::load(dir.path(), &["api-key"]).unwrap();
		assert_eq!(secrets.require("api-key").unwrap(), "sk-test");
	}

	#[test]
	fn missing_file_fails_fast() {
		let dir = tempfile::tempdir().unwrap();
		let err = Secrets::load(dir.path(), &["api-key"]).unwrap_err();
		assert!(matches!(err, SecretsError::MissingFile(..)));
	}

	#[test]
	fn missing_dir_fails_fast() {
		let err = Secrets::load("/no/such/dir/surely", &[]).unwrap_err();
		assert!(matches!(err, SecretsError::MissingDir(_)));
	}
}
