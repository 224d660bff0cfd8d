//! The inference audit record: one per inbound request, emitted exactly once
//! when its response stream ends, independent of the `RUST_LOG` filter.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
	Pending,
	Completed,
	Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct InferenceRecord {
	pub id: String,
	pub uid: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub o: Option<String>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub ou: Option<String>,
	pub service: String,
	pub portal: String,
	pub input_size: u64,
	pub output_size: u64,
	pub start_timestamp: DateTime<Local>,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub end_timestamp: Option<DateTime<Local>>,
	pub status: Status,
	pub input_tokens: u64,
	pub output_tokens: u64,
}

impl InferenceRecord {
	pub fn new(id: String, uid: String, o: Option<String>, ou: Option<String>, service: String, portal: String, input_size: u64) -> Self {
		Self {
			id,
			uid,
			o,
			ou,
			service,
			portal,
			input_size,
			output_size: 0,
			start_timestamp: Local::now(),
			end_timestamp: None,
			status: Status::Pending,
			input_tokens: 0,
			output_tokens: 0,
		}
	}

	pub fn finalize(&mut self, status: Status, output_size: u64, input_tokens: u64, output_tokens: u64) {
		debug_assert_ne!(status, Status::Pending, "finalize must move to a terminal status");
		self.end_timestamp = Some(Local::now());
		self.output_size = output_size;
		self.status = status;
		self.input_tokens = input_tokens;
		self.output_tokens = output_tokens;
	}
}

/// Where finalized inference records are written: stdout by default, or an
/// append-only file if configured. Independent of the tracing subscriber so
/// audit records can never be dropped by a `RUST_LOG` filter.
#[derive(Clone)]
pub struct AuditSink {
	inner: Arc<AuditSinkInner>,
}

enum AuditSinkInner {
	Stdout,
	File(Mutex<std::fs::File>),
}

impl AuditSink {
	pub fn stdout() -> Self {
		Self { inner: Arc::new(AuditSinkInner::Stdout) }
	}

	pub fn file(path: impl Into<PathBuf>) -> std::io::Result<Self> {
		let file = std::fs::OpenOptions::new().create(true).append(true).open(path.into())?;
		Ok(Self { inner: Arc::new(AuditSinkInner::File(Mutex::new(file))) })
	}

	pub fn emit(&self, record: &InferenceRecord) {
		let line = match serde_json::to_string(record) {
			Ok(line) => line,
			Err(e) => {
				warn!(error = %e, "failed to serialize inference record");
				return;
			},
		};
		match self.inner.as_ref() {
			AuditSinkInner::Stdout => println!("inference: {line}"),
			AuditSinkInner::File(file) => {
				use std::io::Write;
				let mut file = file.lock();
				if let Err(e) = writeln!(file, "inference: {line}") {
					warn!(error = %e, "failed to write inference record to audit log file");
				}
			},
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn record_starts_pending_and_moves_to_terminal_status() {
		let mut record = InferenceRecord::new(
			"id-1".into(),
			"anon".into(),
			None,
			None,
			"svc".into(),
			"portal".into(),
			10,
		);
		assert_eq!(record.status, Status::Pending);
		assert!(record.end_timestamp.is_none());
		record.finalize(Status::Completed, 100, 5, 7);
		assert_eq!(record.status, Status::Completed);
		assert!(record.start_timestamp <= record.end_timestamp.unwrap());
		assert_eq!(record.output_size, 100);
		assert_eq!(record.input_tokens, 5);
		assert_eq!(record.output_tokens, 7);
	}

	#[test]
	fn file_sink_appends_one_line_per_record() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("audit.log");
		let sink = AuditSink::file(&path).unwrap();
		let mut record = InferenceRecord::new("id-2".into(), "anon".into(), None, None, "svc".into(), "p".into(), 0);
		record.finalize(Status::Completed, 0, 0, 0);
		sink.emit(&record);
		let contents = fs_err::read_to_string(&path).unwrap();
		assert_eq!(contents.lines().count(), 1);
		assert!(contents.starts_with("inference: {"));
	}
}
