//! Streaming engine for the HPC backend: read the framed status line and
//! headers out of the remote process's stdout, then relay the body in
//! fixed-size chunks to the client.
//!
//! As in the cloud engine, the producer runs on its own task feeding an mpsc
//! channel. A dropped receiver (client disconnect) is observed as a failed
//! send, at which point the remote process is killed and the finalization
//! block still runs — it is not skipped the way it would be if this were a
//! plain generator dropped mid-yield.

use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;
use gateway_hpc_transport::header::parse_head;
use gateway_hpc_transport::{RemoteEvent, RemoteProcess, TransportError};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::audit::{AuditSink, InferenceRecord, Status};
use crate::error::HpcError;
use crate::tokens::hpc::extract_usage;

const CHUNK_SIZE: usize = 4096;
const HEADER_READ_TIMEOUT: Duration = Duration::from_secs(30);
const CHANNEL_CAPACITY: usize = 8;

pub struct ParsedResponseHead {
	pub status_code: u16,
	pub headers: Vec<(String, String)>,
}

/// Read from `proc` until a complete status line + header block has arrived,
/// honoring a bounded read timeout and discarding 1xx continuations (handled
/// recursively inside [`parse_head`]).
pub async fn read_head(proc: &mut RemoteProcess) -> Result<(ParsedResponseHead, Vec<u8>), HpcError> {
	let result = timeout(HEADER_READ_TIMEOUT, async {
		let mut buffer = Vec::new();
		loop {
			match parse_head(&buffer) {
				Ok(Some(outcome)) => return Ok(outcome),
				Ok(None) => {},
				Err(e) => return Err(HpcError::UpstreamProtocol(e.to_string())),
			}
			match proc.next_event().await {
				Some(RemoteEvent::Stdout(data)) => buffer.extend_from_slice(&data),
				Some(RemoteEvent::Stderr(_)) | Some(RemoteEvent::ExitStatus(_)) => {},
				Some(RemoteEvent::Eof) | Some(RemoteEvent::Closed) => {
					return Err(HpcError::UpstreamProtocol(
						"remote process ended before headers completed".to_string(),
					));
				},
				// The channel stream ended with neither an `Eof` nor a `Close`
				// message, i.e. the connection dropped mid-response.
				None => return Err(HpcError::UpstreamFailure(TransportError::AbruptClose)),
			}
		}
	})
	.await;

	match result {
		Ok(Ok(outcome)) => Ok((
			ParsedResponseHead { status_code: outcome.head.status_code, headers: outcome.head.headers },
			outcome.body_prefix,
		)),
		Ok(Err(e)) => Err(e),
		Err(_) => {
			proc.kill().await;
			Err(HpcError::UpstreamTimeout)
		},
	}
}

/// Relay the body after the header terminator, finalizing and emitting the
/// inference record exactly once when the remote process ends or the caller
/// disconnects.
pub fn run(
	proc: RemoteProcess,
	body_prefix: Vec<u8>,
	accounting_enabled: bool,
	record: InferenceRecord,
	sink: AuditSink,
) -> impl Stream<Item = Result<Bytes, HpcError>> {
	let (tx, rx) = mpsc::channel::<Result<Bytes, HpcError>>(CHANNEL_CAPACITY);
	tokio::spawn(produce(proc, body_prefix, accounting_enabled, record, sink, tx));
	ReceiverStream::new(rx)
}

async fn produce(
	mut proc: RemoteProcess,
	body_prefix: Vec<u8>,
	accounting_enabled: bool,
	mut record: InferenceRecord,
	sink: AuditSink,
	tx: mpsc::Sender<Result<Bytes, HpcError>>,
) {
	let mut output_size: u64 = 0;
	let mut accumulated = Vec::new();
	let mut disconnected = false;
	let mut abrupt_close = false;

	if !body_prefix.is_empty() {
		accumulated.extend_from_slice(&body_prefix);
		if tx.send(Ok(Bytes::from(body_prefix))).await.is_err() {
			disconnected = true;
		} else {
			output_size += accumulated.len() as u64;
		}
	}

	let mut pending = Vec::new();
	let mut exit_status: Option<u32> = None;

	'relay: loop {
		if disconnected {
			break;
		}
		while pending.len() < CHUNK_SIZE {
			match proc.next_event().await {
				Some(RemoteEvent::Stdout(data)) => pending.extend_from_slice(&data),
				Some(RemoteEvent::Stderr(_)) => {},
				Some(RemoteEvent::ExitStatus(code)) => exit_status = Some(code),
				Some(RemoteEvent::Eof) | Some(RemoteEvent::Closed) => break 'relay,
				None => {
					warn!(error = %TransportError::AbruptClose, "hpc channel ended abruptly mid-response");
					abrupt_close = true;
					break 'relay;
				},
			}
		}
		let take = pending.len().min(CHUNK_SIZE);
		let chunk: Vec<u8> = pending.drain(..take).collect();
		accumulated.extend_from_slice(&chunk);
		if tx.send(Ok(Bytes::from(chunk))).await.is_err() {
			disconnected = true;
		} else {
			output_size = accumulated.len() as u64;
		}
	}

	// Flush whatever remains buffered even after the remote signaled EOF.
	while !pending.is_empty() && !disconnected {
		let take = pending.len().min(CHUNK_SIZE);
		let chunk: Vec<u8> = pending.drain(..take).collect();
		accumulated.extend_from_slice(&chunk);
		if tx.send(Ok(Bytes::from(chunk))).await.is_err() {
			disconnected = true;
		} else {
			output_size = accumulated.len() as u64;
		}
	}

	proc.kill().await;

	let (input_tokens, output_tokens) = if accounting_enabled {
		let usage = extract_usage(&accumulated);
		(usage.input_tokens, usage.output_tokens)
	} else {
		(0, 0)
	};

	let failed = disconnected || abrupt_close || exit_status.is_some_and(|code| code != 0);
	let status = if failed { Status::Failed } else { Status::Completed };
	record.finalize(status, output_size, input_tokens, output_tokens);
	sink.emit(&record);
}
