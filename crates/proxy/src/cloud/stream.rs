//! Streaming engine for the cloud backend.
//!
//! Ordinary models get a live streaming call forwarded chunk-for-chunk.
//! Reasoning-family models (folded system prompt, no system role) get a
//! single non-streaming call whose content is replayed as one synthesized
//! delta per character, in the same envelope shape a live stream would use,
//! so downstream clients can't tell the two paths apart.
//!
//! The producer runs on its own task, feeding an mpsc channel that backs the
//! returned stream: if the caller drops the stream (client disconnect), the
//! send fails and the producer still runs its finalization block, which a
//! plain async-generator would skip on drop.

use async_openai::Client;
use async_openai::config::AzureConfig;
use async_openai::types::{ChatCompletionRequestMessage, CreateChatCompletionRequestArgs};
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;

use crate::audit::{AuditSink, InferenceRecord, Status};
use crate::cloud::translate::PreparedRequest;
use crate::error::CloudError;
use crate::tokens::cloud::{count_bare_tokens, count_prompt_tokens};

const CHANNEL_CAPACITY: usize = 8;

fn to_typed_messages(messages: &[Value]) -> anyhow::Result<Vec<ChatCompletionRequestMessage>> {
	messages
		.iter()
		.cloned()
		.map(|m| serde_json::from_value(m).map_err(anyhow::Error::from))
		.collect()
}

fn synthesized_chunk(id: &str, created: u32, model: &str, system_fingerprint: Option<&str>, content: &str) -> Value {
	json!({
		"id": id,
		"object": "chat.completion.chunk",
		"created": created,
		"model": model,
		"system_fingerprint": system_fingerprint,
		"choices": [{
			"index": 0,
			"delta": {
				"content": content,
				"function_call": null,
				"role": null,
				"tool_calls": null,
			},
			"finish_reason": null,
			"logprobs": null,
			"content_filter_results": {},
		}],
	})
}

/// Run one chat-completion request and yield `data: <json>\n` lines. The
/// inference record is finalized and emitted exactly once when the producer
/// task ends, regardless of whether the caller consumed the whole stream.
pub fn run(
	client: Client<AzureConfig>,
	prepared: PreparedRequest,
	token_model: String,
	record: InferenceRecord,
	sink: AuditSink,
) -> impl Stream<Item = Result<Bytes, CloudError>> {
	let (tx, rx) = mpsc::channel::<Result<Bytes, CloudError>>(CHANNEL_CAPACITY);
	tokio::spawn(produce(client, prepared, token_model, record, sink, tx));
	ReceiverStream::new(rx)
}

async fn produce(
	client: Client<AzureConfig>,
	prepared: PreparedRequest,
	token_model: String,
	mut record: InferenceRecord,
	sink: AuditSink,
	tx: mpsc::Sender<Result<Bytes, CloudError>>,
) {
	let typed_messages = match to_typed_messages(&prepared.messages) {
		Ok(m) => m,
		Err(e) => {
			record.finalize(Status::Failed, 0, 0, 0);
			sink.emit(&record);
			let _ = tx.send(Err(CloudError::Upstream(e))).await;
			return;
		},
	};

	let input_tokens = count_prompt_tokens(&token_model, &prepared.messages).unwrap_or_else(|e| {
		warn!(error = %e, "prompt token counting failed, recording zero");
		0
	});

	let mut output_size: u64 = 0;
	let mut failed = false;
	let mut output_tokens: u64 = 0;
	let mut disconnected = false;

	if prepared.reasoning_family {
		match CreateChatCompletionRequestArgs::default()
			.model(&prepared.deployment)
			.messages(typed_messages)
			.build()
		{
			Ok(request) => match client.chat().create(request).await {
				Ok(response) => {
					let content = response
						.choices
						.first()
						.and_then(|c| c.message.content.clone())
						.unwrap_or_default();
					for ch in content.chars() {
						if disconnected {
							break;
						}
						let chunk = synthesized_chunk(
							&response.id,
							response.created,
							&response.model,
							response.system_fingerprint.as_deref(),
							&ch.to_string(),
						);
						let line = format!("data: {chunk}\n");
						let len = line.len() as u64;
						if tx.send(Ok(Bytes::from(line))).await.is_err() {
							disconnected = true;
						} else {
							output_size += len;
						}
					}
					if let Some(usage) = response.usage {
						output_tokens = usage.completion_tokens as u64;
					}
				},
				Err(e) => {
					failed = true;
					let _ = tx.send(Err(CloudError::Upstream(e.into()))).await;
				},
			},
			Err(e) => {
				failed = true;
				let _ = tx.send(Err(CloudError::Upstream(e.into()))).await;
			},
		}
	} else {
		let mut completion_text = String::new();
		match CreateChatCompletionRequestArgs::default()
			.model(&prepared.deployment)
			.messages(typed_messages)
			.stream(true)
			.build()
		{
			Ok(request) => match client.chat().create_stream(request).await {
				Ok(mut upstream) => {
					while let Some(next) = upstream.next().await {
						if disconnected {
							break;
						}
						match next {
							Ok(resp) => {
								let delta = resp.choices.first().and_then(|c| c.delta.content.clone());
								let Some(delta) = delta.filter(|d| !d.is_empty()) else { continue };
								completion_text.push_str(&delta);
								let line = format!("data: {}\n", serde_json::to_string(&resp).unwrap_or_default());
								let len = line.len() as u64;
								if tx.send(Ok(Bytes::from(line))).await.is_err() {
									disconnected = true;
								} else {
									output_size += len;
								}
							},
							Err(e) => {
								failed = true;
								let _ = tx.send(Err(CloudError::Upstream(e.into()))).await;
								break;
							},
						}
					}
				},
				Err(e) => {
					failed = true;
					let _ = tx.send(Err(CloudError::Upstream(e.into()))).await;
				},
			},
			Err(e) => {
				failed = true;
				let _ = tx.send(Err(CloudError::Upstream(e.into()))).await;
			},
		}

		if !failed {
			output_tokens = count_bare_tokens(&token_model, &completion_text).unwrap_or_else(|e| {
				warn!(error = %e, "completion token counting failed, recording zero");
				0
			});
		}
	}

	let status = if failed || disconnected { Status::Failed } else { Status::Completed };
	record.finalize(status, output_size, input_tokens, output_tokens);
	sink.emit(&record);
}
