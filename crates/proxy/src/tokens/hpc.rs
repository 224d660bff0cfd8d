//! Token accounting for the HPC backend: scan the accumulated response body
//! for the last server-sent-events frame carrying a `usage` object.

use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct UsageFrame {
	usage: Usage,
}

#[derive(Debug, Deserialize)]
struct Usage {
	#[serde(default)]
	prompt_tokens: u64,
	#[serde(default)]
	completion_tokens: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
	pub input_tokens: u64,
	pub output_tokens: u64,
}

/// Some backends interleave content frames after the position where `usage`
/// would normally appear, so frames are scanned back-to-front and the first
/// (i.e. last in stream order) frame with a `usage` field wins.
pub fn extract_usage(body: &[u8]) -> TokenUsage {
	let Ok(text) = std::str::from_utf8(body) else {
		warn!("response body was not valid UTF-8, recording zero token usage");
		return TokenUsage::default();
	};
	for frame in text.split("\n\n").rev() {
		let frame = frame.trim();
		if frame.is_empty() {
			continue;
		}
		let payload = frame.strip_prefix("data: ").unwrap_or(frame);
		if let Ok(parsed) = serde_json::from_str::<UsageFrame>(payload) {
			return TokenUsage {
				input_tokens: parsed.usage.prompt_tokens,
				output_tokens: parsed.usage.completion_tokens,
			};
		}
	}
	warn!("no frame in the response carried a usage field, recording zero token usage");
	TokenUsage::default()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn finds_trailing_usage_frame() {
		let body = b"data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\ndata: {\"usage\":{\"prompt_tokens\":7,\"completion_tokens\":11,\"total_tokens\":18}}\n\n";
		let usage = extract_usage(body);
		assert_eq!(usage, TokenUsage { input_tokens: 7, output_tokens: 11 });
	}

	#[test]
	fn no_usage_frame_yields_zero() {
		let body = b"data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n";
		assert_eq!(extract_usage(body), TokenUsage::default());
	}

	#[test]
	fn last_usage_frame_wins_when_multiple_present() {
		let body = b"data: {\"usage\":{\"prompt_tokens\":1,\"completion_tokens\":1}}\n\ndata: {\"usage\":{\"prompt_tokens\":7,\"completion_tokens\":11}}\n\n";
		assert_eq!(extract_usage(body), TokenUsage { input_tokens: 7, output_tokens: 11 });
	}
}
