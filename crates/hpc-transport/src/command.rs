//! Translates an inbound HTTP-ish request into the textual command line the
//! remote head node expects: a four-line address header followed by a
//! shell-assembled argument vector for a `curl`-like remote dispatcher.

pub const INLINE_DATA_LIMIT: usize = 1024;

/// `true` if a header should be forwarded to the remote command line.
/// Drops `content-length` (the transport reframes the body itself), every
/// `x-*` header, and every `inference-*` header except `inference-service`.
pub fn is_forwardable_header(name: &str) -> bool {
	let lower = name.to_ascii_lowercase();
	if lower == "content-length" {
		return false;
	}
	if lower.starts_with("x-") {
		return false;
	}
	if lower.starts_with("inference-") {
		return lower == "inference-service";
	}
	true
}

/// Outcome of translating a request: the header-and-argv bytes that are
/// always sent as the remote exec command, plus an optional body that must be
/// written to the remote process's stdin instead of being inlined with `-d`.
pub struct RemoteCommand {
	pub command: Vec<u8>,
	pub stdin_body: Option<Vec<u8>>,
}

pub struct RemoteCommandInput<'a> {
	pub inference_id: &'a str,
	pub uid: &'a str,
	pub service: &'a str,
	pub path: &'a str,
	pub query: Option<&'a str>,
	pub method: &'a str,
	pub headers: &'a [(String, String)],
	pub body: Option<&'a [u8]>,
	pub inline_body_enabled: bool,
}

pub fn build(input: RemoteCommandInput<'_>) -> RemoteCommand {
	let mut out = String::new();
	out.push_str(input.inference_id);
	out.push('\n');
	out.push_str(input.uid);
	out.push('\n');
	out.push_str(input.service);
	out.push('\n');
	out.push('/');
	out.push_str(input.path);
	if let Some(q) = input.query {
		out.push('?');
		out.push_str(q);
	}
	out.push_str("\n -X ");
	out.push_str(input.method);
	for (name, value) in input.headers {
		if !is_forwardable_header(name) {
			continue;
		}
		out.push_str(" -H \"");
		out.push_str(name);
		out.push_str(": ");
		// Reuse the same quoting for the value half, minus the wrapping quotes
		// already opened above.
		out.push_str(&value.replace('\\', "\\\\").replace('"', "\\\""));
		out.push('"');
	}

	let inline = input.body.is_some_and(|b| {
		input.inline_body_enabled && b.len() <= INLINE_DATA_LIMIT && std::str::from_utf8(b).is_ok()
	});

	let mut command = out.into_bytes();
	let stdin_body = match input.body {
		None => None,
		Some(b) if inline => {
			command.extend_from_slice(b" -d ");
			command.extend_from_slice(b);
			None
		},
		Some(b) => Some(b.to_vec()),
	};

	RemoteCommand { command, stdin_body }
}

#[cfg(test)]
mod tests {
	use super::*;

	fn headers(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
		pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
	}

	#[test]
	fn filters_x_and_inference_headers() {
		assert!(!is_forwardable_header("Content-Length"));
		assert!(!is_forwardable_header("X-Forwarded-For"));
		assert!(!is_forwardable_header("inference-id"));
		assert!(!is_forwardable_header("Inference-Portal"));
		assert!(is_forwardable_header("inference-service"));
		assert!(is_forwardable_header("Authorization"));
	}

	#[test]
	fn small_utf8_body_is_inlined() {
		let hdrs = headers(&[("content-type", "application/json")]);
		let body = b"{\"a\":1}";
		let cmd = build(RemoteCommandInput {
			inference_id: "req-1",
			uid: "anon",
			service: "svc",
			path: "v1/chat/completions",
			query: None,
			method: "POST",
			headers: &hdrs,
			body: Some(body),
			inline_body_enabled: true,
		});
		assert!(cmd.stdin_body.is_none());
		let text = String::from_utf8(cmd.command).unwrap();
		assert!(text.starts_with("req-1\nanon\nsvc\n/v1/chat/completions\n -X POST"));
		assert!(text.ends_with("-d {\"a\":1}"));
	}

	#[test]
	fn oversized_body_goes_to_stdin() {
		let big = vec![b'a'; INLINE_DATA_LIMIT + 1];
		let cmd = build(RemoteCommandInput {
			inference_id: "req-2",
			uid: "anon",
			service: "svc",
			path: "p",
			query: None,
			method: "POST",
			headers: &[],
			body: Some(&big),
			inline_body_enabled: true,
		});
		assert_eq!(cmd.stdin_body.as_deref(), Some(big.as_slice()));
		let text = String::from_utf8(cmd.command).unwrap();
		assert!(!text.contains("-d "));
	}

	#[test]
	fn non_utf8_body_goes_to_stdin_even_if_small() {
		let body = [0xff, 0xfe, 0x00];
		let cmd = build(RemoteCommandInput {
			inference_id: "req-3",
			uid: "anon",
			service: "svc",
			path: "p",
			query: None,
			method: "POST",
			headers: &[],
			body: Some(&body),
			inline_body_enabled: true,
		});
		assert_eq!(cmd.stdin_body.as_deref(), Some(body.as_slice()));
	}

	#[test]
	fn query_string_is_appended_to_path() {
		let cmd = build(RemoteCommandInput {
			inference_id: "id",
			uid: "u",
			service: "s",
			path: "p",
			query: Some("a=1&b=2"),
			method: "GET",
			headers: &[],
			body: None,
			inline_body_enabled: true,
		});
		let text = String::from_utf8(cmd.command).unwrap();
		assert!(text.contains("/p?a=1&b=2\n"));
	}
}
