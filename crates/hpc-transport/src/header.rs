//! Parses the status line + headers a remote `curl`-like dispatcher writes
//! before the response body, out of a growing byte buffer.

#[derive(Debug, thiserror::Error)]
pub enum HeaderParseError {
	#[error("status line was not valid UTF-8")]
	NotUtf8,
	#[error("malformed status line: {0:?}")]
	MalformedStatusLine(String),
	#[error("status code {0:?} is not a valid integer")]
	BadStatusCode(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedHead {
	pub version: String,
	pub status_code: u16,
	pub reason: String,
	pub headers: Vec<(String, String)>,
}

pub struct ParseOutcome {
	pub head: ParsedHead,
	pub body_prefix: Vec<u8>,
}

const SEPARATOR: &[u8] = b"\r\n\r\n";

/// Attempt to parse a complete status line + header block out of `buf`.
/// Returns `Ok(None)` if the `\r\n\r\n` terminator has not arrived yet; the
/// caller should accumulate more bytes and retry. A `code == 100` block is
/// discarded and parsing recurses on the remaining bytes, per RFC 1xx
/// continuation semantics.
pub fn parse_head(buf: &[u8]) -> Result<Option<ParseOutcome>, HeaderParseError> {
	let Some(pos) = find(buf, SEPARATOR) else {
		return Ok(None);
	};
	let (head_bytes, rest) = buf.split_at(pos);
	let body_prefix = &rest[SEPARATOR.len()..];

	let head_str = std::str::from_utf8(head_bytes).map_err(|_| HeaderParseError::NotUtf8)?;
	let mut lines = head_str.split("\r\n");
	let status_line = lines
		.next()
		.ok_or_else(|| HeaderParseError::MalformedStatusLine(head_str.to_string()))?;

	let mut parts = status_line.splitn(3, ' ');
	let version = parts
		.next()
		.ok_or_else(|| HeaderParseError::MalformedStatusLine(status_line.to_string()))?;
	let code_str = parts
		.next()
		.ok_or_else(|| HeaderParseError::MalformedStatusLine(status_line.to_string()))?;
	let reason = parts.next().unwrap_or("").to_string();
	let status_code: u16 = code_str
		.parse()
		.map_err(|_| HeaderParseError::BadStatusCode(code_str.to_string()))?;

	let mut headers = Vec::new();
	for line in lines {
		if line.is_empty() {
			continue;
		}
		match line.split_once(": ") {
			Some((name, value)) if !name.eq_ignore_ascii_case("content-length") => {
				headers.push((name.to_string(), value.to_string()));
			},
			// Either a Content-Length header (always dropped, the transport
			// streams the body itself) or a malformed line: skip silently.
			_ => {},
		}
	}

	if status_code == 100 {
		return parse_head(body_prefix);
	}

	Ok(Some(ParseOutcome {
		head: ParsedHead {
			version: version.to_string(),
			status_code,
			reason,
			headers,
		},
		body_prefix: body_prefix.to_vec(),
	}))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
	haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_simple_head() {
		let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 4\r\n\r\nBODY";
		let out = parse_head(raw).unwrap().unwrap();
		assert_eq!(out.head.status_code, 200);
		assert_eq!(out.head.version, "HTTP/1.1");
		assert_eq!(out.head.reason, "OK");
		assert_eq!(out.head.headers, vec![("Content-Type".to_string(), "text/plain".to_string())]);
		assert_eq!(out.body_prefix, b"BODY");
	}

	#[test]
	fn incomplete_head_returns_none() {
		let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n";
		assert!(parse_head(raw).unwrap().is_none());
	}

	#[test]
	fn malformed_header_line_is_skipped() {
		let raw = b"HTTP/1.1 200 OK\r\nnotaheader\r\nX: 1\r\n\r\nBODY";
		let out = parse_head(raw).unwrap().unwrap();
		assert_eq!(out.head.headers, vec![("X".to_string(), "1".to_string())]);
	}

	#[test]
	fn continuation_100_is_discarded() {
		let raw = b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 200 OK\r\nX: 1\r\n\r\nBODY";
		let out = parse_head(raw).unwrap().unwrap();
		assert_eq!(out.head.status_code, 200);
		assert_eq!(out.head.headers, vec![("X".to_string(), "1".to_string())]);
		assert_eq!(out.body_prefix, b"BODY");
	}
}
