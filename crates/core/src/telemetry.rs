//! Structured logging setup shared by both gateway binaries.
//!
//! Logs are emitted human-readable via `tracing-subscriber`'s default `fmt`
//! layer, filtered by an `EnvFilter` built from `RUST_LOG` (or a
//! caller-supplied default). This is the only logging configuration knob: no
//! per-field add/remove list, no log file rotation beyond what the operator's
//! process supervisor already does. The separate per-request audit trail
//! (one JSON object per completed request) is its own sink, see
//! `gateway_proxy::audit`, and is independent of this filter.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Initialize the global tracing subscriber. `default_filter` is used when
/// `RUST_LOG` is unset, e.g. `"info,gateway_proxy=debug"`.
pub fn init_logging(default_filter: &str) {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
	let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

	let _ = tracing_subscriber::registry()
		.with(filter)
		.with(fmt_layer)
		.try_init();
}
