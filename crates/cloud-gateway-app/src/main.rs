//! Cloud gateway binary: loads configuration, builds the Azure-backed chat
//! completion client, and serves the single passthrough endpoint.

use std::sync::Arc;

use axum::Router;
use gateway_core::{env, secrets, telemetry};
use gateway_proxy::audit::AuditSink;
use gateway_proxy::cloud::{CloudGatewayState, PASSTHROUGH_PREFIX, handle};
use gateway_proxy::registry::ServiceRegistry;
use tracing::info;

const SECRETS_DIR: &str = "/etc/gateway/secrets";
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer as concisely as possible.";
const API_VERSION: &str = "2024-06-01";

fn main() -> anyhow::Result<()> {
	telemetry::init_logging("info,gateway_proxy=info");

	let port: u16 = env::required_parsed("PORT")?;
	let workers: usize = env::optional_parsed("WORKERS", 4)?;
	let default_portal = env::optional_parsed("CLOUD_DEFAULT_PORTAL", "cloud".to_string())?;
	let service_enabled: bool = env::optional_parsed("CLOUD_SERVICE_ENABLED", true)?;

	let secrets = secrets::Secrets::load(SECRETS_DIR, &["api-key", "endpoint", "services.json"])?;
	let api_key = secrets.require("api-key")?.to_string();
	let endpoint = secrets.require("endpoint")?.to_string();
	let registry = ServiceRegistry::from_json(secrets.require("services.json")?)?;

	let runtime = tokio::runtime::Builder::new_multi_thread()
		.worker_threads(workers.max(1))
		.enable_all()
		.build()?;

	runtime.block_on(serve(port, default_portal, service_enabled, api_key, endpoint, registry))
}

async fn serve(
	port: u16,
	default_portal: String,
	service_enabled: bool,
	api_key: String,
	endpoint: String,
	registry: ServiceRegistry,
) -> anyhow::Result<()> {
	let state = Arc::new(CloudGatewayState {
		api_key,
		api_base: endpoint,
		api_version: API_VERSION.to_string(),
		registry,
		system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
		default_portal,
		sink: AuditSink::stdout(),
		service_enabled,
	});

	let app = Router::new()
		.route(&format!("/{PASSTHROUGH_PREFIX}/{{*rest}}"), axum::routing::any(handle))
		.with_state(state);

	let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
	info!(port, "cloud gateway listening");
	axum::serve(listener, app).await?;
	Ok(())
}
