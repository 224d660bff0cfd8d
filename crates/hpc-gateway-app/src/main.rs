//! HPC gateway binary: loads configuration, opens the remote-shell transport
//! pool, starts its liveness loop, and serves the single passthrough
//! endpoint.

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use gateway_core::{env, telemetry};
use gateway_hpc_transport::{HpcEndpoint, MAX_SSH_CONNECTIONS, TransportPool};
use gateway_proxy::audit::AuditSink;
use gateway_proxy::hpc::{HpcGatewayState, PASSTHROUGH_PREFIX, handle};
use tracing::info;

const SECRETS_DIR: &str = "/etc/gateway/secrets";
const SSH_PORT: u16 = 22;

fn main() -> anyhow::Result<()> {
	telemetry::init_logging("info,gateway_proxy=info,gateway_hpc_transport=info");

	let port: u16 = env::required_parsed("PORT")?;
	let workers: usize = env::optional_parsed("WORKERS", 4)?;
	let hpc_host = env::required("HPC_HOST")?;
	let hpc_user = env::required("HPC_USER")?;
	let key_name = env::required("KEY_NAME")?;
	let default_portal = env::optional_parsed("HPC_DEFAULT_PORTAL", "hpc".to_string())?;
	let inline_body_enabled: bool = env::optional_parsed("HPC_INLINE_BODY", true)?;
	let accounting_enabled: bool = env::optional_parsed("HPC_ACCOUNTING", true)?;
	let service_from_body_enabled: bool = env::optional_parsed("HPC_SERVICE_FROM_BODY", true)?;

	let key_path = PathBuf::from(SECRETS_DIR).join(&key_name);
	let endpoint = HpcEndpoint { host: hpc_host, port: SSH_PORT, user: hpc_user, key_path };
	let pool = TransportPool::new(endpoint, MAX_SSH_CONNECTIONS)?;
	pool.clone().spawn_liveness_loop();

	let state = Arc::new(HpcGatewayState {
		pool,
		default_portal,
		sink: AuditSink::stdout(),
		inline_body_enabled,
		accounting_enabled,
		service_from_body_enabled,
	});

	let runtime = tokio::runtime::Builder::new_multi_thread()
		.worker_threads(workers.max(1))
		.enable_all()
		.build()?;

	runtime.block_on(serve(port, state))
}

async fn serve(port: u16, state: Arc<HpcGatewayState>) -> anyhow::Result<()> {
	let app = Router::new()
		.route(&format!("/{PASSTHROUGH_PREFIX}/{{*rest}}"), axum::routing::any(handle))
		.with_state(state);
	let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
	info!(port, "hpc gateway listening");
	axum::serve(listener, app).await?;
	Ok(())
}
