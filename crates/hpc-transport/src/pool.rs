//! Bounded pool of persistent, multiplexed remote-shell sessions.
//!
//! Each slot lazily holds one authenticated SSH connection to the head node;
//! sessions are reused across many `exec()` calls (that's the "multiplexed"
//! part — each exec opens its own channel on the same connection). Slot
//! selection is uniformly random, which needs no cross-request coordination:
//! collisions just mean two execs share one connection's channel multiplexing,
//! which SSH already supports.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::command::RemoteCommand;
use crate::error::TransportError;
use crate::session::{RemoteProcess, Session, load_key};

pub const MAX_SSH_CONNECTIONS: usize = 16;
pub const ROUTINE_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Debug)]
pub struct HpcEndpoint {
	pub host: String,
	pub port: u16,
	pub user: String,
	pub key_path: PathBuf,
}

struct Slot {
	session: Mutex<Option<Session>>,
}

pub struct TransportPool {
	endpoint: HpcEndpoint,
	key: Arc<russh_keys::key::KeyPair>,
	slots: Vec<Slot>,
}

impl TransportPool {
	pub fn new(endpoint: HpcEndpoint, slots: usize) -> Result<Arc<Self>, TransportError> {
		let key = load_key(&endpoint.key_path)?;
		let slots = (0..slots.max(1))
			.map(|_| Slot { session: Mutex::new(None) })
			.collect();
		Ok(Arc::new(Self { endpoint, key, slots }))
	}

	/// Execute one command, lazily (re)establishing the connection at a
	/// randomly chosen slot if it's missing or the underlying transport has
	/// gone inactive.
	pub async fn exec(&self, command: &RemoteCommand) -> Result<RemoteProcess, TransportError> {
		let idx = rand::thread_rng().gen_range(0..self.slots.len());
		let mut guard = self.slots[idx].session.lock().await;
		self.ensure_connected(&mut guard, idx).await?;
		let session = guard.as_ref().expect("just ensured connected");
		match session.exec(&command.command).await {
			Ok(mut proc) => {
				if let Some(stdin) = &command.stdin_body {
					proc.write_stdin(stdin).await?;
					proc.close_stdin().await?;
				}
				Ok(proc)
			},
			Err(e) => {
				// The connection may have died between the liveness check and
				// this exec; drop it so the next request reconnects.
				*guard = None;
				Err(e)
			},
		}
	}

	async fn ensure_connected(&self, slot: &mut Option<Session>, idx: usize) -> Result<(), TransportError> {
		let needs_reconnect = match slot {
			None => true,
			Some(s) => s.is_closed(),
		};
		if needs_reconnect {
			info!(slot = idx, host = %self.endpoint.host, "establishing HPC transport session");
			let session = Session::connect(&self.endpoint.host, self.endpoint.port, &self.endpoint.user, self.key.clone())
				.await?;
			*slot = Some(session);
		}
		Ok(())
	}

	/// Spawn the background liveness loop on its own task so a stalled
	/// reconnection never delays request handling. Runs until the process
	/// exits; failures are logged and retried, never propagated.
	pub fn spawn_liveness_loop(self: Arc<Self>) {
		tokio::spawn(async move {
			let mut ticker = tokio::time::interval(ROUTINE_INTERVAL);
			loop {
				ticker.tick().await;
				for idx in 0..self.slots.len() {
					let pool = self.clone();
					tokio::spawn(async move {
						let result = tokio::time::timeout(ROUTINE_INTERVAL * 4, pool.keep_alive(idx)).await;
						match result {
							Ok(Ok(())) => {},
							Ok(Err(e)) => warn!(slot = idx, error = %e, "keep-alive failed, will retry"),
							Err(_) => error!(slot = idx, "keep-alive timed out"),
						}
					});
				}
			}
		});
	}

	async fn keep_alive(&self, idx: usize) -> Result<(), TransportError> {
		let mut guard = self.slots[idx].session.lock().await;
		if guard.is_none() {
			// Nothing to keep alive yet; the slot connects lazily on first use.
			return Ok(());
		}
		self.ensure_connected(&mut guard, idx).await?;
		let session = guard.as_ref().expect("just ensured connected");
		let mut proc = session.exec(b"keep-alive").await?;
		proc.close_stdin().await?;
		loop {
			match proc.next_event().await {
				Some(crate::session::RemoteEvent::Closed) | None => break,
				Some(_) => continue,
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn slot_count_defaults_reasonably() {
		assert_eq!(MAX_SSH_CONNECTIONS, 16);
	}
}
