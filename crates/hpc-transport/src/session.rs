//! A single persistent remote-shell session: one authenticated SSH connection
//! to the HPC head node, from which individual commands are executed as
//! channels multiplexed over the same connection.

use std::path::Path;
use std::sync::Arc;

use russh::client::{self, Handle};
use russh::{Channel, ChannelMsg, Disconnect};
use russh_keys::key::KeyPair;

use crate::error::TransportError;

/// Host-key checking is intentionally disabled: the head node is reached over
/// a private network and operators rotate host keys without notice.
struct AcceptAllHostKeys;

impl client::Handler for AcceptAllHostKeys {
	type Error = russh::Error;

	async fn check_server_key(
		&mut self,
		_server_public_key: &russh_keys::key::PublicKey,
	) -> Result<bool, Self::Error> {
		Ok(true)
	}
}

pub struct Session {
	handle: Handle<AcceptAllHostKeys>,
}

impl Session {
	pub async fn connect(host: &str, port: u16, user: &str, key: Arc<KeyPair>) -> Result<Self, TransportError> {
		let config = Arc::new(client::Config::default());
		let mut handle = client::connect(config, (host, port), AcceptAllHostKeys)
			.await
			.map_err(TransportError::Connect)?;
		let authenticated = handle
			.authenticate_publickey(user, key)
			.await
			.map_err(TransportError::Auth)?;
		if !authenticated {
			return Err(TransportError::AuthRejected);
		}
		Ok(Self { handle })
	}

	pub fn is_closed(&self) -> bool {
		self.handle.is_closed()
	}

	pub async fn exec(&self, command: &[u8]) -> Result<RemoteProcess, TransportError> {
		let mut channel = self
			.handle
			.channel_open_session()
			.await
			.map_err(TransportError::Channel)?;
		channel
			.exec(true, command)
			.await
			.map_err(TransportError::Channel)?;
		Ok(RemoteProcess { channel })
	}

	pub async fn disconnect(&self) {
		let _ = self
			.handle
			.disconnect(Disconnect::ByApplication, "", "English")
			.await;
	}
}

pub fn load_key(path: &Path) -> Result<Arc<KeyPair>, TransportError> {
	let key = russh_keys::load_secret_key(path, None)
		.map_err(|e| TransportError::Key(path.to_path_buf(), e.into()))?;
	Ok(Arc::new(key))
}

/// One exec'd remote command. Data/extended-data frames arrive out of
/// `wait()`; stdin is written explicitly and closed with `close_stdin`.
pub struct RemoteProcess {
	channel: Channel<client::Msg>,
}

pub enum RemoteEvent {
	Stdout(Vec<u8>),
	Stderr(Vec<u8>),
	ExitStatus(u32),
	Eof,
	Closed,
}

impl RemoteProcess {
	pub async fn write_stdin(&mut self, data: &[u8]) -> Result<(), TransportError> {
		self.channel.data(data).await.map_err(TransportError::Channel)
	}

	pub async fn close_stdin(&mut self) -> Result<(), TransportError> {
		self.channel.eof().await.map_err(TransportError::Channel)
	}

	/// `channel.wait()` also yields control messages (`Success`, window
	/// adjustments, ...) that carry no data; those are skipped in a loop here
	/// rather than surfaced as `None`, since `None` means "channel closed" to
	/// every caller of this method.
	pub async fn next_event(&mut self) -> Option<RemoteEvent> {
		loop {
			match self.channel.wait().await? {
				ChannelMsg::Data { data } => return Some(RemoteEvent::Stdout(data.to_vec())),
				ChannelMsg::ExtendedData { data, .. } => return Some(RemoteEvent::Stderr(data.to_vec())),
				ChannelMsg::ExitStatus { exit_status } => return Some(RemoteEvent::ExitStatus(exit_status)),
				ChannelMsg::Eof => return Some(RemoteEvent::Eof),
				ChannelMsg::Close => return Some(RemoteEvent::Closed),
				_ => continue,
			}
		}
	}

	pub async fn kill(&mut self) {
		let _ = self.channel.close().await;
	}
}
