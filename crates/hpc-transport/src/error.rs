#[derive(Debug, thiserror::Error)]
pub enum TransportError {
	#[error("ssh connect failed: {0}")]
	Connect(#[source] russh::Error),
	#[error("ssh authentication was rejected")]
	AuthRejected,
	#[error("ssh authentication failed: {0}")]
	Auth(#[source] russh::Error),
	#[error("failed to load private key {0}: {1}")]
	Key(std::path::PathBuf, #[source] anyhow::Error),
	#[error("channel operation failed: {0}")]
	Channel(#[source] russh::Error),
	#[error("remote process exited without closing the channel cleanly")]
	AbruptClose,
}
