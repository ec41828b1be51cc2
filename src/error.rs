use thiserror::Error;

pub type Result<T> = std::result::Result<T, AdbError>;

/// Errors surfaced by the host, sync, shell and framebuffer clients.
#[derive(Debug, Error)]
pub enum AdbError {
    /// The server answered FAIL; the message is exactly what it sent.
    #[error("adb server: {0}")]
    Server(String),

    /// Malformed or unexpected framing, or an unsupported format/version.
    /// The connection is no longer at a known byte position and must be
    /// discarded.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The underlying connection failed, e.g. the server closed the stream
    /// mid-exchange.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),
}

impl AdbError {
    pub(crate) fn protocol(message: impl Into<String>) -> Self {
        AdbError::Protocol(message.into())
    }
}
