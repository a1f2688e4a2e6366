//! Protocol error taxonomy.

use std::io;

/// Errors raised while handshaking, sealing or opening a frame.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Key generation, key exchange or public-key decoding failed.
    #[error("handshake failed: {0}")]
    Handshake(String),
    /// The envelope carried a different shared-secret hash.
    #[error("authentication failed: shared secret mismatch")]
    Authentication,
    /// Signature verification or envelope decryption failed.
    #[error("integrity check failed: {0}")]
    Integrity(&'static str),
    /// Underlying socket error.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
    /// The peer closed the connection before a frame started.
    #[error("connection closed")]
    ConnectionClosed,
    /// The envelope announced a ciphertext above the frame limit.
    #[error("frame too large: {size} bytes (max {max})")]
    TooLarge { size: u32, max: u32 },
    /// RSA encryption or signing failed on the sending side.
    #[error("crypto error: {0}")]
    Crypto(#[from] rsa::Error),
    /// JSON payload could not be encoded or decoded.
    #[error("payload error: {0}")]
    Payload(#[from] serde_json::Error),
    /// Invalid password or key size.
    #[error("invalid credentials: {0}")]
    Credentials(&'static str),
}

/// Coarse failure class reported in audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Connection aborted before a task was consumed.
    Handshake,
    /// Wrong shared secret.
    Authentication,
    /// Tampering or corruption.
    Integrity,
    /// Socket error, timeout or malformed payload.
    Transport,
}

impl ProtocolError {
    /// Classify this error for logs and audit records.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Handshake(_) | Self::Credentials(_) => FailureKind::Handshake,
            Self::Authentication => FailureKind::Authentication,
            Self::Integrity(_) => FailureKind::Integrity,
            Self::Transport(_)
            | Self::ConnectionClosed
            | Self::TooLarge { .. }
            | Self::Crypto(_)
            | Self::Payload(_) => FailureKind::Transport,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Handshake => "handshake",
            Self::Authentication => "authentication",
            Self::Integrity => "integrity",
            Self::Transport => "transport",
        };
        f.write_str(name)
    }
}
