//! Message sealing errors.

use hopbus_common::FromMessage;

/// Errors produced while sealing or opening a message.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The declared header is longer than the buffer it should prefix.
    #[error("header length {header_len} exceeds message length {len}")]
    InvalidHeader { header_len: usize, len: usize },

    /// Encryption or decryption failed (tampered data, wrong key, short input).
    #[error("cipher error: {0}")]
    Cipher(String),

    /// The configured key is missing or malformed.
    #[error("{0}")]
    Key(String),
}

impl Error {
    #[must_use]
    pub fn cipher(message: impl Into<String>) -> Self {
        Self::Cipher(message.into())
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Key(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

hopbus_common::impl_context!();
