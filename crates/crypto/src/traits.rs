//! Encryptor trait consumed on the send path.

use crate::error::Result;

/// Authenticated encryption of marshalled messages.
///
/// The first `header_len` bytes of a message are its header. Routers on the
/// path must be able to read it, so implementations leave it in the clear and
/// only seal the body. Implementations can be swapped without touching the
/// routing code.
pub trait MessageEncryptor: Send + Sync {
    /// Seal `raw`, returning the bytes to put on the wire.
    fn encrypt(&self, raw: &[u8], header_len: usize) -> Result<Vec<u8>>;

    /// Open bytes previously produced by [`encrypt`](Self::encrypt).
    fn decrypt(&self, sealed: &[u8], header_len: usize) -> Result<Vec<u8>>;

    /// Number of bytes sealing adds to a message.
    fn overhead(&self) -> usize;
}
