//! Message sealing for inter-router links using XChaCha20-Poly1305.
//!
//! Headers travel in the clear (routers read them) but are authenticated;
//! bodies are encrypted. [`SealingLink`] applies an encryptor on the send
//! path so routing never deals with ciphertext.

pub mod error;
pub mod sealing;
pub mod traits;
pub mod xchacha20;

pub use {
    error::{Context, Error, Result},
    sealing::SealingLink,
    traits::MessageEncryptor,
    xchacha20::XChaCha20MessageEncryptor,
};
