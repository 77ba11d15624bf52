//! XChaCha20-Poly1305 implementation of [`MessageEncryptor`].

#[allow(deprecated)] // upstream generic-array 0.x deprecation
use chacha20poly1305::{
    XChaCha20Poly1305, XNonce,
    aead::{Aead, KeyInit, Payload},
};
use {
    hopbus_config::{SECURITY_KEY_LEN, SecurityConfig},
    rand::RngCore,
    zeroize::Zeroizing,
};

use crate::{
    error::{Context, Error, Result},
    traits::MessageEncryptor,
};

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_LEN: usize = 24;

/// Poly1305 tag size.
pub const TAG_LEN: usize = 16;

/// Seals message bodies with XChaCha20-Poly1305.
///
/// Sealed layout: `[header][nonce: 24 bytes][ciphertext + tag: N + 16 bytes]`.
/// The header is authenticated as associated data, so rewriting it in
/// transit makes the message fail to open.
pub struct XChaCha20MessageEncryptor {
    key: Zeroizing<[u8; SECURITY_KEY_LEN]>,
}

impl XChaCha20MessageEncryptor {
    pub fn new(key: [u8; SECURITY_KEY_LEN]) -> Self {
        Self {
            key: Zeroizing::new(key),
        }
    }

    /// Build from the `[security]` config section. `Ok(None)` when sealing
    /// is disabled.
    pub fn from_config(config: &SecurityConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        let key = config
            .decode_key()
            .context("invalid security key")?
            .context("security is enabled but security.key is not set")?;
        Ok(Some(Self::new(key)))
    }

    #[allow(deprecated)]
    fn cipher(&self) -> XChaCha20Poly1305 {
        let key: &[u8; SECURITY_KEY_LEN] = &self.key;
        XChaCha20Poly1305::new(key.into())
    }

    fn split(buf: &[u8], header_len: usize) -> Result<(&[u8], &[u8])> {
        if header_len > buf.len() {
            return Err(Error::InvalidHeader {
                header_len,
                len: buf.len(),
            });
        }
        Ok(buf.split_at(header_len))
    }
}

impl MessageEncryptor for XChaCha20MessageEncryptor {
    #[allow(deprecated)]
    fn encrypt(&self, raw: &[u8], header_len: usize) -> Result<Vec<u8>> {
        let (header, body) = Self::split(raw, header_len)?;
        let cipher = self.cipher();

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, Payload {
                msg: body,
                aad: header,
            })
            .map_err(|e| Error::cipher(e.to_string()))?;

        let mut sealed = Vec::with_capacity(header.len() + NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(header);
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    #[allow(deprecated)]
    fn decrypt(&self, sealed: &[u8], header_len: usize) -> Result<Vec<u8>> {
        let (header, rest) = Self::split(sealed, header_len)?;
        if rest.len() < NONCE_LEN + TAG_LEN {
            return Err(Error::cipher("sealed message too short"));
        }

        let (nonce_bytes, ct) = rest.split_at(NONCE_LEN);
        let nonce = XNonce::from_slice(nonce_bytes);
        let cipher = self.cipher();

        let body = cipher
            .decrypt(nonce, Payload {
                msg: ct,
                aad: header,
            })
            .map_err(|e| Error::cipher(e.to_string()))?;

        let mut raw = Vec::with_capacity(header.len() + body.len());
        raw.extend_from_slice(header);
        raw.extend_from_slice(&body);
        Ok(raw)
    }

    fn overhead(&self) -> usize {
        NONCE_LEN + TAG_LEN
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        base64::Engine,
        secrecy::Secret,
    };

    const KEY: [u8; 32] = [0x42; 32];

    fn seal(raw: &[u8], header_len: usize) -> Vec<u8> {
        XChaCha20MessageEncryptor::new(KEY)
            .encrypt(raw, header_len)
            .unwrap()
    }

    #[test]
    fn header_stays_in_clear() {
        let enc = XChaCha20MessageEncryptor::new(KEY);
        let sealed = enc.encrypt(b"HEADERbody bytes", 6).unwrap();
        assert_eq!(&sealed[..6], b"HEADER");
        assert_eq!(sealed.len(), 16 + enc.overhead());
        assert!(!sealed.windows(4).any(|w| w == b"body"));
        assert_eq!(enc.decrypt(&sealed, 6).unwrap(), b"HEADERbody bytes");
    }

    #[test]
    fn rewritten_header_fails_to_open() {
        let mut sealed = seal(b"HDRpayload", 3);
        sealed[0] = b'X';
        let err = XChaCha20MessageEncryptor::new(KEY)
            .decrypt(&sealed, 3)
            .unwrap_err();
        assert!(matches!(err, Error::Cipher(_)));
    }

    #[test]
    fn wrong_key_fails() {
        let sealed = seal(b"HDRpayload", 3);
        assert!(
            XChaCha20MessageEncryptor::new([0x43; 32])
                .decrypt(&sealed, 3)
                .is_err()
        );
    }

    #[test]
    fn tampered_body_fails() {
        let mut sealed = seal(b"HDRpayload", 3);
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(
            XChaCha20MessageEncryptor::new(KEY)
                .decrypt(&sealed, 3)
                .is_err()
        );
    }

    #[test]
    fn header_longer_than_buffer_is_rejected() {
        let enc = XChaCha20MessageEncryptor::new(KEY);
        assert!(matches!(
            enc.encrypt(b"abc", 4),
            Err(Error::InvalidHeader {
                header_len: 4,
                len: 3
            })
        ));
        assert!(matches!(
            enc.decrypt(&[0u8; 30], 3),
            Err(Error::Cipher(_))
        ));
    }

    #[test]
    fn nonces_differ_between_seals() {
        assert_ne!(seal(b"HDRsame", 3), seal(b"HDRsame", 3));
    }

    #[test]
    fn empty_body_and_whole_header() {
        let enc = XChaCha20MessageEncryptor::new(KEY);
        let sealed = enc.encrypt(b"HDR", 3).unwrap();
        assert_eq!(enc.decrypt(&sealed, 3).unwrap(), b"HDR");
    }

    #[test]
    fn from_config() {
        let disabled = SecurityConfig::default();
        assert!(
            XChaCha20MessageEncryptor::from_config(&disabled)
                .unwrap()
                .is_none()
        );

        let missing = SecurityConfig {
            enabled: true,
            key: None,
        };
        let err = XChaCha20MessageEncryptor::from_config(&missing)
            .err()
            .unwrap();
        assert!(err.to_string().contains("security.key is not set"));

        let encoded = base64::engine::general_purpose::STANDARD.encode(KEY);
        let ok = SecurityConfig {
            enabled: true,
            key: Some(Secret::new(encoded)),
        };
        assert!(
            XChaCha20MessageEncryptor::from_config(&ok)
                .unwrap()
                .is_some()
        );

        let bad = SecurityConfig {
            enabled: true,
            key: Some(Secret::new("not base64!".into())),
        };
        let err = XChaCha20MessageEncryptor::from_config(&bad)
            .err()
            .unwrap();
        assert!(err.to_string().starts_with("invalid security key"));
    }
}
