//! Link decorator that seals every message before it reaches the transport.

use std::sync::Arc;

use {
    async_trait::async_trait,
    hopbus_common::{Guid, Message},
    hopbus_routing::{self as routing, Link},
};

#[cfg(feature = "metrics")]
use {
    hopbus_metrics::{counter, crypto as crypto_metrics, histogram, labels},
    std::time::Instant,
};

use crate::{error::Error, traits::MessageEncryptor};

/// Wraps a [`Link`] so routing hands it plaintext and the transport only
/// ever sees sealed bytes.
pub struct SealingLink {
    inner: Arc<dyn Link>,
    encryptor: Arc<dyn MessageEncryptor>,
}

impl SealingLink {
    pub fn new(inner: Arc<dyn Link>, encryptor: Arc<dyn MessageEncryptor>) -> Self {
        Self { inner, encryptor }
    }

    /// Seal `message`, keeping its routing metadata.
    pub fn seal(&self, message: &Message) -> Result<Message, Error> {
        #[cfg(feature = "metrics")]
        let start = Instant::now();

        let sealed = self
            .encryptor
            .encrypt(message.bytes(), message.header_len())
            .and_then(|bytes| {
                message
                    .with_bytes(bytes)
                    .map_err(|e| Error::cipher(e.to_string()))
            });

        #[cfg(feature = "metrics")]
        match &sealed {
            Ok(_) => {
                counter!(crypto_metrics::MESSAGES_SEALED_TOTAL).increment(1);
                histogram!(crypto_metrics::SEAL_DURATION_SECONDS)
                    .record(start.elapsed().as_secs_f64());
            },
            Err(_) => {
                counter!(crypto_metrics::FAILURES_TOTAL, labels::OPERATION => "seal").increment(1);
            },
        }

        sealed
    }
}

#[async_trait]
impl Link for SealingLink {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn remote_guid(&self) -> &Guid {
        self.inner.remote_guid()
    }

    async fn send(&self, message: &Message) -> routing::Result<()> {
        let sealed = match self.seal(message) {
            Ok(sealed) => sealed,
            Err(e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(link = self.name(), serial = message.serial(), error = %e, "seal failed");
                return Err(routing::Error::send(self.name(), e));
            },
        };
        #[cfg(feature = "tracing")]
        tracing::trace!(
            link = self.name(),
            serial = message.serial(),
            sealed_len = sealed.bytes().len(),
            "message sealed"
        );
        self.inner.send(&sealed).await
    }
}
