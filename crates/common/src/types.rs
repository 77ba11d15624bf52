//! Bus naming and message types shared by the router crates.

use std::fmt;

use {
    bytes::Bytes,
    serde::{Deserialize, Serialize},
};

use crate::{Error, Result};

/// Identifier of a multi-point session. `0` means "no session".
pub type SessionId = u32;

/// Session id reserved for routes that are not bound to any session.
pub const NO_SESSION: SessionId = 0;

/// Number of leading GUID characters embedded in unique names.
pub const SHORT_GUID_LEN: usize = 8;

/// Identity of a router daemon, as exchanged during link establishment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guid(String);

impl Guid {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.is_empty() {
            return Err(Error::invalid_name(value, "empty guid"));
        }
        if value.contains(['.', ':']) {
            return Err(Error::invalid_name(value, "guid must not contain '.' or ':'"));
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The abbreviated form used inside unique names.
    #[must_use]
    pub fn short(&self) -> &str {
        match self.0.char_indices().nth(SHORT_GUID_LEN) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Guid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Extract the short daemon GUID from a unique name such as `:1a2b3c4d.7`.
///
/// The leading `:` is optional. Without a `.` the whole remainder is the GUID.
#[must_use]
pub fn short_guid_of(unique_name: &str) -> &str {
    let name = unique_name.strip_prefix(':').unwrap_or(unique_name);
    match name.find('.') {
        Some(pos) => &name[..pos],
        None => name,
    }
}

/// A marshalled message in final wire form.
///
/// The first `header_len` bytes are the header; the remainder is the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    destination: String,
    session_id: SessionId,
    serial: u32,
    header_len: usize,
    bytes: Bytes,
}

impl Message {
    pub fn new(
        destination: impl Into<String>,
        session_id: SessionId,
        serial: u32,
        header: &[u8],
        body: &[u8],
    ) -> Self {
        let mut buf = Vec::with_capacity(header.len() + body.len());
        buf.extend_from_slice(header);
        buf.extend_from_slice(body);
        Self {
            destination: destination.into(),
            session_id,
            serial,
            header_len: header.len(),
            bytes: Bytes::from(buf),
        }
    }

    /// Same routing metadata, different wire bytes (e.g. after sealing).
    pub fn with_bytes(&self, bytes: impl Into<Bytes>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.len() < self.header_len {
            return Err(Error::message(format!(
                "replacement payload of {} bytes is shorter than the {}-byte header",
                bytes.len(),
                self.header_len
            )));
        }
        Ok(Self {
            bytes,
            ..self.clone()
        })
    }

    #[must_use]
    pub fn destination(&self) -> &str {
        &self.destination
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn serial(&self) -> u32 {
        self.serial
    }

    #[must_use]
    pub fn header_len(&self) -> usize {
        self.header_len
    }

    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    #[must_use]
    pub fn header(&self) -> &[u8] {
        &self.bytes[..self.header_len]
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.bytes[self.header_len..]
    }
}
