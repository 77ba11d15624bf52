use std::error::Error as StdError;

use hopbus_common::SessionId;

use crate::link::LinkId;

/// Crate-wide result type for routing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed routing errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No candidate link exists, or every candidate's send failed.
    #[error("no route to {destination} for session {session_id}")]
    NoRoute {
        destination: String,
        session_id: SessionId,
    },

    /// A session id of `0` was used where a bound session is required.
    #[error("invalid session id {session_id}: {reason}")]
    InvalidSession {
        session_id: SessionId,
        reason: &'static str,
    },

    /// A referenced session, link or endpoint is not present.
    #[error("unknown binding: {what}")]
    UnknownBinding { what: String },

    /// The caller broke an operation's precondition.
    #[error("precondition violated: {message}")]
    PreconditionViolation { message: String },

    /// The session is already bound to another link and rebinding is refused.
    #[error("session {session_id} is already bound to link {link}")]
    SessionAlreadyBound { session_id: SessionId, link: LinkId },

    /// The link was lost; no further sends are attempted on it.
    #[error("link {link} is closed")]
    LinkClosed { link: LinkId },

    /// The transport behind a link failed to send.
    #[error("send on link {link} failed: {source}")]
    Send {
        link: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn no_route(destination: impl Into<String>, session_id: SessionId) -> Self {
        Self::NoRoute {
            destination: destination.into(),
            session_id,
        }
    }

    #[must_use]
    pub fn invalid_session(session_id: SessionId, reason: &'static str) -> Self {
        Self::InvalidSession { session_id, reason }
    }

    #[must_use]
    pub fn unknown_binding(what: impl std::fmt::Display) -> Self {
        Self::UnknownBinding {
            what: what.to_string(),
        }
    }

    #[must_use]
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionViolation {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn send(link: impl Into<String>, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::Send {
            link: link.into(),
            source: Box::new(source),
        }
    }

    /// Whether the caller should surface this as a routing failure to the
    /// message originator.
    #[must_use]
    pub fn is_no_route(&self) -> bool {
        matches!(self, Self::NoRoute { .. })
    }
}
