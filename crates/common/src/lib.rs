//! Shared types, error definitions, and utilities used across all hopbus crates.

pub mod error;
pub mod types;

pub use {
    error::{Error, FromMessage, Result},
    types::{Guid, Message, NO_SESSION, SessionId, short_guid_of},
};
