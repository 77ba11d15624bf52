//! Virtual-endpoint routing for inter-router bus links.
//!
//! Each remote bus peer is represented by a [`VirtualEndpoint`] holding the
//! links it can be reached through. Outgoing messages pick a link per
//! message:
//! 1. Session-bound messages go over the link(s) pinned to that session.
//! 2. Session-0 messages try direct links to the peer's own router first,
//!    then relays, in discovery order.
//!
//! Session bindings take a reference on their link. [`EndpointDirectory`]
//! ties endpoints, the link arena and link-loss teardown together.

pub mod directory;
pub mod endpoint;
pub mod error;
pub mod link;
pub mod memory;
pub mod registry;
pub mod table;

pub use {
    directory::EndpointDirectory,
    endpoint::{EndpointState, VirtualEndpoint},
    error::{Error, Result},
    link::{Link, LinkHandle, LinkId},
    memory::MemoryLink,
    registry::LinkRegistry,
    table::RouteTable,
};
