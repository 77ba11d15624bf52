//! Virtual endpoint: the local stand-in for one remote bus peer.
//!
//! A virtual endpoint owns a [`RouteTable`] listing every link through which
//! the peer is reachable. Session-0 entries are plain paths; entries under a
//! non-zero session id pin that session to one link and hold a session
//! reference on it.
//!
//! The table lock is only held for in-memory work. [`VirtualEndpoint::route`]
//! snapshots its candidates, releases the lock, then sends.

use std::{
    collections::BTreeSet,
    fmt,
    sync::{Mutex, MutexGuard},
};

use {
    hopbus_common::{Guid, Message, NO_SESSION, SessionId, short_guid_of},
    hopbus_config::RebindPolicy,
    tracing::{debug, error, trace, warn},
};

#[cfg(feature = "metrics")]
use hopbus_metrics::{counter, gauge, histogram, labels, routing as routing_metrics};

use crate::{
    Error, Result,
    link::{LinkHandle, LinkId},
    table::RouteTable,
};

/// Lifecycle of a virtual endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    /// Accepts every mutating operation.
    Active,
    /// Lost its last usable route. Terminal; the directory tears it down.
    Stopping,
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Stopping => f.write_str("stopping"),
        }
    }
}

struct Inner {
    table: RouteTable,
    state: EndpointState,
    has_session_refs: bool,
}

pub struct VirtualEndpoint {
    unique_name: String,
    short_guid: String,
    inner: Mutex<Inner>,
}

impl VirtualEndpoint {
    /// Create the endpoint for `unique_name`, first seen over `link`.
    ///
    /// The discovering link becomes the sole session-0 route. No session
    /// reference is taken for it.
    pub fn new(unique_name: impl Into<String>, link: LinkHandle) -> Self {
        let unique_name = unique_name.into();
        let short_guid = short_guid_of(&unique_name).to_string();
        debug!(peer = %unique_name, link = %link.id(), "virtual endpoint created");
        let mut table = RouteTable::new();
        table.insert(NO_SESSION, link);
        Self {
            unique_name,
            short_guid,
            inner: Mutex::new(Inner {
                table,
                state: EndpointState::Active,
                has_session_refs: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    /// Short GUID of the router that owns this peer.
    pub fn short_guid(&self) -> &str {
        &self.short_guid
    }

    pub fn state(&self) -> EndpointState {
        self.lock().state
    }

    /// Whether a session-bound entry was ever added.
    pub fn has_session_refs(&self) -> bool {
        self.lock().has_session_refs
    }

    /// Candidate links for `session_id`, in the order they should be tried.
    fn candidates(&self, session_id: SessionId) -> Vec<LinkHandle> {
        let inner = self.lock();
        if session_id == NO_SESSION {
            inner
                .table
                .find_preferred(&self.short_guid)
                .cloned()
                .collect()
        } else {
            inner.table.find(session_id).cloned().collect()
        }
    }

    /// Deliver `message` over the first candidate link that accepts it.
    ///
    /// Returns the id of the link that carried the message. Earlier failed
    /// candidates are not reported; when every candidate fails, or there is
    /// none, the result is [`Error::NoRoute`].
    pub async fn route(&self, message: &Message, session_id: SessionId) -> Result<LinkId> {
        let candidates = self.candidates(session_id);

        #[cfg(feature = "metrics")]
        histogram!(routing_metrics::CANDIDATES).record(candidates.len() as f64);

        trace!(
            peer = %self.unique_name,
            session_id,
            serial = message.serial(),
            candidates = candidates.len(),
            "routing message"
        );

        for (attempt, link) in candidates.iter().enumerate() {
            match link.send(message).await {
                Ok(()) => {
                    trace!(peer = %self.unique_name, session_id, link = %link.id(), attempt, "message routed");
                    #[cfg(feature = "metrics")]
                    {
                        let bucket = if session_id == NO_SESSION { "any" } else { "session" };
                        counter!(routing_metrics::MESSAGES_ROUTED_TOTAL, labels::BUCKET => bucket)
                            .increment(1);
                        if attempt > 0 {
                            counter!(routing_metrics::FALLTHROUGH_TOTAL).increment(1);
                        }
                    }
                    return Ok(link.id());
                },
                Err(e) => {
                    debug!(
                        peer = %self.unique_name,
                        session_id,
                        link = %link.id(),
                        error = %e,
                        "send failed, trying next candidate"
                    );
                    #[cfg(feature = "metrics")]
                    counter!(routing_metrics::SEND_FAILURES_TOTAL).increment(1);
                },
            }
        }

        #[cfg(feature = "metrics")]
        counter!(routing_metrics::NO_ROUTE_TOTAL).increment(1);

        Err(Error::no_route(&self.unique_name, session_id))
    }

    /// Add `link` as a session-0 route.
    ///
    /// Returns `Ok(false)` when the link already was one. Adding to a
    /// stopping endpoint is a caller bug and fails without touching the table.
    pub fn add_link(&self, link: LinkHandle) -> Result<bool> {
        let mut inner = self.lock();
        if inner.state == EndpointState::Stopping {
            error!(peer = %self.unique_name, link = %link.id(), "add_link on a stopping endpoint");
            return Err(Error::precondition(format!(
                "add_link({}) on stopping endpoint {}",
                link.id(),
                self.unique_name
            )));
        }
        if inner.table.contains(NO_SESSION, link.id()) {
            return Ok(false);
        }
        debug!(peer = %self.unique_name, link = %link.id(), remote = %link.remote_guid(), "route added");
        inner.table.insert(NO_SESSION, link);
        Ok(true)
    }

    /// Pin `session_id` to `link`, taking one session reference on it.
    ///
    /// `link` must already be a session-0 route of this endpoint. Binding a
    /// session to the link it is already bound to is a no-op. Binding it to a
    /// different link follows `policy`.
    pub fn bind_session(
        &self,
        session_id: SessionId,
        link: &LinkHandle,
        policy: RebindPolicy,
    ) -> Result<()> {
        if session_id == NO_SESSION {
            return Err(Error::invalid_session(session_id, "cannot bind the reserved session"));
        }

        let mut inner = self.lock();
        if !inner.table.contains(NO_SESSION, link.id()) {
            debug!(peer = %self.unique_name, session_id, link = %link.id(), "bind refused, link is not a route");
            #[cfg(feature = "metrics")]
            counter!(routing_metrics::BIND_REJECTED_TOTAL, labels::REASON => "unknown_link")
                .increment(1);
            return Err(Error::no_route(&self.unique_name, session_id));
        }

        let bound = inner.table.find(session_id).next().cloned();
        if let Some(current) = bound {
            if current.id() == link.id() {
                return Ok(());
            }
            match policy {
                RebindPolicy::Reject => {
                    debug!(peer = %self.unique_name, session_id, bound = %current.id(), "rebind rejected");
                    #[cfg(feature = "metrics")]
                    counter!(routing_metrics::BIND_REJECTED_TOTAL, labels::REASON => "already_bound")
                        .increment(1);
                    return Err(Error::SessionAlreadyBound {
                        session_id,
                        link: current.id(),
                    });
                },
                RebindPolicy::Replace => {
                    if let Some(old) = inner.table.remove_first(session_id) {
                        old.decrement_ref();
                        debug!(peer = %self.unique_name, session_id, link = %old.id(), "session released for rebind");
                        #[cfg(feature = "metrics")]
                        gauge!(routing_metrics::SESSIONS_BOUND).decrement(1.0);
                    }
                },
            }
        }

        link.increment_ref();
        inner.table.insert(session_id, link.clone());
        inner.has_session_refs = true;
        debug!(peer = %self.unique_name, session_id, link = %link.id(), refs = link.ref_count(), "session bound");
        #[cfg(feature = "metrics")]
        gauge!(routing_metrics::SESSIONS_BOUND).increment(1.0);
        Ok(())
    }

    /// Release the binding of `session_id`.
    ///
    /// Returns whether a binding was removed. A missing binding is logged and
    /// ignored; link loss may have cleared it already.
    pub fn unbind_session(&self, session_id: SessionId) -> Result<bool> {
        if session_id == NO_SESSION {
            return Err(Error::invalid_session(session_id, "cannot unbind the reserved session"));
        }

        let mut inner = self.lock();
        match inner.table.remove_first(session_id) {
            Some(link) => {
                link.decrement_ref();
                debug!(peer = %self.unique_name, session_id, link = %link.id(), refs = link.ref_count(), "session unbound");
                #[cfg(feature = "metrics")]
                gauge!(routing_metrics::SESSIONS_BOUND).decrement(1.0);
                Ok(true)
            },
            None => {
                warn!(
                    peer = %self.unique_name,
                    session_id,
                    error = %Error::unknown_binding(format!("session {session_id}")),
                    "unbind ignored"
                );
                Ok(false)
            },
        }
    }

    /// Drop every entry naming `link`, releasing the session references they
    /// held.
    ///
    /// Returns whether the endpoint is now empty: no session entry is left
    /// and no remaining link leads directly to the peer's own router. An
    /// empty endpoint moves to [`EndpointState::Stopping`].
    pub fn remove_link(&self, link: LinkId) -> bool {
        let mut inner = self.lock();
        let removed = inner.table.remove_all_for(link);
        for (session_id, handle) in &removed {
            if *session_id != NO_SESSION {
                handle.decrement_ref();
                #[cfg(feature = "metrics")]
                gauge!(routing_metrics::SESSIONS_BOUND).decrement(1.0);
            }
        }

        let mut empty = inner.table.is_empty();
        if empty
            && inner
                .table
                .find(NO_SESSION)
                .any(|l| l.remote_short_guid() == self.short_guid)
        {
            empty = false;
        }

        debug!(
            peer = %self.unique_name,
            link = %link,
            removed = removed.len(),
            empty,
            "route removed"
        );

        if empty && inner.state == EndpointState::Active {
            inner.state = EndpointState::Stopping;
            debug!(peer = %self.unique_name, "virtual endpoint stopping");
        }
        empty
    }

    /// First link bound to `session_id` and the number of links bound to it.
    pub fn link_count(&self, session_id: SessionId) -> (Option<LinkHandle>, usize) {
        let inner = self.lock();
        let first = inner.table.find(session_id).next().cloned();
        (first, inner.table.find(session_id).count())
    }

    /// Copy of every `(session id, link)` entry.
    pub fn all_bindings(&self) -> Vec<(SessionId, LinkHandle)> {
        self.lock()
            .table
            .iter()
            .map(|(s, l)| (s, l.clone()))
            .collect()
    }

    /// Non-zero session ids bound to `link`.
    pub fn sessions_bound_to(&self, link: LinkId) -> BTreeSet<SessionId> {
        let mut sessions = self.lock().table.sessions_for(link);
        sessions.remove(&NO_SESSION);
        sessions
    }

    /// Whether `link` is a session-0 route of this endpoint.
    pub fn is_reachable_via(&self, link: LinkId) -> bool {
        self.lock().table.contains(NO_SESSION, link)
    }

    /// Whether some remaining link leads to a router other than `guid`.
    pub fn can_reach_without(&self, guid: &Guid) -> bool {
        self.lock()
            .table
            .iter()
            .any(|(_, l)| l.remote_guid() != guid)
    }

    pub fn is_in_session(&self, session_id: SessionId) -> bool {
        self.lock().table.find(session_id).next().is_some()
    }

    /// Whether any entry still names `link`.
    pub fn references(&self, link: LinkId) -> bool {
        self.lock().table.names(link)
    }
}

impl fmt::Debug for VirtualEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("VirtualEndpoint")
            .field("unique_name", &self.unique_name)
            .field("state", &inner.state)
            .field("entries", &inner.table.len())
            .finish()
    }
}
