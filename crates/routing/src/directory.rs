//! Process-wide directory of virtual endpoints and the links behind them.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex, MutexGuard},
};

use {
    hopbus_common::{Guid, Message, SessionId},
    hopbus_config::RouterConfig,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use hopbus_metrics::{counter, directory as directory_metrics, gauge};

use crate::{
    Error, Result,
    endpoint::{EndpointState, VirtualEndpoint},
    link::{Link, LinkHandle, LinkId},
    registry::LinkRegistry,
};

/// Maps unique names to virtual endpoints and owns the link arena.
///
/// Endpoints are created when a link reports a peer for the first time and
/// deregistered once they report empty after a link loss.
pub struct EndpointDirectory {
    config: RouterConfig,
    links: LinkRegistry,
    endpoints: Mutex<BTreeMap<String, Arc<VirtualEndpoint>>>,
}

impl Default for EndpointDirectory {
    fn default() -> Self {
        Self::new(RouterConfig::default())
    }
}

impl EndpointDirectory {
    pub fn new(config: RouterConfig) -> Self {
        Self {
            config,
            links: LinkRegistry::new(),
            endpoints: Mutex::new(BTreeMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Arc<VirtualEndpoint>>> {
        self.endpoints.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn links(&self) -> &LinkRegistry {
        &self.links
    }

    /// Register a newly connected link.
    pub fn add_link(&self, link: Arc<dyn Link>) -> LinkHandle {
        let handle = self.links.register(link);
        #[cfg(feature = "metrics")]
        gauge!(directory_metrics::LINKS_REGISTERED).set(self.links.len() as f64);
        handle
    }

    pub fn link(&self, id: LinkId) -> Result<LinkHandle> {
        self.links.get(id)
    }

    /// A link reported `unique_name` as reachable through it.
    ///
    /// Creates the endpoint on first sight. An endpoint already stopping is
    /// replaced by a fresh one rather than revived.
    pub fn peer_seen(&self, unique_name: &str, link: LinkId) -> Result<Arc<VirtualEndpoint>> {
        // `link_lost` marks links under this same lock.
        let mut endpoints = self.lock();
        let handle = self.links.get(link)?;
        if !handle.is_alive() {
            return Err(Error::LinkClosed { link });
        }

        if let Some(existing) = endpoints.get(unique_name).cloned()
            && existing.state() == EndpointState::Active
        {
            match existing.add_link(handle.clone()) {
                Ok(added) => {
                    if added {
                        debug!(peer = unique_name, link = %link, "redundant path discovered");
                    }
                    return Ok(existing);
                },
                Err(Error::PreconditionViolation { .. }) => {
                    debug!(peer = unique_name, "endpoint began stopping, replacing it");
                },
                Err(e) => return Err(e),
            }
        }

        let endpoint = Arc::new(VirtualEndpoint::new(unique_name, handle));
        if endpoints
            .insert(unique_name.to_string(), endpoint.clone())
            .is_some()
        {
            debug!(peer = unique_name, "replaced stopping endpoint");
        }
        info!(peer = unique_name, link = %link, "peer reachable");
        #[cfg(feature = "metrics")]
        gauge!(directory_metrics::ENDPOINTS_ACTIVE).set(endpoints.len() as f64);
        Ok(endpoint)
    }

    pub fn find(&self, unique_name: &str) -> Option<Arc<VirtualEndpoint>> {
        self.lock().get(unique_name).cloned()
    }

    /// Snapshot of all endpoints, ordered by unique name.
    pub fn endpoints(&self) -> Vec<Arc<VirtualEndpoint>> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Route `message` to `destination` using the message's session id.
    pub async fn route(&self, destination: &str, message: &Message) -> Result<LinkId> {
        let Some(endpoint) = self.find(destination) else {
            debug!(peer = destination, "no virtual endpoint for destination");
            return Err(Error::no_route(destination, message.session_id()));
        };
        endpoint.route(message, message.session_id()).await
    }

    pub fn bind_session(
        &self,
        destination: &str,
        session_id: SessionId,
        link: LinkId,
    ) -> Result<()> {
        let handle = self.links.get(link)?;
        let endpoint = self
            .find(destination)
            .ok_or_else(|| Error::no_route(destination, session_id))?;
        endpoint.bind_session(session_id, &handle, self.config.rebind_policy)
    }

    /// Release a session binding. An unknown destination is logged and
    /// ignored.
    pub fn unbind_session(&self, destination: &str, session_id: SessionId) -> Result<bool> {
        match self.find(destination) {
            Some(endpoint) => endpoint.unbind_session(session_id),
            None => {
                warn!(peer = destination, session_id, "unbind for unknown endpoint ignored");
                Ok(false)
            },
        }
    }

    /// The transport behind `link` went away.
    ///
    /// Strips the link from every endpoint routing through it and deregisters
    /// those left empty. Returns their unique names.
    pub fn link_lost(&self, link: LinkId) -> Vec<String> {
        let affected: Vec<Arc<VirtualEndpoint>> = {
            let endpoints = self.lock();
            if let Err(e) = self.links.mark_lost(link) {
                warn!(link = %link, error = %e, "loss reported for unknown link");
                return Vec::new();
            }
            endpoints.values().cloned().collect()
        };
        #[cfg(feature = "metrics")]
        counter!(directory_metrics::LINKS_LOST_TOTAL).increment(1);

        let mut torn_down = Vec::new();
        for endpoint in affected {
            if endpoint.references(link) && endpoint.remove_link(link) {
                self.deregister(&endpoint);
                torn_down.push(endpoint.unique_name().to_string());
            }
        }

        if self.config.reap_dead_links {
            self.reap_links();
        }
        torn_down
    }

    /// Bulk departure of the router identified by `guid`.
    ///
    /// Every endpoint that can only be reached through links to `guid` loses
    /// all its routes and is deregistered. Returns their unique names.
    pub fn purge_peer(&self, guid: &Guid) -> Vec<String> {
        let mut purged = Vec::new();
        for endpoint in self.endpoints() {
            if endpoint.can_reach_without(guid) {
                continue;
            }
            let ids: BTreeSet<LinkId> = endpoint
                .all_bindings()
                .into_iter()
                .map(|(_, l)| l.id())
                .collect();
            if self.strip_links(&endpoint, ids) {
                purged.push(endpoint.unique_name().to_string());
            }
        }
        if !purged.is_empty() {
            info!(guid = %guid, count = purged.len(), "peer router departed");
        }
        purged
    }

    /// Remove `ids` from `endpoint` and deregister it if that left it empty.
    ///
    /// A route added after `ids` was collected keeps the endpoint alive.
    fn strip_links(&self, endpoint: &Arc<VirtualEndpoint>, ids: BTreeSet<LinkId>) -> bool {
        let mut empty = false;
        for id in ids {
            empty = endpoint.remove_link(id);
        }
        if empty {
            self.deregister(endpoint);
        } else {
            debug!(peer = endpoint.unique_name(), "endpoint gained a route during purge");
        }
        empty
    }

    /// Destroy lost links nothing refers to any more.
    pub fn reap_links(&self) -> Vec<LinkId> {
        let endpoints = self.endpoints();
        let reaped = self
            .links
            .reap(|h| endpoints.iter().any(|ep| ep.references(h.id())));
        #[cfg(feature = "metrics")]
        {
            counter!(directory_metrics::LINKS_REAPED_TOTAL).increment(reaped.len() as u64);
            gauge!(directory_metrics::LINKS_REGISTERED).set(self.links.len() as f64);
        }
        reaped
    }

    fn deregister(&self, endpoint: &Arc<VirtualEndpoint>) {
        let mut endpoints = self.lock();
        let name = endpoint.unique_name();
        if endpoints
            .get(name)
            .is_some_and(|current| Arc::ptr_eq(current, endpoint))
        {
            endpoints.remove(name);
            info!(peer = name, "virtual endpoint torn down");
            #[cfg(feature = "metrics")]
            {
                counter!(directory_metrics::ENDPOINTS_TORN_DOWN_TOTAL).increment(1);
                gauge!(directory_metrics::ENDPOINTS_ACTIVE).set(endpoints.len() as f64);
            }
        }
    }
}
