//! Arena of live and lost links, indexed by a stable [`LinkId`].

use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
};

use tracing::{debug, info};

use crate::{
    Error, Result,
    link::{Link, LinkHandle, LinkId},
};

/// Owns every link handle the router knows about.
///
/// Route tables hold clones of the handles; the arena keeps the canonical one
/// until [`LinkRegistry::reap`] decides the link is gone for good.
pub struct LinkRegistry {
    links: Mutex<BTreeMap<LinkId, LinkHandle>>,
    next_id: AtomicU64,
}

impl Default for LinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkRegistry {
    pub fn new() -> Self {
        Self {
            links: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a freshly connected link and return its handle.
    pub fn register(&self, link: Arc<dyn Link>) -> LinkHandle {
        let id = LinkId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = LinkHandle::new(id, link);
        debug!(link = %id, name = handle.name(), remote = %handle.remote_guid(), "link registered");
        self.links
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, handle.clone());
        handle
    }

    pub fn get(&self, id: LinkId) -> Result<LinkHandle> {
        self.links
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::unknown_binding(format!("link {id}")))
    }

    /// Flag a link as lost. Returns the handle so the caller can strip it
    /// from route tables.
    pub fn mark_lost(&self, id: LinkId) -> Result<LinkHandle> {
        let handle = self.get(id)?;
        if handle.mark_lost() {
            info!(link = %id, remote = %handle.remote_guid(), "link lost");
        }
        Ok(handle)
    }

    /// Destroy lost links that hold no session references and that no route
    /// table names any more (`is_referenced` answers the latter).
    pub fn reap(&self, is_referenced: impl Fn(&LinkHandle) -> bool) -> Vec<LinkId> {
        let mut links = self.links.lock().unwrap_or_else(|e| e.into_inner());
        let dead: Vec<LinkId> = links
            .values()
            .filter(|h| !h.is_alive() && h.ref_count() == 0 && !is_referenced(h))
            .map(LinkHandle::id)
            .collect();
        for id in &dead {
            links.remove(id);
            debug!(link = %id, "link reaped");
        }
        dead
    }

    pub fn len(&self) -> usize {
        self.links.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<LinkId> {
        self.links
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect()
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::memory::MemoryLink};

    fn mem(guid: &str) -> Arc<dyn Link> {
        Arc::new(MemoryLink::new(guid.parse().unwrap()))
    }

    #[test]
    fn ids_are_monotonic() {
        let reg = LinkRegistry::new();
        let a = reg.register(mem("aaaa"));
        let b = reg.register(mem("bbbb"));
        assert!(b.id() > a.id());
        assert_eq!(reg.ids(), vec![a.id(), b.id()]);
        assert_eq!(reg.get(a.id()).unwrap(), a);
    }

    #[test]
    fn unknown_id_is_unknown_binding() {
        let reg = LinkRegistry::new();
        assert!(matches!(
            reg.get(LinkId(42)),
            Err(Error::UnknownBinding { .. })
        ));
        assert!(reg.mark_lost(LinkId(42)).is_err());
    }

    #[test]
    fn reap_only_takes_dead_unreferenced_links() {
        let reg = LinkRegistry::new();
        let live = reg.register(mem("aaaa"));
        let held = reg.register(mem("bbbb"));
        let named = reg.register(mem("cccc"));
        let gone = reg.register(mem("dddd"));

        held.increment_ref();
        for h in [&held, &named, &gone] {
            reg.mark_lost(h.id()).unwrap();
        }

        let reaped = reg.reap(|h| h.id() == named.id());
        assert_eq!(reaped, vec![gone.id()]);
        assert_eq!(reg.len(), 3);
        assert!(reg.get(live.id()).is_ok());

        held.decrement_ref();
        let reaped = reg.reap(|_| false);
        assert_eq!(reaped, vec![held.id(), named.id()]);
        assert_eq!(reg.ids(), vec![live.id()]);
    }
}
