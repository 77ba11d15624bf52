//! Session-id to link multimap backing one virtual endpoint.

use std::collections::{BTreeMap, BTreeSet};

use hopbus_common::{NO_SESSION, SessionId};

use crate::link::{LinkHandle, LinkId};

/// Multimap from session id to the links bound under it.
///
/// Buckets keep insertion order. The table does no locking of its own; the
/// owning [`crate::VirtualEndpoint`] wraps it in a mutex and never holds that
/// mutex across a send.
#[derive(Debug, Default, Clone)]
pub struct RouteTable {
    buckets: BTreeMap<SessionId, Vec<LinkHandle>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unconditional append.
    pub fn insert(&mut self, session_id: SessionId, link: LinkHandle) {
        self.buckets.entry(session_id).or_default().push(link);
    }

    /// Links bound to exactly `session_id`, in insertion order.
    pub fn find(&self, session_id: SessionId) -> impl Iterator<Item = &LinkHandle> + '_ {
        self.buckets
            .get(&session_id)
            .map(|bucket| bucket.iter())
            .into_iter()
            .flatten()
    }

    /// The session-0 bucket, direct links first.
    ///
    /// A link is direct when the short GUID of its remote router equals
    /// `peer_short_guid`. Insertion order breaks ties inside each group.
    pub fn find_preferred<'a>(
        &'a self,
        peer_short_guid: &'a str,
    ) -> impl Iterator<Item = &'a LinkHandle> + 'a {
        let direct = self
            .find(NO_SESSION)
            .filter(move |l| l.remote_short_guid() == peer_short_guid);
        let indirect = self
            .find(NO_SESSION)
            .filter(move |l| l.remote_short_guid() != peer_short_guid);
        direct.chain(indirect)
    }

    pub fn contains(&self, session_id: SessionId, link: LinkId) -> bool {
        self.find(session_id).any(|l| l.id() == link)
    }

    /// Remove every entry naming `link` and hand them back so the caller can
    /// release the session references they held.
    pub fn remove_all_for(&mut self, link: LinkId) -> Vec<(SessionId, LinkHandle)> {
        let mut removed = Vec::new();
        self.buckets.retain(|&session_id, bucket| {
            bucket.retain(|l| {
                if l.id() == link {
                    removed.push((session_id, l.clone()));
                    false
                } else {
                    true
                }
            });
            !bucket.is_empty()
        });
        removed
    }

    /// Remove the first entry bound to `session_id`.
    pub fn remove_first(&mut self, session_id: SessionId) -> Option<LinkHandle> {
        let bucket = self.buckets.get_mut(&session_id)?;
        let link = (!bucket.is_empty()).then(|| bucket.remove(0));
        if bucket.is_empty() {
            self.buckets.remove(&session_id);
        }
        link
    }

    /// True iff no entry carries a non-zero session id.
    pub fn is_empty(&self) -> bool {
        self.buckets.keys().all(|&s| s == NO_SESSION)
    }

    /// Number of entries, session-0 ones included.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    /// Number of non-zero session entries.
    pub fn session_entries(&self) -> usize {
        self.buckets
            .iter()
            .filter(|(s, _)| **s != NO_SESSION)
            .map(|(_, b)| b.len())
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SessionId, &LinkHandle)> + '_ {
        self.buckets
            .iter()
            .flat_map(|(&s, bucket)| bucket.iter().map(move |l| (s, l)))
    }

    pub fn sessions_for(&self, link: LinkId) -> BTreeSet<SessionId> {
        self.iter()
            .filter(|(_, l)| l.id() == link)
            .map(|(s, _)| s)
            .collect()
    }

    /// Whether `link` appears under any session id.
    pub fn names(&self, link: LinkId) -> bool {
        self.iter().any(|(_, l)| l.id() == link)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::memory::MemoryLink,
        std::sync::Arc,
    };

    fn link(id: u64, guid: &str) -> LinkHandle {
        LinkHandle::new(LinkId(id), Arc::new(MemoryLink::new(guid.parse().unwrap())))
    }

    fn ids<'a>(it: impl Iterator<Item = &'a LinkHandle>) -> Vec<u64> {
        it.map(|l| l.id().0).collect()
    }

    #[test]
    fn find_keeps_insertion_order() {
        let mut t = RouteTable::new();
        t.insert(3, link(2, "bbbb"));
        t.insert(3, link(1, "aaaa"));
        t.insert(4, link(3, "cccc"));
        assert_eq!(ids(t.find(3)), vec![2, 1]);
        assert_eq!(ids(t.find(9)), Vec::<u64>::new());
    }

    #[test]
    fn preferred_puts_direct_links_first() {
        let mut t = RouteTable::new();
        t.insert(0, link(1, "other001"));
        t.insert(0, link(2, "guid123"));
        t.insert(0, link(3, "other002"));
        t.insert(0, link(4, "guid123"));
        assert_eq!(ids(t.find_preferred("guid123")), vec![2, 4, 1, 3]);
        assert_eq!(ids(t.find_preferred("nobody")), vec![1, 2, 3, 4]);
    }

    #[test]
    fn emptiness_ignores_session_zero() {
        let mut t = RouteTable::new();
        assert!(t.is_empty());
        t.insert(0, link(1, "aaaa"));
        assert!(t.is_empty());
        t.insert(5, link(1, "aaaa"));
        assert!(!t.is_empty());
        assert_eq!(t.session_entries(), 1);
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn remove_all_for_returns_every_entry() {
        let mut t = RouteTable::new();
        let a = link(1, "aaaa");
        let b = link(2, "bbbb");
        t.insert(0, a.clone());
        t.insert(0, b.clone());
        t.insert(5, a.clone());
        t.insert(6, a.clone());
        t.insert(6, b.clone());

        let removed: Vec<_> = t
            .remove_all_for(a.id())
            .into_iter()
            .map(|(s, l)| (s, l.id().0))
            .collect();
        assert_eq!(removed, vec![(0, 1), (5, 1), (6, 1)]);
        assert!(!t.names(a.id()));
        assert_eq!(t.sessions_for(b.id()), BTreeSet::from([0, 6]));
        assert!(t.remove_all_for(a.id()).is_empty());
    }

    #[test]
    fn remove_first_drops_empty_bucket() {
        let mut t = RouteTable::new();
        t.insert(7, link(1, "aaaa"));
        assert_eq!(t.remove_first(7).map(|l| l.id().0), Some(1));
        assert!(t.remove_first(7).is_none());
        assert!(t.is_empty());
        assert_eq!(t.len(), 0);
    }
}
