//! Bus-to-bus links and the shared handle the route tables hold.

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use {
    async_trait::async_trait,
    hopbus_common::{Guid, Message},
    tracing::warn,
};

use crate::{Error, Result};

/// A physical connection to another router.
///
/// Implementations own the transport. A send on a transport that has gone
/// away must return an error, never hang forever; the router falls through
/// to the next candidate link.
#[async_trait]
pub trait Link: Send + Sync {
    /// Human-readable name of the link (usually the local endpoint name).
    fn name(&self) -> &str;

    /// GUID of the router on the other end.
    fn remote_guid(&self) -> &Guid;

    /// Hand a message in final wire form to the transport.
    async fn send(&self, message: &Message) -> Result<()>;
}

/// Stable identifier assigned by the [`crate::LinkRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LinkId(pub u64);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b2b#{}", self.0)
    }
}

struct Slot {
    id: LinkId,
    link: Arc<dyn Link>,
    refs: AtomicUsize,
    alive: AtomicBool,
}

/// Shared handle to a registered link.
///
/// Cloning the handle is cheap. Equality and hashing use the [`LinkId`] only.
/// The session reference count tracks how many session-bound route entries
/// name this link; it is only changed by the virtual endpoint that owns the
/// entry, while that endpoint's table lock is held.
#[derive(Clone)]
pub struct LinkHandle {
    slot: Arc<Slot>,
}

impl LinkHandle {
    pub(crate) fn new(id: LinkId, link: Arc<dyn Link>) -> Self {
        Self {
            slot: Arc::new(Slot {
                id,
                link,
                refs: AtomicUsize::new(0),
                alive: AtomicBool::new(true),
            }),
        }
    }

    #[must_use]
    pub fn id(&self) -> LinkId {
        self.slot.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.slot.link.name()
    }

    #[must_use]
    pub fn remote_guid(&self) -> &Guid {
        self.slot.link.remote_guid()
    }

    /// Short form of the remote GUID, as embedded in unique names.
    #[must_use]
    pub fn remote_short_guid(&self) -> &str {
        self.remote_guid().short()
    }

    #[must_use]
    pub fn ref_count(&self) -> usize {
        self.slot.refs.load(Ordering::Acquire)
    }

    pub(crate) fn increment_ref(&self) -> usize {
        self.slot.refs.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Saturating decrement. An underflow means a pairing bug somewhere; it
    /// is logged and the count stays at zero.
    pub(crate) fn decrement_ref(&self) -> usize {
        match self
            .slot
            .refs
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(prev) => prev - 1,
            Err(_) => {
                warn!(link = %self.id(), "session reference count underflow ignored");
                0
            },
        }
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.slot.alive.load(Ordering::Acquire)
    }

    /// Flag the link as lost. Returns `false` if it already was.
    pub(crate) fn mark_lost(&self) -> bool {
        self.slot.alive.swap(false, Ordering::AcqRel)
    }

    /// Send through the underlying transport unless the link was lost.
    pub async fn send(&self, message: &Message) -> Result<()> {
        if !self.is_alive() {
            return Err(Error::LinkClosed { link: self.id() });
        }
        self.slot.link.send(message).await
    }
}

impl PartialEq for LinkHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for LinkHandle {}

impl Hash for LinkHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Debug for LinkHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LinkHandle")
            .field("id", &self.id())
            .field("name", &self.name())
            .field("remote_guid", self.remote_guid())
            .field("refs", &self.ref_count())
            .field("alive", &self.is_alive())
            .finish()
    }
}
