//! In-memory link for tests and `hopbus simulate`.

use std::sync::{
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use {
    async_trait::async_trait,
    hopbus_common::{Guid, Message},
    tracing::trace,
};

use crate::{Error, Result, link::Link};

/// Link that records what it was asked to deliver. No transport behind it.
pub struct MemoryLink {
    name: String,
    remote: Guid,
    sent: Mutex<Vec<Message>>,
    failing: AtomicBool,
    attempts: AtomicUsize,
}

impl MemoryLink {
    pub fn new(remote: Guid) -> Self {
        let name = format!("mem:{}", remote.short());
        Self::named(name, remote)
    }

    pub fn named(name: impl Into<String>, remote: Guid) -> Self {
        Self {
            name: name.into(),
            remote,
            sent: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
        }
    }

    /// Make every following send fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    /// Number of sends attempted, failed ones included.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Acquire)
    }

    /// Messages delivered so far.
    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn take_sent(&self) -> Vec<Message> {
        std::mem::take(&mut *self.sent.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

#[async_trait]
impl Link for MemoryLink {
    fn name(&self) -> &str {
        &self.name
    }

    fn remote_guid(&self) -> &Guid {
        &self.remote
    }

    async fn send(&self, message: &Message) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::AcqRel);
        if self.failing.load(Ordering::Acquire) {
            return Err(Error::send(
                self.name.clone(),
                std::io::Error::new(std::io::ErrorKind::BrokenPipe, "memory link is failing"),
            ));
        }
        trace!(link = %self.name, serial = message.serial(), "memory link delivered");
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.clone());
        Ok(())
    }
}
