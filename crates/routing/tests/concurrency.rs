#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Refcount pairing under concurrent bind/unbind/remove/route.
use std::sync::Arc;

use {
    futures::future::join_all,
    hopbus_common::{Message, SessionId},
    hopbus_config::RebindPolicy,
    hopbus_routing::{EndpointState, Error, LinkHandle, LinkRegistry, MemoryLink, VirtualEndpoint},
};

const SESSIONS: SessionId = 64;

fn setup() -> (LinkRegistry, Arc<VirtualEndpoint>, LinkHandle, LinkHandle) {
    let registry = LinkRegistry::new();
    let direct = registry.register(Arc::new(MemoryLink::new("guid123".parse().unwrap())));
    let relay = registry.register(Arc::new(MemoryLink::new("relay001".parse().unwrap())));
    let vep = Arc::new(VirtualEndpoint::new(":guid123.1", direct.clone()));
    vep.add_link(relay.clone()).unwrap();
    (registry, vep, direct, relay)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bind_unbind_race_leaves_no_references() {
    let (_registry, vep, direct, relay) = setup();

    let tasks = (1..=SESSIONS).map(|session_id| {
        let vep = vep.clone();
        let link = if session_id % 2 == 0 {
            direct.clone()
        } else {
            relay.clone()
        };
        tokio::spawn(async move {
            vep.bind_session(session_id, &link, RebindPolicy::Replace)
                .unwrap();
            tokio::task::yield_now().await;
            // Two concurrent unbinds: exactly one may win.
            let other = vep.clone();
            let (a, b) = tokio::join!(
                tokio::spawn(async move { vep.unbind_session(session_id).unwrap() }),
                tokio::spawn(async move { other.unbind_session(session_id).unwrap() }),
            );
            u32::from(a.unwrap()) + u32::from(b.unwrap())
        })
    });

    let winners: Vec<u32> = join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();
    assert!(winners.iter().all(|&w| w == 1));
    assert_eq!(direct.ref_count(), 0);
    assert_eq!(relay.ref_count(), 0);
    assert_eq!(vep.link_count(0).1, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn remove_link_racing_unbind_never_double_decrements() {
    let (_registry, vep, direct, relay) = setup();
    for session_id in 1..=SESSIONS {
        vep.bind_session(session_id, &relay, RebindPolicy::Replace)
            .unwrap();
    }
    assert_eq!(relay.ref_count(), SESSIONS as usize);

    let unbinders = (1..=SESSIONS).map(|session_id| {
        let vep = vep.clone();
        tokio::spawn(async move { vep.unbind_session(session_id).unwrap() })
    });
    let remover = {
        let vep = vep.clone();
        let id = relay.id();
        tokio::spawn(async move {
            let first = vep.remove_link(id);
            let second = vep.remove_link(id);
            (first, second)
        })
    };

    let (unbound, removal) = tokio::join!(join_all(unbinders), remover);
    let (first, second) = removal.unwrap();
    assert!(!first && !second, "direct link keeps the endpoint alive");
    assert_eq!(unbound.len(), SESSIONS as usize);
    assert_eq!(relay.ref_count(), 0);
    assert_eq!(direct.ref_count(), 0);
    assert!(!vep.references(relay.id()));
    assert_eq!(vep.state(), EndpointState::Active);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn routing_during_teardown_fails_cleanly() {
    let (registry, vep, direct, relay) = setup();
    vep.bind_session(9, &direct, RebindPolicy::Replace).unwrap();

    let senders = (0..32u32).map(|serial| {
        let vep = vep.clone();
        tokio::spawn(async move {
            let msg = Message::new(":guid123.1", 9, serial, b"h", b"b");
            vep.route(&msg, 9).await
        })
    });
    let teardown = {
        let vep = vep.clone();
        let direct = direct.clone();
        let relay = relay.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            let a = vep.remove_link(relay.id());
            let b = vep.remove_link(direct.id());
            (a, b)
        })
    };

    let (results, flags) = tokio::join!(join_all(senders), teardown);
    assert_eq!(flags.unwrap(), (false, true));
    for result in results {
        match result.unwrap() {
            Ok(link) => assert_eq!(link, direct.id()),
            Err(e) => assert!(matches!(e, Error::NoRoute { session_id: 9, .. })),
        }
    }
    assert_eq!(direct.ref_count(), 0);
    assert_eq!(vep.state(), EndpointState::Stopping);

    registry.mark_lost(direct.id()).unwrap();
    registry.mark_lost(relay.id()).unwrap();
    let reaped = registry.reap(|h| vep.references(h.id()));
    assert_eq!(reaped.len(), 2);
    assert!(registry.is_empty());
}
