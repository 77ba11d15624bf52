//! `hopbus simulate`: drive the routing core through an in-memory triangle.
//!
//! This router (`local`) has a direct link to `peer` and a link to `relay`,
//! which can also forward to `peer`. Each scenario builds a fresh topology,
//! checks every routing decision and logs it.

use std::sync::Arc;

use {
    anyhow::{Result, ensure},
    clap::Args,
    hopbus_common::{Guid, Message, SessionId},
    hopbus_config::{HopbusConfig, SECURITY_KEY_LEN},
    hopbus_crypto::{MessageEncryptor, SealingLink, XChaCha20MessageEncryptor},
    hopbus_metrics::{MetricsRecorderConfig, init_metrics},
    hopbus_routing::{EndpointDirectory, EndpointState, Link, LinkId, MemoryLink},
    rand::RngCore,
    tracing::{Instrument, info, info_span, warn},
};

#[derive(Args)]
pub struct SimulateArgs {
    /// Seal messages with a throwaway key when `[security]` is disabled.
    #[arg(long)]
    seal: bool,
}

const HEADER: &[u8] = b"HDR";

pub async fn handle_simulate(args: SimulateArgs, config: &HopbusConfig) -> Result<()> {
    let metrics = init_metrics(MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        global_labels: config
            .metrics
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
    })?;

    let sim = Simulation::new(config, args.seal)?;
    info!(
        local = %sim.local,
        peer = %sim.peer,
        relay = %sim.relay,
        sealed = sim.encryptor.is_some(),
        policy = %config.router.rebind_policy,
        "simulating triangle topology"
    );

    sim.end_to_end()
        .instrument(info_span!("scenario", scenario = "end_to_end"))
        .await?;
    sim.triangular_teardown()
        .instrument(info_span!("scenario", scenario = "triangular"))
        .await?;
    sim.peer_departure()
        .instrument(info_span!("scenario", scenario = "peer_departure"))
        .await?;
    eprintln!("All routing scenarios passed.");

    let rendered = metrics.render();
    if !rendered.is_empty() {
        print!("{rendered}");
    }
    Ok(())
}

fn random_guid() -> Result<Guid> {
    let mut rng = rand::rng();
    Ok(format!("{:016x}{:016x}", rng.next_u64(), rng.next_u64()).parse()?)
}

/// Fixed identities and the settings every scenario starts from.
struct Simulation {
    config: HopbusConfig,
    encryptor: Option<Arc<dyn MessageEncryptor>>,
    local: Guid,
    peer: Guid,
    relay: Guid,
}

/// One freshly built topology.
struct Topology {
    directory: EndpointDirectory,
    to_peer: Arc<MemoryLink>,
    to_relay: Arc<MemoryLink>,
    to_peer_id: LinkId,
    to_relay_id: LinkId,
}

impl Simulation {
    fn new(config: &HopbusConfig, seal: bool) -> Result<Self> {
        let local = match config.router.local_guid.as_deref() {
            Some(raw) => raw.parse()?,
            None => random_guid()?,
        };
        let peer = random_guid()?;
        let relay = loop {
            let candidate = random_guid()?;
            if candidate.short() != peer.short() {
                break candidate;
            }
        };
        Ok(Self {
            config: config.clone(),
            encryptor: Self::encryptor(config, seal)?,
            local,
            peer,
            relay,
        })
    }

    fn encryptor(config: &HopbusConfig, seal: bool) -> Result<Option<Arc<dyn MessageEncryptor>>> {
        if let Some(encryptor) = XChaCha20MessageEncryptor::from_config(&config.security)? {
            return Ok(Some(Arc::new(encryptor)));
        }
        if !seal {
            return Ok(None);
        }
        warn!("sealing with a throwaway key");
        let mut key = [0u8; SECURITY_KEY_LEN];
        rand::rng().fill_bytes(&mut key);
        Ok(Some(Arc::new(XChaCha20MessageEncryptor::new(key))))
    }

    fn peer_app(&self) -> String {
        format!(":{}.2", self.peer.short())
    }

    fn relay_app(&self) -> String {
        format!(":{}.5", self.relay.short())
    }

    fn wrap(&self, link: &Arc<MemoryLink>) -> Arc<dyn Link> {
        match &self.encryptor {
            Some(encryptor) => Arc::new(SealingLink::new(link.clone(), encryptor.clone())),
            None => link.clone(),
        }
    }

    fn topology(&self) -> Topology {
        let directory = EndpointDirectory::new(self.config.router.clone());
        let to_peer = Arc::new(MemoryLink::named(
            format!("{}->{}", self.local.short(), self.peer.short()),
            self.peer.clone(),
        ));
        let to_relay = Arc::new(MemoryLink::named(
            format!("{}->{}", self.local.short(), self.relay.short()),
            self.relay.clone(),
        ));
        let to_peer_id = directory.add_link(self.wrap(&to_peer)).id();
        let to_relay_id = directory.add_link(self.wrap(&to_relay)).id();
        Topology {
            directory,
            to_peer,
            to_relay,
            to_peer_id,
            to_relay_id,
        }
    }

    fn message(&self, destination: &str, session_id: SessionId, serial: u32) -> Message {
        Message::new(destination, session_id, serial, HEADER, b"ping")
    }

    /// Bind, route, unbind and lose the only link of a single peer.
    async fn end_to_end(&self) -> Result<()> {
        let t = self.topology();
        let peer_app = format!(":{}.1", self.peer.short());

        let endpoint = t.directory.peer_seen(&peer_app, t.to_peer_id)?;
        let link = t.directory.link(t.to_peer_id)?;

        t.directory.bind_session(&peer_app, 7, t.to_peer_id)?;
        ensure!(link.ref_count() == 1, "bind must take one reference");
        info!(peer = %peer_app, session_id = 7, link = %t.to_peer_id, refs = link.ref_count(), "session bound");

        let used = t
            .directory
            .route(&peer_app, &self.message(&peer_app, 7, 1))
            .await?;
        ensure!(used == t.to_peer_id, "session 7 must use its bound link");
        let delivered = t.to_peer.sent();
        ensure!(delivered.len() == 1, "exactly one send expected");
        if self.encryptor.is_some() {
            ensure!(delivered[0].body() != b"ping", "body left the router unsealed");
        }
        info!(link = %used, wire_len = delivered[0].bytes().len(), "routed on session 7");

        ensure!(t.directory.unbind_session(&peer_app, 7)?, "unbind must find the binding");
        ensure!(link.ref_count() == 0, "unbind must release the reference");
        let attempts = t.to_peer.attempts();
        let err = t
            .directory
            .route(&peer_app, &self.message(&peer_app, 7, 2))
            .await
            .err();
        ensure!(
            err.as_ref().is_some_and(|e| e.is_no_route()),
            "session 7 must be unroutable after unbind"
        );
        ensure!(t.to_peer.attempts() == attempts, "no-route must not send");
        info!(session_id = 7, "session 7 no longer routable");

        let torn = t.directory.link_lost(t.to_peer_id);
        ensure!(torn == vec![peer_app.clone()], "endpoint must be torn down");
        ensure!(endpoint.state() == EndpointState::Stopping);
        ensure!(t.directory.find(&peer_app).is_none());
        info!(peer = %peer_app, state = %endpoint.state(), "endpoint torn down after link loss");
        Ok(())
    }

    /// Redundant paths: direct preference, fallthrough, then losing the
    /// relay must not take the directly reachable peer down with it.
    async fn triangular_teardown(&self) -> Result<()> {
        let t = self.topology();
        let peer_app = self.peer_app();
        let relay_app = self.relay_app();

        t.directory.peer_seen(&peer_app, t.to_relay_id)?;
        t.directory.peer_seen(&peer_app, t.to_peer_id)?;
        t.directory.peer_seen(&relay_app, t.to_relay_id)?;

        let used = t
            .directory
            .route(&peer_app, &self.message(&peer_app, 0, 1))
            .await?;
        ensure!(used == t.to_peer_id, "direct link must be preferred");
        ensure!(t.to_relay.attempts() == 0);
        info!(peer = %peer_app, link = %used, "direct link preferred");

        t.to_peer.set_failing(true);
        let used = t
            .directory
            .route(&peer_app, &self.message(&peer_app, 0, 2))
            .await?;
        ensure!(used == t.to_relay_id, "relay must take over");
        t.to_peer.set_failing(false);
        info!(peer = %peer_app, link = %used, "fell through to relay");

        let torn = t.directory.link_lost(t.to_relay_id);
        ensure!(torn == vec![relay_app.clone()], "only the relay's own app goes");
        let endpoint = t
            .directory
            .find(&peer_app)
            .ok_or_else(|| anyhow::anyhow!("{peer_app} vanished with the relay"))?;
        ensure!(endpoint.state() == EndpointState::Active);
        info!(lost = %t.to_relay_id, torn = ?torn, "relay lost, direct peer survives");

        let used = t
            .directory
            .route(&peer_app, &self.message(&peer_app, 0, 3))
            .await?;
        ensure!(used == t.to_peer_id);

        let torn = t.directory.link_lost(t.to_peer_id);
        ensure!(torn == vec![peer_app.clone()]);
        ensure!(t.directory.is_empty(), "no endpoints may remain");
        if self.config.router.reap_dead_links {
            ensure!(t.directory.links().is_empty(), "lost links must be reaped");
        }
        info!(torn = ?torn, "direct link lost, topology empty");
        Ok(())
    }

    /// The relay daemon leaves: everything only it could reach is purged.
    async fn peer_departure(&self) -> Result<()> {
        let t = self.topology();
        let peer_app = self.peer_app();
        let relay_app = self.relay_app();

        t.directory.peer_seen(&peer_app, t.to_relay_id)?;
        t.directory.peer_seen(&peer_app, t.to_peer_id)?;
        t.directory.peer_seen(&relay_app, t.to_relay_id)?;
        t.directory.bind_session(&relay_app, 11, t.to_relay_id)?;

        let purged = t.directory.purge_peer(&self.relay);
        ensure!(purged == vec![relay_app.clone()], "only the relay's app is purged");
        ensure!(t.directory.find(&peer_app).is_some());
        ensure!(t.directory.link(t.to_relay_id)?.ref_count() == 0);
        info!(relay = %self.relay, purged = ?purged, "relay departed");

        let used = t
            .directory
            .route(&peer_app, &self.message(&peer_app, 0, 1))
            .await?;
        ensure!(used == t.to_peer_id);
        Ok(())
    }
}
