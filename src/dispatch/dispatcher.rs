//! The dispatcher main loop (spec.md §4.1): drain the three RADIUS
//! sockets plus the DHCP listener, decode, classify, admit and
//! delegate. This is the one task in the whole crate that owns the
//! [`RequestTable`] — every other task (spawned workers, signal
//! listeners) only ever reaches it through the reaper channel or an
//! `Arc`-shared read-only service.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

use log::{debug, error, info, warn};

use crate::core::avp::AttrValue;
use crate::core::client::ClientRegistry;
use crate::core::packet::{code, Packet, SocketLabel};
use crate::core::request::{RequestRecord, WorkerHandle};
use crate::core::request_table::{AdmitOutcome, RequestTable};
use crate::core::pfe::PacketForwardingEngine;
use crate::net::BoundSockets;
use crate::utils::config::ConfigSource;

use super::codec::{Codec, DhcpCodec};
use super::reaper::{self, WorkerExit};
use super::signals::Signals;
use super::worker;

/// RFC 2865's well-known User-Name attribute number. The real RADIUS
/// attribute dictionary is an external collaborator (spec.md §1); this
/// one identifier is hardcoded because username normalization
/// (spec.md §4.1) needs it regardless of which dictionary is plugged in.
const RADIUS_USER_NAME_ATTR: u32 = 1;

/// Proxy forwarding boundary (spec.md §4.1's "proxy-send hook" /
/// "proxy-receive hook"). A production deployment backs this with
/// real upstream-RADIUS forwarding; out of scope here, same pattern as
/// [`crate::hooks::handlers::AuthBackend`].
pub trait ProxyHook: Send + Sync {
    /// Returns `true` if the hook claims the request (the dispatcher
    /// yields instead of admitting it locally).
    fn on_send(&self, request: &Packet) -> bool;
    fn on_receive(&self, reply: &Packet);
}

/// Never forwards; every request is handled locally.
pub struct NullProxyHook;

impl ProxyHook for NullProxyHook {
    fn on_send(&self, _request: &Packet) -> bool {
        false
    }

    fn on_receive(&self, _reply: &Packet) {}
}

enum Classification {
    Admit,
    Reject(&'static str),
    Handled,
}

/// `rad_process`'s classification half (spec.md §4.1). Admission and
/// delegation are handled by the caller once this returns
/// [`Classification::Admit`].
fn classify_radius(packet: &mut Packet, proxy_hook: &dyn ProxyHook) -> Classification {
    match packet.code {
        code::AUTH_REQUEST | code::ACCT_REQUEST if packet.socket == SocketLabel::Proxy => {
            Classification::Reject("request code received on the proxy socket")
        }
        code::AUTH_REQUEST | code::ACCT_REQUEST => {
            if !normalize_username(packet) {
                return Classification::Reject("no username AVP remains after normalization");
            }
            if proxy_hook.on_send(packet) {
                return Classification::Handled;
            }
            Classification::Admit
        }
        code::AUTH_ACK | code::AUTH_REJECT | code::ACCT_RESPONSE
            if packet.socket == SocketLabel::Proxy =>
        {
            proxy_hook.on_receive(packet);
            Classification::Handled
        }
        code::AUTH_ACK | code::AUTH_REJECT | code::ACCT_RESPONSE => {
            Classification::Reject("reply code received on a non-proxy socket")
        }
        code::PASSWORD_REQUEST => Classification::Reject("PASSWORD_REQUEST is deprecated"),
        _ => Classification::Reject("unrecognized code"),
    }
}

/// Strips the realm (everything from `@` onward) and trims whitespace
/// from the User-Name AVP, as configured normalization would
/// (spec.md §4.1). Drops the AVP and returns `false` if nothing is left
/// (or it was never present); `true` means a usable username remains.
fn normalize_username(packet: &mut Packet) -> bool {
    let Some(pos) = packet.vps.iter().position(|a| a.attribute == RADIUS_USER_NAME_ATTR) else {
        return false;
    };
    let normalized = match &packet.vps[pos].value {
        AttrValue::String(s) => s.split('@').next().unwrap_or("").trim().to_string(),
        _ => String::new(),
    };
    if normalized.is_empty() {
        packet.vps.remove(pos);
        false
    } else {
        packet.vps[pos].value = AttrValue::String(normalized);
        true
    }
}

pub struct Dispatcher {
    sockets: Arc<BoundSockets>,
    local_auth: SocketAddrV4,
    local_acct: SocketAddrV4,
    local_proxy: SocketAddrV4,
    local_dhcp: SocketAddrV4,
    table: RequestTable,
    engine: Arc<PacketForwardingEngine<Packet, Packet>>,
    client_registry: Arc<dyn ClientRegistry>,
    proxy_hook: Arc<dyn ProxyHook>,
    dhcp_codec: Arc<DhcpCodec>,
    radius_codec: Option<Arc<dyn Codec>>,
    config_source: Option<Arc<dyn ConfigSource>>,
    spawn_mode: bool,
    reaper_tx: tokio::sync::mpsc::UnboundedSender<WorkerExit>,
    reaper_rx: tokio::sync::mpsc::UnboundedReceiver<WorkerExit>,
    signals: Signals,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sockets: Arc<BoundSockets>,
        local_auth: SocketAddrV4,
        local_acct: SocketAddrV4,
        local_proxy: SocketAddrV4,
        local_dhcp: SocketAddrV4,
        engine: Arc<PacketForwardingEngine<Packet, Packet>>,
        client_registry: Arc<dyn ClientRegistry>,
        proxy_hook: Arc<dyn ProxyHook>,
        radius_codec: Option<Arc<dyn Codec>>,
        config_source: Option<Arc<dyn ConfigSource>>,
        spawn_mode: bool,
        signals: Signals,
    ) -> Self {
        let (reaper_tx, reaper_rx) = reaper::channel();
        Self {
            sockets,
            local_auth,
            local_acct,
            local_proxy,
            local_dhcp,
            table: RequestTable::new(),
            engine,
            client_registry,
            proxy_hook,
            dhcp_codec: Arc::new(DhcpCodec),
            radius_codec,
            config_source,
            spawn_mode,
            reaper_tx,
            reaper_rx,
            signals,
        }
    }

    /// Runs the main loop forever (spec.md §4.1 steps 1-3 wrap the
    /// per-datagram steps 4-7 handled by [`Self::on_datagram`]). Returns
    /// the process exit code: `0` on a clean shutdown signal, `1` on a
    /// fatal socket error.
    pub async fn run(mut self) -> i32 {
        loop {
            if self.signals.shutdown_requested() {
                info!("shutdown requested, exiting");
                return 0;
            }
            if self.signals.reload_requested() {
                info!("reload requested; re-reading configuration");
                self.reload_config();
                self.signals.clear_reload();
            }
            reaper::drain(&mut self.reaper_rx, &mut self.table);

            // `biased` turns this into the fixed auth -> acct -> proxy
            // priority spec.md §4.1 step 3 asks for, instead of tokio's
            // default randomized fairness; the DHCP listener is polled
            // last since it is not one of the three sockets that rule
            // names.
            let (label, result) = tokio::select! {
                biased;
                r = self.sockets.recv_from(SocketLabel::Auth) => (SocketLabel::Auth, r),
                r = self.sockets.recv_from(SocketLabel::Acct) => (SocketLabel::Acct, r),
                r = self.sockets.recv_from(SocketLabel::Proxy) => (SocketLabel::Proxy, r),
                r = self.sockets.recv_from(SocketLabel::Dhcp) => (SocketLabel::Dhcp, r),
            };

            if let Err(err) = self.on_datagram(label, result).await {
                error!("fatal socket error on {label:?}: {err}");
                return 1;
            }
        }
    }

    async fn on_datagram(
        &mut self,
        label: SocketLabel,
        result: io::Result<(Vec<u8>, SocketAddrV4)>,
    ) -> io::Result<()> {
        let (bytes, src) = result?;
        let dst = match label {
            SocketLabel::Auth => self.local_auth,
            SocketLabel::Acct => self.local_acct,
            SocketLabel::Proxy => self.local_proxy,
            SocketLabel::Dhcp => self.local_dhcp,
        };

        if label == SocketLabel::Dhcp {
            match self.dhcp_codec.decode(&bytes, src, dst, label) {
                Ok(packet) => self.admit_and_delegate(packet).await,
                Err(err) => debug!("discarding malformed DHCP datagram from {src}: {err}"),
            }
            return Ok(());
        }

        let codec = match &self.radius_codec {
            Some(codec) => codec.clone(),
            None => {
                debug!("no RADIUS codec configured, discarding datagram from {src} on {label:?}");
                return Ok(());
            }
        };

        let mut packet = match codec.decode(&bytes, src, dst, label) {
            Ok(packet) => packet,
            Err(err) => {
                debug!("discarding malformed datagram from {src} on {label:?}: {err}");
                return Ok(());
            }
        };

        let client = match self.client_registry.lookup(*packet.src.ip()) {
            Some(client) => client.clone(),
            None => {
                debug!("unknown client {src}, discarding");
                return Ok(());
            }
        };
        if !codec.verify_authenticator(&packet, &client.shared_secret) {
            debug!("authenticator verification failed for {src}, discarding");
            return Ok(());
        }

        match classify_radius(&mut packet, self.proxy_hook.as_ref()) {
            Classification::Reject(reason) => debug!("rejecting packet from {src}: {reason}"),
            Classification::Handled => {}
            Classification::Admit => self.admit_and_delegate(packet).await,
        }
        Ok(())
    }

    async fn admit_and_delegate(&mut self, packet: Packet) {
        let secret = if packet.is_dhcp() {
            Vec::new()
        } else {
            self.client_registry
                .lookup(*packet.src.ip())
                .map(|c| c.shared_secret.clone())
                .unwrap_or_default()
        };
        let key = (*packet.src.ip(), packet.id);
        let label = packet.socket;
        let delegate_packet = packet.clone();
        let record = RequestRecord::new(packet, secret);

        match self.table.admit(record) {
            AdmitOutcome::Accepted => {
                if self.spawn_mode {
                    self.spawn_worker(key, delegate_packet);
                } else {
                    self.run_inline(key, delegate_packet).await;
                }
            }
            AdmitOutcome::Duplicate(Some(cached)) => {
                debug!("duplicate {key:?}, retransmitting cached reply");
                self.retransmit(label, &cached).await;
            }
            AdmitOutcome::Duplicate(None) => {
                debug!("duplicate {key:?}, no reply cached yet, dropping");
            }
            AdmitOutcome::Overload => {
                warn!("request table overload, dropping {key:?}");
            }
        }
    }

    /// `spawn_mode` path (spec.md §4.4): runs the handler on its own
    /// task so a misbehaving handler cannot block the dispatcher, and
    /// records the `JoinHandle` so [`RequestTable::admit`]'s watchdog
    /// can abort it if it overruns `MAX_REQUEST_TIME_SECS`.
    fn spawn_worker(&mut self, key: (Ipv4Addr, u32), request: Packet) {
        let engine = self.engine.clone();
        let dhcp_codec = self.dhcp_codec.clone();
        let radius_codec = self.radius_codec.clone();
        let sockets = self.sockets.clone();
        let reaper_tx = self.reaper_tx.clone();

        let handle = tokio::spawn(async move {
            let outcome = worker::execute_request(engine, dhcp_codec, radius_codec, request).await;
            if let (Some(bytes), Some(reply)) = (&outcome.bytes, &outcome.reply) {
                if let Err(err) = sockets.send_to(outcome.label, reply.dst, bytes).await {
                    error!("failed to send reply for {:?}: {err}", outcome.key);
                }
            }
            let _ = reaper_tx.send(WorkerExit { key: outcome.key, reply: outcome.reply });
        });
        self.table.set_worker(key, WorkerHandle::Task(handle));
    }

    /// `-s` / `spawn_mode` disabled path (spec.md §4.4, §6): runs and
    /// resolves the request before returning to the main loop.
    async fn run_inline(&mut self, key: (Ipv4Addr, u32), request: Packet) {
        let outcome = worker::execute_request(
            self.engine.clone(),
            self.dhcp_codec.clone(),
            self.radius_codec.clone(),
            request,
        )
        .await;
        if let (Some(bytes), Some(reply)) = (&outcome.bytes, &outcome.reply) {
            if let Err(err) = self.sockets.send_to(outcome.label, reply.dst, bytes).await {
                error!("failed to send reply for {key:?}: {err}");
            }
        }
        self.table.complete(outcome.key, outcome.reply);
    }

    /// SIGHUP handling (spec.md §7): on failure, log and keep serving
    /// under the prior configuration rather than tearing anything down.
    fn reload_config(&mut self) {
        let Some(source) = &self.config_source else {
            debug!("reload requested but no config source configured, nothing to re-read");
            return;
        };
        match source.reload() {
            Ok(registry) => {
                info!("configuration reloaded successfully");
                self.client_registry = registry;
            }
            Err(err) => {
                error!("configuration reload failed, keeping prior configuration: {err}");
            }
        }
    }

    async fn retransmit(&self, label: SocketLabel, reply: &Packet) {
        let bytes = if reply.is_dhcp() {
            Some(self.dhcp_codec.encode(reply))
        } else {
            self.radius_codec.as_ref().map(|codec| codec.encode(reply))
        };
        if let Some(bytes) = bytes {
            if let Err(err) = self.sockets.send_to(label, reply.dst, &bytes).await {
                error!("failed to retransmit cached reply: {err}");
            }
        }
    }
}
