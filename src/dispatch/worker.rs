//! Worker Delegation (spec.md §4.4): runs the handler pipeline for one
//! admitted request and turns its output into addressed, encoded reply
//! bytes. [`execute_request`] is the whole "child" side of the
//! fork-per-request → task-per-request redesign (spec.md §9): it is
//! used identically whether the dispatcher `tokio::spawn`s it (spawn
//! mode) or simply `.await`s it inline (`-s`, spec.md §6).

use std::net::Ipv4Addr;
use std::sync::Arc;

use log::error;

use crate::core::packet::{Packet, SocketLabel};
use crate::core::packet_context::PacketContext;
use crate::core::pfe::PacketForwardingEngine;

use super::codec::{Codec, DhcpCodec};

/// What a worker produced: the dedup key its Request Record is filed
/// under, the reply `Packet` to cache for retransmission replay (if
/// any), and that same reply already serialized to wire bytes ready to
/// send.
pub struct ExecutionOutcome {
    pub key: (Ipv4Addr, u32),
    pub label: SocketLabel,
    pub reply: Option<Packet>,
    pub bytes: Option<Vec<u8>>,
}

/// Runs `request` through every `Received`/`Handled`/`Replied` hook
/// registered in `registry` (spec.md's "Handler (external)" box,
/// realized as [`crate::core::pfe::PacketForwardingEngine::run_lifetime`]),
/// then addresses and encodes the resulting reply.
///
/// DHCP replies are routed with [`crate::dhcp::routing::route_reply`]
/// against the *request's* header; RADIUS replies are simply unicast
/// back to the request's source. `radius_codec` is `None` whenever the
/// deployment has not plugged in a real RADIUS wire codec (spec.md §1
/// external collaborator) — in that case a RADIUS reply is computed but
/// never serialized, matching "log and discard" treatment one layer up.
pub async fn execute_request(
    engine: Arc<PacketForwardingEngine<Packet, Packet>>,
    dhcp_codec: Arc<DhcpCodec>,
    radius_codec: Option<Arc<dyn Codec>>,
    request: Packet,
) -> ExecutionOutcome {
    let key = (*request.src.ip(), request.id);
    let label = request.socket;
    let is_dhcp = request.is_dhcp();
    let dhcp_header = request.dhcp_header.clone();
    // For DHCP, the request's destination is this server's own address,
    // which becomes the reply's source once routed (spec.md §4.2). For
    // RADIUS, the reply is simply unicast back to the requester.
    let server_addr = request.dst;
    let client_addr = request.src;

    let context: PacketContext<Packet, Packet> = PacketContext::from(request);
    let outcome = engine.run_lifetime(context).await;

    let reply = match outcome {
        Ok(mut reply) => {
            reply.id = key.1;
            reply.socket = label;
            if is_dhcp {
                reply.dhcp_header = dhcp_header.clone();
                reply.dst = server_addr;
                if let Some(header) = dhcp_header.as_ref() {
                    crate::dhcp::routing::route_reply(header, &mut reply);
                }
            } else {
                reply.src = server_addr;
                reply.dst = client_addr;
            }
            Some(reply)
        }
        Err(err) => {
            error!("handler pipeline failed for {key:?}: {err}");
            None
        }
    };

    let bytes = reply.as_ref().and_then(|r| {
        if is_dhcp {
            Some(dhcp_codec.encode(r))
        } else {
            radius_codec.as_ref().map(|codec| codec.encode(r))
        }
    });

    ExecutionOutcome { key, label, reply, bytes }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::avp::{AttrValue, Avp};
    use crate::core::packet::{code, DHCP_CODE_OFFSET};
    use crate::dhcp::message_type::DHCP_MSG_TYPE_ATTR;
    use crate::hooks::handlers::{register_hooks, AllowAllAuthBackend, NullAccountingBackend};
    use std::net::{Ipv4Addr, SocketAddrV4};

    fn engine() -> Arc<PacketForwardingEngine<Packet, Packet>> {
        let mut registry = crate::hooks::hook_registry::HookRegistry::new();
        register_hooks(&mut registry, Arc::new(AllowAllAuthBackend), Arc::new(NullAccountingBackend));
        Arc::new(PacketForwardingEngine::new(registry))
    }

    #[tokio::test]
    async fn auth_request_produces_an_acked_reply_addressed_back_to_the_client() {
        let mut request = Packet::empty(SocketLabel::Auth);
        request.code = code::AUTH_REQUEST;
        request.id = 42;
        request.src = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 5), 32000);
        request.dst = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 254), 1812);

        let outcome = execute_request(engine(), Arc::new(DhcpCodec), None, request).await;
        let reply = outcome.reply.unwrap();
        assert_eq!(reply.code, code::AUTH_ACK);
        assert_eq!(reply.dst, SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 5), 32000));
        assert!(outcome.bytes.is_none(), "no RADIUS codec configured");
    }

    #[tokio::test]
    async fn dhcp_discover_produces_an_encoded_offer_routed_by_the_request_header() {
        use crate::core::dhcp_header::DhcpHeader;

        let mut request = Packet::empty(SocketLabel::Dhcp);
        request.code = DHCP_CODE_OFFSET + 1;
        request.id = 0x1234_5678;
        request.vps.push(Avp::new(DHCP_MSG_TYPE_ATTR, AttrValue::Byte(1)));
        request.src = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 5), 68);
        request.dst = SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 254), 67);
        let mut header = DhcpHeader::empty();
        header.ciaddr = Ipv4Addr::new(10, 0, 0, 5);
        request.dhcp_header = Some(header);

        let outcome = execute_request(engine(), Arc::new(DhcpCodec), None, request).await;
        let reply = outcome.reply.unwrap();
        assert_eq!(reply.dst.ip(), &Ipv4Addr::new(10, 0, 0, 5));
        assert!(outcome.bytes.is_some());
        assert!(outcome.bytes.unwrap().len() >= 300);
    }
}
