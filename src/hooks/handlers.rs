//! Registers the `Received`-state hooks that stand in for the
//! "Handler (external)" box in spec.md §2's data-flow table:
//! `authenticate` for `AUTH_REQUEST`, `accounting` for `ACCT_REQUEST`,
//! and DHCP message-type dispatch for DHCP packets. This mirrors
//! `frozenpeach-dev-dhcp`'s `responder_hook`, which matches on
//! `options.message_type()` inside one hook closure and calls out to a
//! service pulled from the [`TypeMap`].
//!
//! Credential comparison, accounting record writing and DHCP address
//! allocation are external collaborators per spec.md §1: this module
//! defines the trait boundary they plug into
//! ([`AuthBackend`], [`AccountingBackend`]) and wires a conservative
//! default that always logs and never claims to authenticate or
//! allocate, so the crate is runnable standalone without pulling in a
//! real credential store.

use std::sync::{Arc, Mutex};

use log::trace;

use crate::core::{
    errors::HookError,
    packet::{code, Packet},
    packet_context::PacketContext,
    state::PacketState,
};
use crate::dhcp::message_type::DHCP_MSG_TYPE_ATTR;

use super::{
    hook_registry::{Hook, HookClosure, HookRegistry},
    typemap::TypeMap,
};

/// Credential comparison backend. A production deployment backs this
/// with `users`-file or LDAP/SQL lookups; out of scope here.
pub trait AuthBackend: Send + Sync {
    /// Returns `true` if the request's credentials are acceptable.
    fn authenticate(&self, request: &Packet) -> bool;
}

/// Accounting record writer. A production deployment backs this with
/// `detail` files or a database sink; out of scope here.
pub trait AccountingBackend: Send + Sync {
    fn record(&self, request: &Packet);
}

/// Always accepts, logging that it did so. Stands in for a real
/// credential store so the dispatcher is exercisable end to end.
pub struct AllowAllAuthBackend;

impl AuthBackend for AllowAllAuthBackend {
    fn authenticate(&self, request: &Packet) -> bool {
        trace!("AllowAllAuthBackend accepting request id {}", request.id);
        true
    }
}

/// Logs accounting packets without writing them anywhere durable.
pub struct NullAccountingBackend;

impl AccountingBackend for NullAccountingBackend {
    fn record(&self, request: &Packet) {
        trace!("NullAccountingBackend observed request id {}", request.id);
    }
}

/// Registers the three `Received`-state hooks against `registry`,
/// after registering `auth_backend`/`accounting_backend` as services so
/// the hook closures can reach them through the [`TypeMap`].
pub fn register_hooks(
    registry: &mut HookRegistry<Packet, Packet>,
    auth_backend: Arc<dyn AuthBackend>,
    accounting_backend: Arc<dyn AccountingBackend>,
) {
    registry.register_service(auth_backend);
    registry.register_service(accounting_backend);

    registry.register_hook(
        PacketState::Received,
        Hook::new(String::from("authenticate"), HookClosure(Box::new(authenticate)), Vec::default()),
    );
    registry.register_hook(
        PacketState::Received,
        Hook::new(String::from("accounting"), HookClosure(Box::new(accounting)), Vec::default()),
    );
    registry.register_hook(
        PacketState::Received,
        Hook::new(String::from("dhcp_dispatch"), HookClosure(Box::new(dhcp_dispatch)), Vec::default()),
    );
}

fn authenticate(
    services: Arc<Mutex<TypeMap>>,
    context: &mut PacketContext<Packet, Packet>,
) -> Result<isize, HookError> {
    if context.get_input().code != code::AUTH_REQUEST {
        return Ok(0);
    }
    let backend = services
        .lock()
        .expect("services mutex was poisoned")
        .get::<Arc<Arc<dyn AuthBackend>>>()
        .cloned()
        .ok_or_else(|| HookError::new("no AuthBackend registered"))?;

    let accepted = backend.authenticate(context.get_input());
    let output = context.get_mut_output();
    output.code = if accepted { code::AUTH_ACK } else { code::AUTH_REJECT };
    Ok(if accepted { 1 } else { 0 })
}

fn accounting(
    services: Arc<Mutex<TypeMap>>,
    context: &mut PacketContext<Packet, Packet>,
) -> Result<isize, HookError> {
    if context.get_input().code != code::ACCT_REQUEST {
        return Ok(0);
    }
    let backend = services
        .lock()
        .expect("services mutex was poisoned")
        .get::<Arc<Arc<dyn AccountingBackend>>>()
        .cloned()
        .ok_or_else(|| HookError::new("no AccountingBackend registered"))?;

    backend.record(context.get_input());
    context.get_mut_output().code = code::ACCT_RESPONSE;
    Ok(1)
}

fn dhcp_dispatch(
    _services: Arc<Mutex<TypeMap>>,
    context: &mut PacketContext<Packet, Packet>,
) -> Result<isize, HookError> {
    if !context.get_input().is_dhcp() {
        return Ok(0);
    }
    let message_type = context
        .get_input()
        .find(DHCP_MSG_TYPE_ATTR)
        .and_then(|avp| match &avp.value {
            crate::core::avp::AttrValue::Byte(b) => Some(*b),
            _ => None,
        });

    // Lease allocation is out of scope (spec.md §1 Non-goals); this
    // hook only shapes the reply's message type the way a real
    // allocator's result would, grounded in
    // `frozenpeach-dev-dhcp::hooks::responder::responder_hook`'s
    // `match message_type { 1 => ..., 3 => ..., _ => Ok(1) }` shape.
    let reply_type = match message_type {
        Some(1) => Some(2u8), // DISCOVER -> OFFER
        Some(3) => Some(5u8), // REQUEST -> ACK
        _ => None,
    };
    if let Some(reply_type) = reply_type {
        use crate::core::avp::{AttrValue, Avp};
        context
            .get_mut_output()
            .vps
            .push(Avp::new(DHCP_MSG_TYPE_ATTR, AttrValue::Byte(reply_type)));
    }
    Ok(1)
}
