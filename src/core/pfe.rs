//! The `PacketForwardingEngine` runs every hook registered for each
//! successive [`PacketState`] against one [`PacketContext`]. It is the
//! mechanism Worker Delegation (spec.md §4.4) uses to "run the handler
//! on the Request Record": the handler *is* whatever hooks are
//! registered for [`PacketState::Received`] (`authenticate`,
//! `accounting`, DHCP message-type dispatch).

use enum_iterator::all;

use crate::hooks::hook_registry::HookRegistry;

use super::{errors::HookError, packet::PacketType, packet_context::PacketContext, state::PacketState};

pub struct PacketForwardingEngine<T: PacketType + Send, U: PacketType + Send> {
    registry: HookRegistry<T, U>,
}

impl<T: PacketType + Send, U: PacketType + Send> PacketForwardingEngine<T, U> {
    pub fn new(registry: HookRegistry<T, U>) -> Self {
        Self { registry }
    }

    /// Walks `Received -> Handled -> Replied`, running the registry's
    /// hooks at each state. A [`HookError`] (raised when a
    /// [`crate::hooks::flags::HookFlag::Fatal`] hook fails) short-circuits
    /// the walk; the caller decides what "no reply" means in that case.
    pub async fn run_lifetime(&self, mut packet: PacketContext<T, U>) -> Result<U, HookError> {
        for state in all::<PacketState>().filter(|s| *s != PacketState::Failure) {
            packet.set_state(state);
            self.registry.run_hooks(&mut packet)?;
        }
        Ok(packet.into_output())
    }
}
