//! Defines an abstract representation of the data that can be
//! processed, wrapped in a [`PacketContext`], which is enriched by
//! [`crate::hooks::hook_registry::Hook`] executions to produce an
//! output packet.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::{packet::PacketType, state::PacketState};

/// A `PacketContext` encapsulates two things:
/// - an input packet, used to derive the `PacketContext`
/// - an output packet, initially empty and enriched with data through
///   hook execution
///
/// It is identified uniquely across the program using its [`Uuid`],
/// and carries a [`PacketState`] that advances as hooks run.
pub struct PacketContext<T: PacketType, U: PacketType> {
    time: DateTime<Utc>,
    id: Uuid,
    state: PacketState,
    input_packet: T,
    output_packet: U,
}

impl<T: PacketType, U: PacketType> PacketContext<T, U> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> PacketState {
        self.state
    }

    pub fn set_state(&mut self, new_state: PacketState) {
        self.state = new_state;
    }

    pub fn get_output(&self) -> &U {
        &self.output_packet
    }

    pub fn get_input(&self) -> &T {
        &self.input_packet
    }

    pub fn get_mut_output(&mut self) -> &mut U {
        &mut self.output_packet
    }

    pub fn get_mut_input(&mut self) -> &mut T {
        &mut self.input_packet
    }

    /// Consumes the context and returns the output packet, discarding
    /// the input. Called once a context reaches [`PacketState::Replied`].
    pub fn into_output(self) -> U {
        self.output_packet
    }

    /// Wall-clock age of this context since it was created.
    pub fn lifetime(&self) -> Duration {
        Utc::now() - self.time
    }
}

impl<T: PacketType, U: PacketType> From<T> for PacketContext<T, U> {
    fn from(value: T) -> Self {
        Self {
            time: Utc::now(),
            id: Uuid::new_v4(),
            state: PacketState::Received,
            input_packet: value,
            output_packet: U::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::packet::{Packet, SocketLabel};

    #[test]
    fn fresh_context_starts_in_received_state() {
        let ctx: PacketContext<Packet, Packet> = PacketContext::from(Packet::empty(SocketLabel::Auth));
        assert_eq!(ctx.state(), PacketState::Received);
    }

    #[test]
    fn set_state_advances_the_lifecycle() {
        let mut ctx: PacketContext<Packet, Packet> =
            PacketContext::from(Packet::empty(SocketLabel::Auth));
        ctx.set_state(PacketState::Handled);
        assert_eq!(ctx.state(), PacketState::Handled);
    }
}
