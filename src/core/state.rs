use enum_iterator::Sequence;

/// Lifecycle states a [`crate::core::packet_context::PacketContext`] moves
/// through between admission and reply. `Failure` is not entered by
/// `all::<PacketState>()` iteration; it is jumped to explicitly when a
/// [`crate::hooks::flags::HookFlag::Fatal`] hook fails.
#[derive(Copy, Debug, Sequence, PartialEq, Eq, Hash, Clone)]
pub enum PacketState {
    /// Just admitted into the request table, not yet handed to a handler.
    Received,
    /// A handler (`authenticate`, `accounting`, DHCP message-type dispatch)
    /// has run and may have filled in the output packet.
    Handled,
    /// The reply has been serialized and is ready for the dispatcher to send.
    Replied,
    /// A fatal hook failed; only failure-chain hooks run from here.
    Failure,
}
