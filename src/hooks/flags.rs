/// Controls a [`crate::hooks::hook_registry::Hook`]'s failure behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookFlag {
    /// A failing hook with this flag jumps the whole pipeline to
    /// [`crate::core::state::PacketState::Failure`] instead of merely
    /// logging and continuing.
    Fatal,
}
