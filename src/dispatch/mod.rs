//! The dispatcher: main event loop, worker delegation, message-passing
//! reaper and reload/shutdown signal handling (spec.md §4.1, §4.4,
//! §4.5, §9). Everything under this module runs on the single task
//! that owns the [`crate::core::request_table::RequestTable`] and the
//! bound sockets — no other task ever touches either.

pub mod codec;
pub mod dispatcher;
pub mod reaper;
pub mod signals;
pub mod worker;
