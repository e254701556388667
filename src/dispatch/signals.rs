//! Reload/shutdown lifecycle signals (spec.md §4.5): `SIGHUP` sets a
//! reload flag consumed at the top of the next main-loop iteration;
//! `SIGTERM`/`SIGINT` set a shutdown flag that lets the dispatcher exit
//! cleanly instead of being killed mid-iteration. No process-group
//! kill: §9's task model has no child processes to reap that way.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::info;
use tokio::signal::unix::{signal, SignalKind};

#[derive(Clone)]
pub struct Signals {
    reload: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
}

impl Signals {
    /// Spawns the two listener tasks and returns the shared flags. Each
    /// listener just flips its `AtomicBool` and loops back to wait for
    /// the next delivery; it never touches the Request Table directly.
    pub fn spawn() -> std::io::Result<Self> {
        let reload = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut hup = signal(SignalKind::hangup())?;
        let reload_flag = reload.clone();
        tokio::spawn(async move {
            loop {
                hup.recv().await;
                info!("SIGHUP received, scheduling a configuration reload");
                reload_flag.store(true, Ordering::SeqCst);
            }
        });

        let mut term = signal(SignalKind::terminate())?;
        let mut int = signal(SignalKind::interrupt())?;
        let shutdown_flag = shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = term.recv() => info!("SIGTERM received, shutting down"),
                _ = int.recv() => info!("SIGINT received, shutting down"),
            }
            shutdown_flag.store(true, Ordering::SeqCst);
        });

        Ok(Self { reload, shutdown })
    }

    pub fn reload_requested(&self) -> bool {
        self.reload.load(Ordering::SeqCst)
    }

    pub fn clear_reload(&self) {
        self.reload.store(false, Ordering::SeqCst);
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_start_clear() {
        let reload = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));
        let signals = Signals { reload, shutdown };
        assert!(!signals.reload_requested());
        assert!(!signals.shutdown_requested());
    }

    #[test]
    fn clear_reload_resets_the_flag() {
        let reload = Arc::new(AtomicBool::new(true));
        let shutdown = Arc::new(AtomicBool::new(false));
        let signals = Signals { reload, shutdown };
        assert!(signals.reload_requested());
        signals.clear_reload();
        assert!(!signals.reload_requested());
    }
}
