//! Admission gate that lets in-flight pushes drain on shutdown.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ExportError;

const ACTIVE: u8 = 0;
const DRAINING: u8 = 1;
const TERMINATED: u8 = 2;

/// Lifecycle of a [`ShutdownCoordinator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownState {
    /// Accepting pushes.
    Active,
    /// Shutdown requested; waiting for admitted pushes to finish.
    Draining,
    /// All admitted pushes finished.
    Terminated,
}

/// Tracks in-flight pushes and rejects new ones once shutdown starts.
///
/// A push registers with [`admit`](Self::admit) and stays counted until the
/// returned guard is dropped, whichever way the push ends.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    state: AtomicU8,
    in_flight: AtomicUsize,
    drained: Notify,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ShutdownState {
        match self.state.load(Ordering::SeqCst) {
            ACTIVE => ShutdownState::Active,
            DRAINING => ShutdownState::Draining,
            _ => ShutdownState::Terminated,
        }
    }

    /// Number of pushes currently admitted.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Register a push. Fails with [`ExportError::Shutdown`] once shutdown
    /// has started.
    pub fn admit(&self) -> Result<InFlightGuard<'_>, ExportError> {
        // Count first, then look at the state: a shutdown that starts in
        // between will see this push and wait for it.
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.state.load(Ordering::SeqCst) != ACTIVE {
            self.release();
            return Err(ExportError::Shutdown);
        }
        Ok(InFlightGuard { coordinator: self })
    }

    fn release(&self) {
        let previous = self.in_flight.fetch_sub(1, Ordering::SeqCst);
        if previous == 1 && self.state.load(Ordering::SeqCst) != ACTIVE {
            self.drained.notify_waiters();
        }
    }

    /// Stop admitting pushes and wait for admitted ones to finish.
    ///
    /// Safe to call more than once; later calls wait the same way and
    /// return `Ok(())` once drained. If `cancel` fires first the wait is
    /// abandoned with [`ExportError::ShutdownInterrupted`] and the gate stays
    /// closed.
    pub async fn shutdown(&self, cancel: &CancellationToken) -> Result<(), ExportError> {
        if self
            .state
            .compare_exchange(ACTIVE, DRAINING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            debug!(in_flight = self.in_flight(), "Shutdown started, draining pushes");
        }

        loop {
            let notified = self.drained.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.in_flight.load(Ordering::SeqCst) == 0 {
                let _ = self.state.compare_exchange(
                    DRAINING,
                    TERMINATED,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                return Ok(());
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => {
                    debug!(in_flight = self.in_flight(), "Shutdown wait cancelled");
                    return Err(ExportError::ShutdownInterrupted);
                }
            }
        }
    }
}

/// Keeps a push counted as in flight until dropped.
#[derive(Debug)]
pub struct InFlightGuard<'a> {
    coordinator: &'a ShutdownCoordinator,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.release();
    }
}
