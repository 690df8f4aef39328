//! Time-to-live sweep that retires old pool entries

use crate::config::{PoolConfiguration, MIN_SWEEP_INTERVAL};
use crate::pool::PoolShared;
use crate::transport::TransportFactory;

use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, trace};

/// Result of one sweep pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SweepPass {
    /// Entries taken out of the queue and expired
    pub expired: usize,
    /// Time until the oldest remaining entry expires, if any remain
    pub next_due: Option<Duration>,
}

/// Drain every queue head that has outlived the time-to-live
///
/// Expired entries nobody is renting are disposed immediately; rented ones
/// stay in the fingerprint map until their last owner releases them.
pub(crate) fn sweep_expired<F: TransportFactory>(shared: &PoolShared<F>) -> SweepPass {
    let ttl = shared.config.time_to_live;
    let mut expired = 0;

    loop {
        let Ok(head) = shared.queue.peek() else {
            break;
        };
        let age = head.entry.age();
        if age < ttl {
            if expired > 0 {
                debug!(expired, "sweep retired expired transports");
            }
            return SweepPass {
                expired,
                next_due: Some(ttl - age),
            };
        }

        // The head may have been taken by clear() or the size bound since the peek.
        if let Some(head) = shared.queue.dequeue_if(|h| h.entry.age() >= ttl) {
            shared.retire(head);
            expired += 1;
        }
    }

    if expired > 0 {
        debug!(expired, "sweep retired expired transports");
    }
    SweepPass {
        expired,
        next_due: None,
    }
}

/// Sweep poll interval, floored so a zeroed field cannot make the thread spin
pub(crate) fn poll_interval(config: &PoolConfiguration) -> Duration {
    config.sweep_interval.max(MIN_SWEEP_INTERVAL)
}

/// Background thread running [`sweep_expired`] until stopped
pub(crate) struct Sweeper {
    shutdown: Sender<()>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    pub fn start<F: TransportFactory>(shared: Arc<PoolShared<F>>) -> std::io::Result<Self> {
        let (shutdown, stopped) = channel::bounded::<()>(1);
        let interval = poll_interval(&shared.config);

        let handle = thread::Builder::new()
            .name("invoker-pool-sweeper".to_string())
            .spawn(move || {
                loop {
                    let pass = sweep_expired(&shared);
                    let wait = pass.next_due.map_or(interval, |due| due.min(interval));
                    trace!(?wait, "sweeper sleeping");
                    match stopped.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("sweeper stopped");
            })?;

        Ok(Self { shutdown, handle })
    }

    /// Signal the thread and wait for it to exit
    pub fn stop(self) {
        let _ = self.shutdown.send(());
        if self.handle.join().is_err() {
            tracing::warn!("sweeper thread panicked");
        }
    }
}
