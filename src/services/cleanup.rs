//! Background sweep that reclaims abandoned holds.

use chrono::Duration as ChronoDuration;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::services::reservation::ReservationService;

pub struct ExpirationSweeper {
    service: ReservationService,
    interval: Duration,
    expire_after: ChronoDuration,
}

impl ExpirationSweeper {
    pub fn new(service: ReservationService, interval: Duration, expire_after: ChronoDuration) -> Self {
        Self {
            service,
            interval,
            expire_after,
        }
    }

    /// One sweep. Listing failures are logged; the next tick retries.
    pub async fn sweep_once(&self) -> usize {
        match self.service.cancel_expired_reservations(self.expire_after).await {
            Ok(0) => {
                debug!("No expired reservations");
                0
            }
            Ok(cancelled) => {
                info!(cancelled, "Expired reservations cancelled");
                cancelled
            }
            Err(e) => {
                error!(error = %e, "Expiration sweep failed");
                0
            }
        }
    }

    /// Spawns the sweep loop. It ends when `shutdown` turns true or its
    /// sender is dropped, or when [`SweeperHandle::stop`] is called.
    pub fn start(self, shutdown: watch::Receiver<bool>) -> SweeperHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown, stop_rx));
        SweeperHandle { stop: stop_tx, task }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>, mut stop: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "Expiration sweeper started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            // Stop signals are checked first, so no new sweep starts once
            // one is pending. A sweep runs in the arm body and is never
            // interrupted.
            tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => break,
                _ = stopped(&mut stop) => break,
                _ = ticker.tick() => {
                    self.sweep_once().await;
                }
            }
        }

        info!("Expiration sweeper stopped");
    }
}

// Resolves once the flag is set or the sender is gone.
async fn stopped(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

pub struct SweeperHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Requests a stop and waits for the loop, including any sweep that is
    /// already running.
    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.task.await {
            error!(error = %e, "Expiration sweeper task failed");
        }
    }
}
