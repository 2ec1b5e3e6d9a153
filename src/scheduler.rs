//! The probe scheduler.
//!
//! One periodic tick scans the fleet and launches an independent dispatch
//! task per due check. There is no per-tick barrier: a slow probe never
//! delays later ticks, and duplicate dispatch is prevented solely by the
//! check's in-flight claim taken before its task is spawned.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::fleet::{Client, Fleet};
use crate::repository::Repository;

pub struct Scheduler {
    fleet: Arc<Fleet>,
    repo: Arc<dyn Repository>,
    tick: Duration,
}

impl Scheduler {
    pub fn new(fleet: Arc<Fleet>, repo: Arc<dyn Repository>, tick: Duration) -> Self {
        Self { fleet, repo, tick }
    }

    /// Tick until the shutdown token fires. Cancellation stops new ticks
    /// only; dispatches already in flight run to completion on their own
    /// tasks.
    pub async fn run(self, shutdown: CancellationToken) {
        debug!("starting scheduler with tick {:?}", self.tick);
        let mut ticker = interval(self.tick);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.scan(),
                _ = shutdown.cancelled() => {
                    debug!("scheduler stopping");
                    break;
                }
            }
        }
    }

    /// Fan out one scan task per connected client.
    fn scan(&self) {
        trace!("scheduler tick");
        for client in self.fleet.snapshot() {
            if !client.has_session() {
                continue;
            }
            let repo = self.repo.clone();
            tokio::spawn(scan_client(client, repo));
        }
    }
}

/// Claim and dispatch every due check of one client.
async fn scan_client(client: Arc<Client>, repo: Arc<dyn Repository>) {
    let now = Utc::now();

    for check in client.checks() {
        if !check.claim_due(now) {
            continue;
        }

        debug!(
            client = %client.id(),
            command = %check.command().id(),
            "starting a check for client"
        );

        let client = client.clone();
        let repo = repo.clone();
        tokio::spawn(async move {
            client.dispatch(&check, repo.as_ref()).await;
        });
    }
}
