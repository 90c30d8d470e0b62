//! Session worker: owns one identity's context and supervises its slots.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::service::RunContext;
use super::slot::{SlotExit, SlotWorker};
use crate::driver::{AutomationDriver, Identity};

/// Identities not yet used in this run.
pub(crate) type IdentityPool = Arc<Mutex<VecDeque<Identity>>>;

/// One entry of the outer pool.
///
/// Runs sessions for identities taken from `pool` one after another until the
/// queue is idle or the identities are used up.
pub(crate) async fn run_outer_worker<D: AutomationDriver>(
    ctx: Arc<RunContext<D>>,
    pool: IdentityPool,
    worker_index: usize,
    cancel: CancellationToken,
) {
    loop {
        if ctx.queue.is_idle() || cancel.is_cancelled() {
            break;
        }
        let Some(identity) = pool.lock().pop_front() else {
            debug!(worker = worker_index, "No identities left");
            break;
        };

        SessionWorker::new(ctx.clone(), identity, cancel.child_token())
            .run()
            .await;
    }
    debug!(worker = worker_index, "Outer worker finished");
}

pub(crate) struct SessionWorker<D: AutomationDriver> {
    ctx: Arc<RunContext<D>>,
    identity: Identity,
    cancel: CancellationToken,
}

impl<D: AutomationDriver> SessionWorker<D> {
    pub(crate) fn new(ctx: Arc<RunContext<D>>, identity: Identity, cancel: CancellationToken) -> Self {
        Self {
            ctx,
            identity,
            cancel,
        }
    }

    async fn launch(&self) -> Option<D::Context> {
        loop {
            if !self
                .ctx
                .gate
                .wait_until_reachable(self.ctx.driver.as_ref(), &self.cancel)
                .await
            {
                return None;
            }

            match self.ctx.driver.launch(&self.identity).await {
                Ok(context) => return Some(context),
                Err(e) if e.is_connectivity() => {
                    warn!(identity = %self.identity, error = %e, "Launch hit a connectivity error");
                    tokio::select! {
                        _ = self.cancel.cancelled() => return None,
                        _ = tokio::time::sleep(self.ctx.config.connectivity_retry_delay()) => {}
                    }
                }
                Err(e) => {
                    error!(identity = %self.identity, error = %e, "Failed to launch session");
                    self.ctx.stats.launch_failed();
                    return None;
                }
            }
        }
    }

    pub(crate) async fn run(self) {
        let Some(context) = self.launch().await else {
            return;
        };
        self.ctx.stats.session_launched();
        info!(
            identity = %self.identity,
            driver = self.ctx.driver.name(),
            slots = self.ctx.config.max_slots_per_session,
            "Session started"
        );

        // Every slot holds a clone; this one keeps the context alive while
        // slots are between jobs.
        let anchor = Arc::new(context);
        let mut slots = JoinSet::new();

        for index in 0..self.ctx.config.max_slots_per_session {
            if index > 0 {
                if self.ctx.queue.is_idle() {
                    break;
                }
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(self.ctx.config.slot_start_stagger()) => {}
                }
            }
            let worker = SlotWorker::new(
                self.ctx.clone(),
                anchor.clone(),
                self.identity.name.clone(),
                index,
                self.cancel.clone(),
            );
            slots.spawn(worker.run());
        }

        let mut lost = false;
        while let Some(result) = slots.join_next().await {
            match result {
                Ok(SlotExit::SessionLost) if !lost => {
                    lost = true;
                    self.ctx.stats.session_lost();
                    warn!(identity = %self.identity, "Session lost; stopping its slots");
                    self.cancel.cancel();
                }
                Ok(exit) => debug!(identity = %self.identity, ?exit, "Slot finished"),
                Err(e) => error!(identity = %self.identity, error = %e, "Slot task panicked"),
            }
        }

        match Arc::try_unwrap(anchor) {
            Ok(context) => self.ctx.driver.shutdown(context).await,
            Err(_) => warn!(identity = %self.identity, "Session context still referenced at shutdown"),
        }
        info!(identity = %self.identity, "Session ended");
    }
}
