//! Result aggregator: one upload cycle from file to five published results.
//!
//! A cycle runs upload → prediction request → first batch (walls, icons,
//! spaces, concurrently) → second batch (background, statistics,
//! concurrently). Each cycle owns a cancellation token; starting a new cycle
//! cancels the previous one, clears every poll timer and resets every
//! published slot. Results are only published while their cycle is current.

use std::future::Future;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::api::ApiClient;
use crate::config::{ClientConfig, PollConfig, UploadLimits};
use crate::error::{ClientError, Result};
use crate::poller::{Poller, ResultPayload};
use crate::prediction::request_prediction;
use crate::results::{PublishedResult, ResourceStore, ResultBoard, SVG_MIME};
use crate::task::{PredictionTasks, Slot};
use crate::timers::TimerTable;
use crate::upload::{AuthProvider, UploadFile, upload_image};

struct Cycle {
    id: u64,
    token: CancellationToken,
}

pub struct PlanUploader {
    api: Arc<ApiClient>,
    auth: Arc<dyn AuthProvider>,
    store: Arc<dyn ResourceStore>,
    poller: Poller,
    limits: UploadLimits,
    timers: Arc<TimerTable>,
    board: ResultBoard,
    cycle: Mutex<Cycle>,
}

impl PlanUploader {
    pub fn new(
        api: Arc<ApiClient>,
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn ResourceStore>,
        poll: PollConfig,
        limits: UploadLimits,
    ) -> Self {
        let poller = Poller::new(api.clone(), poll);
        Self {
            api,
            auth,
            store,
            poller,
            limits,
            timers: TimerTable::new(),
            board: ResultBoard::new(),
            cycle: Mutex::new(Cycle {
                id: 0,
                token: CancellationToken::new(),
            }),
        }
    }

    pub fn from_config(
        config: &ClientConfig,
        auth: Arc<dyn AuthProvider>,
        store: Arc<dyn ResourceStore>,
    ) -> Result<Self> {
        let api = Arc::new(ApiClient::new(config)?);
        Ok(Self::new(api, auth, store, config.poll, config.upload.clone()))
    }

    pub fn api(&self) -> &Arc<ApiClient> {
        &self.api
    }

    pub fn timers(&self) -> &Arc<TimerTable> {
        &self.timers
    }

    pub fn results(&self) -> &ResultBoard {
        &self.board
    }

    /// Id of the most recently started cycle (0 before the first upload).
    pub fn current_cycle(&self) -> u64 {
        self.lock_cycle().id
    }

    fn lock_cycle(&self) -> std::sync::MutexGuard<'_, Cycle> {
        self.cycle.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Supersede whatever cycle is running and reset every slot.
    fn begin_cycle(&self) -> (u64, CancellationToken) {
        let mut cycle = self.lock_cycle();
        cycle.token.cancel();
        self.timers.cancel_all();
        for previous in self.board.reset() {
            if let PublishedResult::Overlay(reference) = previous {
                self.store.revoke(&reference);
            }
        }

        cycle.id += 1;
        cycle.token = CancellationToken::new();
        (cycle.id, cycle.token.clone())
    }

    /// Cancel the running cycle, if any. Published results are kept.
    pub fn cancel(&self) {
        let cycle = self.lock_cycle();
        if !cycle.token.is_cancelled() {
            tracing::info!(cycle = cycle.id, "Cancelling upload cycle");
        }
        cycle.token.cancel();
        self.timers.cancel_all();
    }

    fn is_current(&self, cycle_id: u64) -> bool {
        let cycle = self.lock_cycle();
        cycle.id == cycle_id && !cycle.token.is_cancelled()
    }

    /// Convert a payload and publish it, unless `cycle_id` has been superseded.
    ///
    /// The store write runs outside the cycle lock; the result is committed
    /// under it, and revoked again if the cycle ended in between.
    fn publish(&self, cycle_id: u64, slot: Slot, payload: ResultPayload) -> Result<()> {
        if !self.is_current(cycle_id) {
            tracing::debug!(slot = %slot, cycle = cycle_id, "Dropping result of superseded cycle");
            return Err(ClientError::Superseded);
        }

        let result = match payload {
            ResultPayload::Svg(bytes) => {
                PublishedResult::Overlay(self.store.create(slot, bytes, SVG_MIME)?)
            }
            ResultPayload::Statistics(statistics) => PublishedResult::Statistics(statistics),
        };

        let cycle = self.lock_cycle();
        if cycle.id != cycle_id || cycle.token.is_cancelled() {
            drop(cycle);
            tracing::debug!(slot = %slot, cycle = cycle_id, "Cycle ended while storing result");
            if let PublishedResult::Overlay(reference) = &result {
                self.store.revoke(reference);
            }
            return Err(ClientError::Superseded);
        }
        self.board.publish(slot, result);
        drop(cycle);

        tracing::info!(slot = %slot, cycle = cycle_id, "Result published");
        Ok(())
    }

    async fn fetch_slot(
        &self,
        tasks: &PredictionTasks,
        slot: Slot,
        cycle_id: u64,
        token: &CancellationToken,
    ) -> Result<()> {
        let locator = tasks.locator(slot);
        let payload = self.poller.poll(&locator, &self.timers, slot, token).await?;
        self.publish(cycle_id, slot, payload)
    }

    /// Upload a plan and publish its five results as they become available.
    ///
    /// Fails with the first error of any step. A cycle superseded by a newer
    /// call fails with [`ClientError::Superseded`] and publishes nothing more.
    pub async fn upload_plan(&self, file: &UploadFile) -> Result<()> {
        let (cycle_id, token) = self.begin_cycle();
        let span = tracing::info_span!("upload_cycle", cycle = cycle_id, file = %file.name());

        let result = self
            .run_cycle(file, cycle_id, &token)
            .instrument(span.clone())
            .await;

        span.in_scope(|| match &result {
            Ok(()) => tracing::info!("All results published"),
            Err(e) if e.is_superseded() => tracing::info!("Upload cycle superseded"),
            Err(e) => tracing::error!(error = %e, "Upload cycle failed"),
        });
        result
    }

    async fn run_cycle(&self, file: &UploadFile, cycle_id: u64, token: &CancellationToken) -> Result<()> {
        let user = self.auth.current_user().await;
        let image_name = cancellable(
            token,
            upload_image(&self.api, self.auth.as_ref(), user.as_ref(), file, &self.limits),
        )
        .await?;
        let tasks = cancellable(token, request_prediction(&self.api, &image_name)).await?;

        tokio::try_join!(
            self.fetch_slot(&tasks, Slot::Walls, cycle_id, token),
            self.fetch_slot(&tasks, Slot::Icons, cycle_id, token),
            self.fetch_slot(&tasks, Slot::Spaces, cycle_id, token),
        )?;
        tracing::debug!("Geometric overlays ready, polling derived results");

        tokio::try_join!(
            self.fetch_slot(&tasks, Slot::Background, cycle_id, token),
            self.fetch_slot(&tasks, Slot::Statistics, cycle_id, token),
        )?;
        Ok(())
    }
}

async fn cancellable<T>(token: &CancellationToken, fut: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(ClientError::Superseded),
        result = fut => result,
    }
}
