//! Operator trigger surface.
//!
//! Every way a job can start funnels through here: the automatic scan
//! picks the oldest uncatalogued item, the manual path lets the single
//! authorized operator pick one by id. Both paths go through the same
//! orchestrator, so the single-flight rule holds no matter who asked.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use clipvault_catalog::Catalog;
use clipvault_feed::FeedScanner;
use clipvault_shared::{ClipvaultError, FeedItem, Result};

use crate::job::JobStage;
use crate::pipeline::{Orchestrator, RunReport};

/// Where candidate items come from.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// New items, oldest first.
    async fn scan(&self, existing_ids: &HashSet<String>) -> Vec<FeedItem>;

    /// Up to `limit` new items in feed order, for selection menus.
    async fn preview(&self, existing_ids: &HashSet<String>, limit: usize) -> Vec<FeedItem>;
}

#[async_trait]
impl FeedSource for FeedScanner {
    async fn scan(&self, existing_ids: &HashSet<String>) -> Vec<FeedItem> {
        FeedScanner::scan(self, existing_ids).await
    }

    async fn preview(&self, existing_ids: &HashSet<String>, limit: usize) -> Vec<FeedItem> {
        FeedScanner::preview(self, existing_ids, limit).await
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// What an operator asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Show uncatalogued items available for processing.
    ListPending,
    /// Process one item by its external id.
    ProcessItem(String),
    /// Report whether a job is running, and in which stage.
    QueryStatus,
}

/// Result of handling an operator action.
#[derive(Debug)]
pub enum Outcome {
    /// Pending items, in feed order.
    Pending(Vec<FeedItem>),
    /// A job ran to completion.
    Completed(RunReport),
    /// Current busy/stage snapshot.
    Status(StatusSnapshot),
}

/// Point-in-time view of the job slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub busy: bool,
    pub stage: Option<JobStage>,
}

// ---------------------------------------------------------------------------
// Trigger surface
// ---------------------------------------------------------------------------

/// Entry point for both scheduled and operator-driven processing.
pub struct TriggerSurface {
    feed: Arc<dyn FeedSource>,
    catalog: Arc<dyn Catalog>,
    orchestrator: Arc<Orchestrator>,
    authorized_id: String,
    preview_limit: usize,
}

impl TriggerSurface {
    pub fn new(
        feed: Arc<dyn FeedSource>,
        catalog: Arc<dyn Catalog>,
        orchestrator: Arc<Orchestrator>,
        authorized_id: impl Into<String>,
        preview_limit: usize,
    ) -> Self {
        Self {
            feed,
            catalog,
            orchestrator,
            authorized_id: authorized_id.into(),
            preview_limit,
        }
    }

    /// Whether `operator_id` is the configured operator. An empty
    /// configuration authorizes nobody.
    pub fn authorize(&self, operator_id: &str) -> bool {
        !self.authorized_id.is_empty() && operator_id == self.authorized_id
    }

    /// Scheduled trigger: process the oldest uncatalogued item, if any.
    ///
    /// Returns `Ok(None)` when the feed has nothing new. A concurrent
    /// job surfaces as [`ClipvaultError::Busy`] and the tick is simply
    /// skipped, never queued.
    #[instrument(skip_all)]
    pub async fn trigger_automatic(&self) -> Result<Option<RunReport>> {
        // Reject before the catalog sync and feed fetch: both touch the
        // same checkout and network the running job is using.
        if self.orchestrator.lock().is_busy() {
            return Err(ClipvaultError::Busy);
        }

        let existing = self.catalogued_ids().await?;
        let mut pending = self.feed.scan(&existing).await;
        if pending.is_empty() {
            info!("no new items in the feed");
            return Ok(None);
        }

        let next = pending.remove(0);
        info!(item_id = %next.id, queued_behind = pending.len(), "processing oldest new item");
        let report = self.orchestrator.run(next).await?;
        Ok(Some(report))
    }

    /// Operator-driven trigger for one item by id.
    ///
    /// The item must still be pending: already-catalogued or unknown
    /// ids are rejected rather than reprocessed.
    #[instrument(skip_all, fields(item_id = %item_id))]
    pub async fn trigger_manual(&self, operator_id: &str, item_id: &str) -> Result<RunReport> {
        if !self.authorize(operator_id) {
            warn!(operator_id, "rejected unauthorized trigger");
            return Err(ClipvaultError::config("operator not authorized"));
        }
        if self.orchestrator.lock().is_busy() {
            return Err(ClipvaultError::Busy);
        }

        let existing = self.catalogued_ids().await?;
        let pending = self.feed.scan(&existing).await;
        let item = pending
            .into_iter()
            .find(|item| item.id == item_id)
            .ok_or_else(|| {
                ClipvaultError::feed(format!("item {item_id} is not pending processing"))
            })?;

        self.orchestrator.run(item).await
    }

    /// Pending items in feed order, bounded by the preview limit.
    pub async fn list_pending(&self, operator_id: &str) -> Result<Vec<FeedItem>> {
        if !self.authorize(operator_id) {
            return Err(ClipvaultError::config("operator not authorized"));
        }
        let existing = self.catalogued_ids().await?;
        Ok(self.feed.preview(&existing, self.preview_limit).await)
    }

    /// Busy/stage snapshot of the job slot.
    pub fn query_status(&self) -> StatusSnapshot {
        let lock = self.orchestrator.lock();
        StatusSnapshot {
            busy: lock.is_busy(),
            stage: lock.current_stage(),
        }
    }

    /// Dispatch one operator action. Every variant is gated on the
    /// configured operator.
    pub async fn handle(&self, operator_id: &str, action: Action) -> Result<Outcome> {
        if !self.authorize(operator_id) {
            warn!(operator_id, ?action, "rejected unauthorized action");
            return Err(ClipvaultError::config("operator not authorized"));
        }

        match action {
            Action::ListPending => Ok(Outcome::Pending(self.list_pending(operator_id).await?)),
            Action::ProcessItem(item_id) => Ok(Outcome::Completed(
                self.trigger_manual(operator_id, &item_id).await?,
            )),
            Action::QueryStatus => Ok(Outcome::Status(self.query_status())),
        }
    }

    async fn catalogued_ids(&self) -> Result<HashSet<String>> {
        let entries = self.catalog.load().await?;
        Ok(entries.into_iter().map(|e| e.id).collect())
    }
}
