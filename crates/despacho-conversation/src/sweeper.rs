// SPDX-FileCopyrightText: 2026 Despacho Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic accounting of active and lapsed conversations.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use despacho_core::{ConversationStore, DespachoError};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub active: i64,
    /// Conversations that expired without reaching a terminal state since
    /// the previous sweep.
    pub expired: i64,
}

pub struct ConversationSweeper {
    store: Arc<dyn ConversationStore>,
    last_sweep: Mutex<DateTime<Utc>>,
}

impl ConversationSweeper {
    pub fn new(store: Arc<dyn ConversationStore>, started_at: DateTime<Utc>) -> Self {
        Self {
            store,
            last_sweep: Mutex::new(started_at),
        }
    }

    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, DespachoError> {
        let mut last = self.last_sweep.lock().await;
        let active = self.store.count_active(now).await?;
        let expired = self.store.count_expired_between(*last, now).await?;
        *last = now;

        despacho_prometheus::set_active_conversations(active as f64);
        if expired > 0 {
            despacho_prometheus::record_expired_conversations(expired as u64);
            info!(expired, "conversations expired without an answer");
        }
        Ok(SweepReport { active, expired })
    }

    /// Sweep every `interval` until `cancel` fires.
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        // Skip the first immediate tick.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep(Utc::now()).await {
                        Ok(report) => debug!(active = report.active, expired = report.expired, "conversation sweep"),
                        Err(e) => warn!(error = %e, "conversation sweep failed (non-fatal)"),
                    }
                }
                _ = cancel.cancelled() => {
                    info!("conversation sweeper shutting down");
                    break;
                }
            }
        }
    }
}
