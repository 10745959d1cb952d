use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

use parley_db::{Database, format_ts};

const BATCH_LIMIT: i64 = 500;
pub const DEFAULT_INTERVAL_SECS: u64 = 3600;

/// Each policy is gated by its own retention period; an absent period
/// disables just that policy.
#[derive(Debug, Clone, Copy)]
pub struct RetentionConfig {
    pub message_days: Option<i64>,
    pub notification_days: Option<i64>,
    pub report_days: Option<i64>,
    pub interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            message_days: None,
            notification_days: None,
            report_days: None,
            interval_secs: DEFAULT_INTERVAL_SECS,
        }
    }
}

impl RetentionConfig {
    /// `PARLEY_SWEEP_DISABLED=1` turns the whole sweeper off regardless of
    /// the per-policy settings (test/ephemeral environments).
    pub fn from_env() -> anyhow::Result<Self> {
        if matches!(
            std::env::var("PARLEY_SWEEP_DISABLED").as_deref(),
            Ok("1") | Ok("true")
        ) {
            return Ok(Self::default());
        }

        Ok(Self {
            message_days: env_days("PARLEY_RETAIN_MESSAGES_DAYS")?,
            notification_days: env_days("PARLEY_RETAIN_NOTIFICATIONS_DAYS")?,
            report_days: env_days("PARLEY_RETAIN_REPORTS_DAYS")?,
            interval_secs: match std::env::var("PARLEY_SWEEP_INTERVAL_SECS") {
                Ok(raw) => raw
                    .parse()
                    .map_err(|e| anyhow::anyhow!("invalid PARLEY_SWEEP_INTERVAL_SECS '{raw}': {e}"))?,
                Err(_) => DEFAULT_INTERVAL_SECS,
            },
        })
    }

    pub fn any_enabled(&self) -> bool {
        self.message_days.is_some()
            || self.notification_days.is_some()
            || self.report_days.is_some()
    }
}

fn env_days(key: &str) -> anyhow::Result<Option<i64>> {
    match std::env::var(key) {
        Ok(raw) => {
            let days: i64 = raw
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid {key} '{raw}': {e}"))?;
            Ok(Some(days))
        }
        Err(_) => Ok(None),
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepStats {
    pub messages_purged: usize,
    pub previews_refreshed: usize,
    pub notifications_purged: usize,
    pub reports_purged: usize,
}

/// Background task that purges aged messages, notifications and resolved
/// reports.
///
/// The interval loop is non-reentrant (a tick waits for the previous sweep)
/// and each policy runs in isolation: one failing policy is logged and the
/// others still run. Deletes are batched so a sweep never holds the
/// connection long enough to starve foreground requests.
pub struct RetentionSweeper {
    db: Arc<Database>,
    config: RetentionConfig,
    clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>,
}

impl RetentionSweeper {
    pub fn new(db: Arc<Database>, config: RetentionConfig) -> Self {
        Self {
            db,
            config,
            clock: Arc::new(Utc::now),
        }
    }

    /// Overrides the clock used for retention thresholds.
    #[cfg(test)]
    pub fn with_clock(mut self, clock: Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    /// Runs the sweep loop in the background. Aborting the returned handle
    /// is the stop side of the lifecycle.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(self.config.interval_secs));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.run_once().await;
            }
        })
    }

    /// Executes one sweep across all enabled policies.
    pub async fn run_once(&self) -> SweepStats {
        let now = (self.clock)();
        let mut stats = SweepStats::default();

        if let Some(days) = self.config.message_days {
            match self.purge_messages(now - ChronoDuration::days(days)).await {
                Ok((purged, refreshed)) => {
                    stats.messages_purged = purged;
                    stats.previews_refreshed = refreshed;
                    if purged > 0 {
                        info!("Sweep: purged {} aged messages, refreshed {} previews", purged, refreshed);
                    }
                }
                Err(e) => error!("message retention sweep failed: {:#}", e),
            }
        }

        if let Some(days) = self.config.notification_days {
            match self.purge_notifications(now - ChronoDuration::days(days)).await {
                Ok(purged) => {
                    stats.notifications_purged = purged;
                    if purged > 0 {
                        info!("Sweep: purged {} aged notifications", purged);
                    }
                }
                Err(e) => error!("notification retention sweep failed: {:#}", e),
            }
        }

        if let Some(days) = self.config.report_days {
            match self.purge_reports(now - ChronoDuration::days(days)).await {
                Ok(purged) => {
                    stats.reports_purged = purged;
                    if purged > 0 {
                        info!("Sweep: purged {} aged resolved reports", purged);
                    }
                }
                Err(e) => error!("report retention sweep failed: {:#}", e),
            }
        }

        stats
    }

    async fn purge_messages(&self, cutoff: DateTime<Utc>) -> anyhow::Result<(usize, usize)> {
        let cutoff = format_ts(cutoff);
        let mut total = 0;
        let mut conversations: BTreeSet<String> = BTreeSet::new();

        loop {
            let db = self.db.clone();
            let cutoff = cutoff.clone();
            let (deleted, touched) =
                tokio::task::spawn_blocking(move || db.purge_messages_batch(&cutoff, BATCH_LIMIT))
                    .await??;
            if deleted == 0 {
                break;
            }
            total += deleted;
            conversations.extend(touched);
        }

        // Previews are recomputed once per touched conversation, not once
        // per purged message.
        let refreshed = conversations.len();
        if refreshed > 0 {
            let db = self.db.clone();
            tokio::task::spawn_blocking(move || {
                for conversation_id in &conversations {
                    db.refresh_conversation_preview(conversation_id)?;
                }
                Ok::<_, anyhow::Error>(())
            })
            .await??;
        }

        Ok((total, refreshed))
    }

    async fn purge_notifications(&self, cutoff: DateTime<Utc>) -> anyhow::Result<usize> {
        let cutoff = format_ts(cutoff);
        let mut total = 0;

        loop {
            let db = self.db.clone();
            let cutoff = cutoff.clone();
            let deleted = tokio::task::spawn_blocking(move || {
                db.purge_notifications_batch(&cutoff, BATCH_LIMIT)
            })
            .await??;
            if deleted == 0 {
                break;
            }
            total += deleted;
        }

        Ok(total)
    }

    async fn purge_reports(&self, cutoff: DateTime<Utc>) -> anyhow::Result<usize> {
        let cutoff = format_ts(cutoff);
        let mut total = 0;

        loop {
            let db = self.db.clone();
            let cutoff = cutoff.clone();
            let deleted = tokio::task::spawn_blocking(move || {
                db.purge_resolved_reports_batch(&cutoff, BATCH_LIMIT)
            })
            .await??;
            if deleted == 0 {
                break;
            }
            total += deleted;
        }

        Ok(total)
    }
}
