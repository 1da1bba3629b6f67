//! Archiver (spec §4.6): scheduled job that migrates completed days to
//! object storage and advances the archival watermark. Grounded on
//! `recorder-node::retention::executor::RetentionExecutor` — same shape
//! (per-item upload loop, log-and-continue on individual failures, a
//! single summary at the end).

use std::str::FromStr;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::catalog::LAST_ARCHIVING_DATE_KEY;
use crate::error::GatewayError;
use crate::manager::Manager;
use crate::metrics;
use crate::storage::{ObjectStore, PLAYLIST_CONTENT_TYPE, SEGMENT_CONTENT_TYPE};
use crate::stream::make_m3u8_tags;

const DAY_FORMAT: &str = "%Y%m%d";
/// Fallback watermark when none has ever been written (spec §4.6 step 1).
const DEFAULT_WATERMARK_LOOKBACK_DAYS: i64 = 7;

pub struct Archiver {
    manager: Arc<Manager>,
    store: Arc<ObjectStore>,
    tz: Tz,
    cancel: CancellationToken,
}

impl Archiver {
    pub fn new(manager: Arc<Manager>, store: Arc<ObjectStore>, tz: Tz, cancel: CancellationToken) -> Self {
        Self {
            manager,
            store,
            tz,
            cancel,
        }
    }

    /// Run until cancelled, firing `run_once` at each cron-scheduled
    /// boundary in the configured timezone.
    pub async fn run(self, cron_expr: String) {
        let schedule = match Schedule::from_str(&cron_expr) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, cron = %cron_expr, "invalid archive_cron expression, archiver disabled");
                return;
            }
        };

        loop {
            let Some(next) = schedule.upcoming(Utc).next() else {
                warn!("archive schedule produced no upcoming fire time, archiver disabled");
                return;
            };
            let wait = (next - Utc::now()).to_std().unwrap_or(std::time::Duration::ZERO);

            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("archiver stopped");
                    return;
                }
                _ = tokio::time::sleep(wait) => {
                    if let Err(e) = self.run_once().await {
                        error!(error = %e, "archive run failed");
                    }
                }
            }
        }
    }

    /// One archival pass (spec §4.6 steps 1-4).
    pub async fn run_once(&self) -> Result<(), GatewayError> {
        let last = self.watermark()?;
        let expected = yesterday(&self.tz);

        if last == expected {
            self.manager
                .catalog()
                .put_config(LAST_ARCHIVING_DATE_KEY, format_day(expected).as_bytes())?;
            return Ok(());
        }

        if last > expected {
            return Err(GatewayError::invalid_system_time(format!(
                "archival watermark {} is after expected {}",
                format_day(last),
                format_day(expected)
            )));
        }

        let mut cursor = last;
        while cursor <= expected {
            let day = format_day(cursor);
            match self.archive_day(&day).await {
                Ok(()) => metrics::ARCHIVE_DAYS_TOTAL.inc(),
                Err(e) => {
                    metrics::ARCHIVE_ERRORS_TOTAL.inc();
                    error!(day = %day, error = %e, "archive_day failed");
                }
            }
            cursor += ChronoDuration::days(1);
        }

        self.manager
            .catalog()
            .put_config(LAST_ARCHIVING_DATE_KEY, format_day(expected).as_bytes())?;
        Ok(())
    }

    fn watermark(&self) -> Result<NaiveDate, GatewayError> {
        match self.manager.catalog().get_config(LAST_ARCHIVING_DATE_KEY)? {
            Some(bytes) => {
                let s = String::from_utf8(bytes)
                    .map_err(|e| GatewayError::storage(format!("watermark is not utf8: {e}")))?;
                parse_day(&s)
            }
            None => Ok(yesterday(&self.tz) - ChronoDuration::days(DEFAULT_WATERMARK_LOOKBACK_DAYS - 1)),
        }
    }

    /// Upload every segment and a reconstructed playlist for `day`, across
    /// every stream that has segments on it (spec §4.6 `archive_day`).
    async fn archive_day(&self, day: &str) -> Result<(), GatewayError> {
        for target in self.manager.archive_targets().await {
            let segments = target.store.iter_segments(day)?;
            if segments.is_empty() {
                continue;
            }

            for seg in &segments {
                let path = target.live_dir.join(&seg.uri);
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|e| GatewayError::storage(format!("read segment {}: {e}", path.display())))?;
                let key = format!("{}/{}/{}", target.id, day, seg.uri);
                self.store
                    .put_object(&key, bytes, SEGMENT_CONTENT_TYPE)
                    .await?;
            }

            let playlist = make_m3u8_tags(&segments, false);
            let playlist_key = format!("{}/{}/{}", target.id, day, target.protocol_info.playlist_name);
            self.store
                .put_object(&playlist_key, playlist.into_bytes(), PLAYLIST_CONTENT_TYPE)
                .await?;

            self.manager.catalog().mark_video_day(target.id, day)?;
        }
        Ok(())
    }
}

fn format_day(date: NaiveDate) -> String {
    date.format(DAY_FORMAT).to_string()
}

fn parse_day(s: &str) -> Result<NaiveDate, GatewayError> {
    NaiveDate::parse_from_str(s, DAY_FORMAT)
        .map_err(|e| GatewayError::storage(format!("invalid day {s}: {e}")))
}

fn yesterday(tz: &Tz) -> NaiveDate {
    Utc::now().with_timezone(tz).date_naive() - ChronoDuration::days(1)
}
