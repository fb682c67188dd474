//! Processing updates for multiple fonts with a bounded worker pool.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::atomic::{AtomicUsize, Ordering},
};

use log::{error, info, warn};
use rayon::{prelude::*, ThreadPoolBuilder};

use super::{FontReport, Pipeline};
use crate::{FontError, UpdateInfo, VersionLedger};

/// Outcome of processing a single font update.
#[derive(Debug)]
pub struct FontOutcome {
    /// Processed update.
    pub update: UpdateInfo,
    /// Processing result.
    pub result: Result<FontReport, FontError>,
}

impl FontOutcome {
    /// Checks whether the font was processed successfully, i.e., all its variants succeeded.
    pub fn is_success(&self) -> bool {
        self.result.as_ref().is_ok_and(FontReport::is_success)
    }
}

/// Report on processing a fleet of font updates.
#[derive(Debug, Default)]
pub struct FleetReport {
    /// Per-font outcomes in the order of the processed updates.
    pub fonts: Vec<FontOutcome>,
}

impl FleetReport {
    /// Iterates over successfully processed updates.
    pub fn succeeded(&self) -> impl Iterator<Item = &UpdateInfo> + '_ {
        self.fonts
            .iter()
            .filter(|outcome| outcome.is_success())
            .map(|outcome| &outcome.update)
    }

    /// Iterates over updates that failed completely or partially.
    pub fn failed(&self) -> impl Iterator<Item = &UpdateInfo> + '_ {
        self.fonts
            .iter()
            .filter(|outcome| !outcome.is_success())
            .map(|outcome| &outcome.update)
    }

    /// Returns the number of successfully processed fonts.
    pub fn success_count(&self) -> usize {
        self.succeeded().count()
    }

    /// Returns the number of failed fonts.
    pub fn failure_count(&self) -> usize {
        self.fonts.len() - self.success_count()
    }

    /// Records versions of successfully processed fonts in the ledger. Failed fonts are not
    /// recorded, so that they are retried on the next run.
    pub fn update_ledger(&self, ledger: &mut VersionLedger) -> usize {
        let mut count = 0;
        for update in self.succeeded() {
            let updated_at = update.published_at.as_deref().unwrap_or_default();
            ledger.record(&update.name, &update.version, updated_at);
            count += 1;
        }
        count
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_owned()
    }
}

impl Pipeline {
    /// Processes font updates using up to `max_workers` concurrent workers.
    ///
    /// If there is more than one update and `max_workers > 1`, fonts are processed on a dedicated
    /// thread pool with `min(max_workers, updates.len())` threads; otherwise, sequentially
    /// on the current thread. Failures (including panics) are isolated to the font they occur in.
    pub fn process_fleet(&self, updates: &[UpdateInfo], max_workers: usize) -> FleetReport {
        let completed = AtomicUsize::new(0);
        let process = |update: &UpdateInfo| self.process_isolated(update, &completed, updates.len());

        let fonts = if updates.len() > 1 && max_workers > 1 {
            let worker_count = max_workers.min(updates.len());
            info!(
                "Processing {} fonts with {worker_count} workers",
                updates.len()
            );
            let pool = ThreadPoolBuilder::new()
                .num_threads(worker_count)
                .thread_name(|idx| format!("font-worker-{idx}"))
                .build();
            match pool {
                Ok(pool) => pool.install(|| updates.par_iter().map(process).collect()),
                Err(err) => {
                    warn!("Failed creating worker pool, processing fonts sequentially: {err}");
                    updates.iter().map(process).collect()
                }
            }
        } else {
            updates.iter().map(process).collect()
        };

        let report = FleetReport { fonts };
        info!(
            "Processed {} fonts: {} succeeded, {} failed",
            report.fonts.len(),
            report.success_count(),
            report.failure_count()
        );
        report
    }

    fn process_isolated(
        &self,
        update: &UpdateInfo,
        completed: &AtomicUsize,
        total: usize,
    ) -> FontOutcome {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.process_update(update)))
            .unwrap_or_else(|payload| Err(FontError::Panicked(panic_message(payload.as_ref()))));

        let idx = completed.fetch_add(1, Ordering::Relaxed) + 1;
        let name = &update.name;
        match &result {
            Ok(report) if report.is_success() => info!("[{idx}/{total}] Finished {name}"),
            Ok(report) => {
                let failed = report.failed_variants().count();
                error!("[{idx}/{total}] Finished {name} with {failed} failed variant(s)");
            }
            Err(err) => error!("[{idx}/{total}] Failed processing {name}: {err}"),
        }
        FontOutcome {
            update: update.clone(),
            result,
        }
    }
}
