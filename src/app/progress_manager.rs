//! Batch progress bar on stderr.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use thesis_downloader_core::BatchStats;
use tokio::task::JoinHandle;

const REFRESH: Duration = Duration::from_millis(150);
const TEMPLATE: &str = "{spinner} [{elapsed_precise}] {bar:30} {pos}/{len} {msg}";

/// Redraws counters from [`BatchStats`] until finished. Inert when disabled.
pub(crate) struct ProgressUi {
    stop: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl ProgressUi {
    pub(crate) fn start(enabled: bool, stats: Arc<BatchStats>, total: usize) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let task = enabled.then(|| tokio::spawn(redraw(stats, total, Arc::clone(&stop))));
        Self { stop, task }
    }

    #[cfg(test)]
    fn is_active(&self) -> bool {
        self.task.is_some()
    }

    /// Stops redrawing and clears the bar.
    pub(crate) async fn finish(self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(task) = self.task {
            let _ = task.await;
        }
    }
}

async fn redraw(stats: Arc<BatchStats>, total: usize, stop: Arc<AtomicBool>) {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template(TEMPLATE).unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.enable_steady_tick(REFRESH);

    while !stop.load(Ordering::SeqCst) {
        bar.set_position(stats.finished().min(total) as u64);
        bar.set_message(counters(&stats));
        tokio::time::sleep(REFRESH).await;
    }
    bar.finish_and_clear();
}

fn counters(stats: &BatchStats) -> String {
    let summary = stats.snapshot();
    format!(
        "saved {} | skipped {} | not found {} | retries {}",
        summary.saved,
        summary.skipped + summary.rejected,
        summary.failed,
        summary.retried
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_ui_spawns_nothing() {
        let ui = ProgressUi::start(false, Arc::new(BatchStats::default()), 3);
        assert!(!ui.is_active());
        ui.finish().await;
    }

    #[tokio::test]
    async fn test_enabled_ui_finishes_on_request() {
        let ui = ProgressUi::start(true, Arc::new(BatchStats::default()), 3);
        assert!(ui.is_active());
        ui.finish().await;
    }

    #[test]
    fn test_counters_start_at_zero() {
        assert_eq!(
            counters(&BatchStats::default()),
            "saved 0 | skipped 0 | not found 0 | retries 0"
        );
    }
}
