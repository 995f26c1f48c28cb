use figure_judge_common::config::RetentionConfig;
use figure_judge_frames::FrameStore;
use std::time::Duration;
use tracing::{debug, error, info};

/// Periodically deletes stored frames older than `max_age_secs`.
///
/// A no-op for the inline store. Runs until the task is dropped.
pub async fn run_retention_loop(store: FrameStore, config: RetentionConfig) {
    let FrameStore::Disk { .. } = store else {
        return;
    };
    let interval = Duration::from_secs(config.check_interval_secs.max(1));
    let max_age = Duration::from_secs(config.max_age_secs);
    info!(
        interval_secs = interval.as_secs(),
        max_age_secs = config.max_age_secs,
        "frame retention loop started"
    );

    loop {
        tokio::time::sleep(interval).await;
        match sweep_once(store.clone(), max_age).await {
            Ok(0) => debug!("retention sweep found nothing to delete"),
            Ok(removed) => info!(removed, "retention sweep deleted expired frames"),
            Err(e) => error!(error = %e, "retention sweep failed"),
        }
    }
}

async fn sweep_once(store: FrameStore, max_age: Duration) -> Result<usize, String> {
    tokio::task::spawn_blocking(move || store.sweep(max_age))
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())
}
