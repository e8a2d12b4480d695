//! 照片目录中遗留临时文件的后台清理任务。

use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::warn;

use crate::config::TEMP_SWEEP_INTERVAL_SECS;
use crate::store::PhotoStore;

/// 启动后台任务；`temp_ttl` 为 0 时不启动。
pub fn spawn_background_tasks(store: Arc<PhotoStore>, temp_ttl: Duration) {
    if temp_ttl.is_zero() {
        return;
    }

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(TEMP_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            if let Err(err) = store
                .remove_stale_temp_files(temp_ttl, SystemTime::now())
                .await
            {
                warn!(error = %err, "stale temp file cleanup failed");
            }
        }
    });
}
