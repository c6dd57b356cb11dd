//! 上传文件的过期清理后台任务。

use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::storage::Storage;

/// 全局过期策略；`max_age` 为空表示不清理。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpiryPolicy {
    pub max_age: Option<Duration>,
    pub interval: Duration,
}

impl ExpiryPolicy {
    pub fn from_hours(hours: u64, interval: Duration) -> Self {
        Self {
            max_age: (hours > 0).then(|| Duration::from_secs(hours.saturating_mul(60 * 60))),
            interval,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_age.is_some()
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    pub failed: usize,
}

/// 启动过期清理任务；策略关闭时不启动。
pub fn spawn_expiry_sweeper(
    storage: Arc<Storage>,
    policy: ExpiryPolicy,
    shutdown: CancellationToken,
) -> Option<JoinHandle<()>> {
    let max_age = policy.max_age?;
    info!(
        hours = max_age.as_secs() / 3600,
        "uploaded files will be removed automatically after expiry"
    );

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(policy.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("expiry sweeper stopped");
                    break;
                }
                _ = interval.tick() => {
                    debug!(path = ?storage.root_path(), "scan expired files");
                    let report = sweep_expired(&storage, max_age, SystemTime::now()).await;
                    info!(
                        scanned = report.scanned,
                        removed = report.removed,
                        failed = report.failed,
                        "expiry sweep finished"
                    );
                }
            }
        }
    }))
}

/// 删除根目录下修改时间早于 `now - max_age` 的条目（不递归）。
pub async fn sweep_expired(storage: &Storage, max_age: Duration, now: SystemTime) -> SweepReport {
    let scan = storage.scan_root().await;
    if let Some(err) = &scan.error {
        warn!(path = ?storage.root_path(), error = %err, "list upload directory failed");
    }

    let mut report = SweepReport {
        scanned: scan.entries.len(),
        ..SweepReport::default()
    };
    for entry in &scan.entries {
        let Some(modified) = entry.modified else {
            continue;
        };
        let Ok(age) = now.duration_since(modified) else {
            continue;
        };
        if age <= max_age {
            continue;
        }

        match storage.remove_entry(entry).await {
            Ok(()) => {
                info!(path = ?entry.path, "expired, deleted");
                report.removed += 1;
            }
            Err(err) => {
                warn!(path = ?entry.path, error = %err, "failed to remove expired entry");
                report.failed += 1;
            }
        }
    }

    report
}
