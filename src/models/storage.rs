// Disk models

use serde::{Deserialize, Serialize};

/// Space usage plus read/write throughput (MB/s) for one mounted disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskMetrics {
    pub name: String,
    pub mount_point: String,
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub usage_percent: f32,
    pub read_mb: f64,
    pub write_mb: f64,
}
