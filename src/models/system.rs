// CPU, memory and the full snapshot model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{DiskMetrics, GpuMetrics, NetworkMetrics, Temperature, UsbDevice};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuMetrics {
    pub global_usage: f32,
    pub per_core: Vec<f32>,
    pub load_avg_1: f64,
    pub load_avg_5: f64,
    pub load_avg_15: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    pub total: u64,
    pub used: u64,
    pub available: u64,
    pub usage_percent: f32,
    pub swap_total: u64,
    pub swap_used: u64,
}

/// One timestamped telemetry reading. Never mutated once received; buffers only
/// append or replace whole snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub cpu: CpuMetrics,
    pub memory: MemoryMetrics,
    #[serde(default)]
    pub temperatures: Vec<Temperature>,
    #[serde(default)]
    pub disks: Vec<DiskMetrics>,
    #[serde(default)]
    pub usb_devices: Vec<UsbDevice>,
    pub network: NetworkMetrics,
    /// Absent on hosts without a supported GPU.
    #[serde(default)]
    pub gpu: Option<GpuMetrics>,
}

impl Snapshot {
    /// Hottest sensor reading, if any sensor reported.
    pub fn max_temperature(&self) -> Option<f32> {
        self.temperatures
            .iter()
            .map(|t| t.value)
            .fold(None, |acc, v| match acc {
                Some(m) if m >= v => Some(m),
                _ => Some(v),
            })
    }
}
