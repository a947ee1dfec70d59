// Temperature sensors, USB devices and GPU

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Temperature {
    pub sensor: String,
    /// Degrees Celsius.
    pub value: f32,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsbDevice {
    pub id: String,
    pub manufacturer: String,
    pub product: String,
    /// Device stopped answering within the collector's probe timeout.
    pub has_timeout: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuMetrics {
    pub name: String,
    pub temperature: f32,
    pub usage_percent: f32,
    pub memory_usage_percent: f32,
    pub memory_total_mb: u64,
    pub memory_used_mb: u64,
    pub memory_free_mb: u64,
    pub power_draw_watts: f32,
    pub fan_speed_percent: f32,
}
