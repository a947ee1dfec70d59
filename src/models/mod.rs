// Wire models (match the backend's JSON field names)

mod anomaly;
mod devices;
mod message;
mod network;
mod storage;
mod system;

pub use anomaly::{AnomalyEvent, AnomalyFilter, Category, Severity};
pub use devices::{GpuMetrics, Temperature, UsbDevice};
pub use message::{ErrorData, StreamMessage};
pub use network::NetworkMetrics;
pub use storage::DiskMetrics;
pub use system::{CpuMetrics, MemoryMetrics, Snapshot};
