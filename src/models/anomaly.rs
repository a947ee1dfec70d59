// Anomaly events and the filter used by presentation layers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Ordered: `Info < Warning < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Cpu,
    Memory,
    Temperature,
    Disk,
    Usb,
    Network,
    Gpu,
    System,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Cpu => "Cpu",
            Category::Memory => "Memory",
            Category::Temperature => "Temperature",
            Category::Disk => "Disk",
            Category::Usb => "Usb",
            Category::Network => "Network",
            Category::Gpu => "Gpu",
            Category::System => "System",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub category: Category,
    pub message: String,
    /// Supplementary readings that triggered the event, keyed by metric name.
    #[serde(default)]
    pub metrics: BTreeMap<String, serde_json::Value>,
}

/// Severity / category / free-text filter over an anomaly list.
/// Empty sets and an empty search match everything.
#[derive(Debug, Clone, Default)]
pub struct AnomalyFilter {
    pub severities: Vec<Severity>,
    pub categories: Vec<Category>,
    pub search: Option<String>,
}

impl AnomalyFilter {
    pub fn matches(&self, event: &AnomalyEvent) -> bool {
        if !self.severities.is_empty() && !self.severities.contains(&event.severity) {
            return false;
        }
        if !self.categories.is_empty() && !self.categories.contains(&event.category) {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                event.message.to_lowercase().contains(&needle)
                    || event.category.as_str().to_lowercase().contains(&needle)
            }
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(severity: Severity, category: Category, message: &str) -> AnomalyEvent {
        AnomalyEvent {
            id: "a1".into(),
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
            severity,
            category,
            message: message.into(),
            metrics: BTreeMap::new(),
        }
    }

    #[test]
    fn severity_is_ordered() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
        assert_eq!(
            [Severity::Critical, Severity::Info, Severity::Warning]
                .into_iter()
                .max(),
            Some(Severity::Critical)
        );
    }

    #[test]
    fn empty_filter_matches_everything() {
        let f = AnomalyFilter::default();
        assert!(f.matches(&event(Severity::Info, Category::Usb, "usb hub timeout")));
    }

    #[test]
    fn filter_combines_severity_category_and_search() {
        let f = AnomalyFilter {
            severities: vec![Severity::Critical],
            categories: vec![Category::Temperature, Category::Cpu],
            search: Some("  PACKAGE ".into()),
        };
        assert!(f.matches(&event(
            Severity::Critical,
            Category::Temperature,
            "Package temperature at 95C"
        )));
        assert!(!f.matches(&event(
            Severity::Warning,
            Category::Temperature,
            "Package temperature at 80C"
        )));
        assert!(!f.matches(&event(Severity::Critical, Category::Disk, "package cache full")));
        assert!(!f.matches(&event(Severity::Critical, Category::Cpu, "load spike")));
    }

    #[test]
    fn search_also_matches_category_name() {
        let f = AnomalyFilter {
            search: Some("memory".into()),
            ..Default::default()
        };
        assert!(f.matches(&event(Severity::Warning, Category::Memory, "swap usage high")));
    }
}
