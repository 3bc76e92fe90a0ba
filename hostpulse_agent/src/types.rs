//! Data types sent to viewers and stored in the history table.
//! Keep this module minimal and stable; it defines the wire format.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Raw numeric readings for one instant, as returned by a metrics provider.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Readings {
    pub cpu_percent: f64,
    pub ram_percent: f64,
    pub ram_used_gb: f64,
    pub ram_total_gb: f64,
    pub disk_percent: f64,
    pub disk_used_gb: f64,
    pub disk_total_gb: f64,
    // absent on hosts without a usable sensor
    pub cpu_temp: Option<f64>,
    pub uptime_seconds: u64,
}

/// One tick's view of the host: readings plus everything derived from them.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Snapshot {
    #[serde(flatten)]
    pub readings: Readings,
    pub uptime_formatted: String,
    pub alerts: Vec<String>,
}

/// A persisted sample. `id` and `timestamp` are assigned by the store.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Sample {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub readings: Readings,
}

/// Live update pushed to every connected viewer.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MetricsEvent {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Snapshot,
    pub timestamp: String,
}

impl MetricsEvent {
    pub fn new(data: Snapshot, at: DateTime<Utc>) -> Self {
        Self {
            kind: "metrics".to_string(),
            data,
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CpuStats {
    pub avg: f64,
    pub max: f64,
    pub min: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RamStats {
    pub avg: f64,
    pub max: f64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TempStats {
    pub avg: Option<f64>,
    pub max: Option<f64>,
}

/// Aggregates over a trailing time window.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct WindowStats {
    pub period_hours: u32,
    pub sample_count: u64,
    pub cpu: CpuStats,
    pub ram: RamStats,
    pub temperature: TempStats,
}

/// Static host description served by `/api/system`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct HostInfo {
    pub hostname: String,
    pub platform: String,
    pub platform_version: String,
    pub architecture: String,
    pub processor: String,
    pub boot_time: DateTime<Utc>,
}

/// Round to `places` decimals, the way every figure on the wire is shown.
pub fn round_to(v: f64, places: i32) -> f64 {
    let f = 10f64.powi(places);
    (v * f).round() / f
}
