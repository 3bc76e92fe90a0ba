//! Metrics collection using sysinfo.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::DateTime;
use sysinfo::{
    Components, CpuRefreshKind, Disks, MemoryRefreshKind, RefreshKind, System,
    MINIMUM_CPU_UPDATE_INTERVAL,
};

use crate::alerts::evaluate;
use crate::config::Thresholds;
use crate::error::ProviderError;
use crate::types::{round_to, HostInfo, Readings, Snapshot};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Source of point-in-time host readings.
///
/// Implementations may block briefly; callers run them on the blocking pool.
pub trait MetricsProvider: Send + Sync + 'static {
    fn read(&self) -> Result<Readings, ProviderError>;
}

pub type SharedProvider = Arc<dyn MetricsProvider>;

/// Query the provider off the async thread and derive the full snapshot.
pub async fn collect_snapshot(
    provider: &SharedProvider,
    thresholds: &Thresholds,
) -> Result<Snapshot, ProviderError> {
    let p = Arc::clone(provider);
    let readings = tokio::task::spawn_blocking(move || p.read()).await??;
    Ok(snapshot_from(readings, thresholds))
}

pub fn snapshot_from(readings: Readings, thresholds: &Thresholds) -> Snapshot {
    let alerts = evaluate(&readings, thresholds);
    Snapshot {
        uptime_formatted: format_uptime(readings.uptime_seconds),
        readings,
        alerts,
    }
}

/// "1d 2h 3m 4s"; leading zero units are dropped, seconds always shown.
pub fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    let s = secs % 60;

    let mut parts = Vec::with_capacity(4);
    if days > 0 {
        parts.push(format!("{days}d"));
    }
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    parts.push(format!("{s}s"));
    parts.join(" ")
}

fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    round_to(used as f64 / total as f64 * 100.0, 1)
}

fn gib(bytes: u64) -> f64 {
    round_to(bytes as f64 / GIB, 2)
}

/// Shortest window a CPU usage figure may cover. Reads closer together than
/// this reuse the previous figure instead of refreshing.
pub const CPU_WINDOW_MIN: Duration = Duration::from_millis(500);

/// How long a full set of readings is served from cache.
pub const READINGS_TTL: Duration = Duration::from_millis(250);

#[derive(Debug, PartialEq, Eq)]
enum CpuStep {
    WaitThenRefresh(Duration),
    Refresh,
    Reuse,
}

// `primed` is false until the first usable delta has been taken.
fn next_cpu_step(primed: bool, since: Duration) -> CpuStep {
    if !primed {
        return match MINIMUM_CPU_UPDATE_INTERVAL.checked_sub(since) {
            Some(rest) if !rest.is_zero() => CpuStep::WaitThenRefresh(rest),
            _ => CpuStep::Refresh,
        };
    }
    if since >= CPU_WINDOW_MIN.max(MINIMUM_CPU_UPDATE_INTERVAL) {
        CpuStep::Refresh
    } else {
        CpuStep::Reuse
    }
}

/// CPU usage is a delta between consecutive refreshes of the same `System`,
/// so the handle lives across reads together with the last figure.
struct CpuGauge {
    sys: System,
    refreshed_at: Instant,
    usage: Option<f64>,
}

impl CpuGauge {
    fn usage(&mut self) -> f64 {
        match next_cpu_step(self.usage.is_some(), self.refreshed_at.elapsed()) {
            CpuStep::WaitThenRefresh(rest) => {
                std::thread::sleep(rest);
                self.refresh();
            }
            CpuStep::Refresh => self.refresh(),
            CpuStep::Reuse => {}
        }
        self.usage.unwrap_or(0.0)
    }

    fn refresh(&mut self) {
        self.sys.refresh_cpu_usage();
        self.refreshed_at = Instant::now();
        let raw = self.sys.global_cpu_usage() as f64;
        self.usage = Some(round_to(raw.clamp(0.0, 100.0), 1));
    }
}

/// Host provider backed by persistent sysinfo handles.
pub struct SysinfoProvider {
    cpu: Mutex<CpuGauge>,
    disks: Mutex<Disks>,
    components: Mutex<Components>,
    cache: Mutex<Option<(Instant, Readings)>>,
}

impl Default for SysinfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoProvider {
    pub fn new() -> Self {
        let refresh_kind = RefreshKind::nothing()
            .with_cpu(CpuRefreshKind::nothing().with_cpu_usage())
            .with_memory(MemoryRefreshKind::nothing().with_ram());
        let mut sys = System::new_with_specifics(refresh_kind);
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        Self {
            cpu: Mutex::new(CpuGauge {
                sys,
                refreshed_at: Instant::now(),
                usage: None,
            }),
            disks: Mutex::new(Disks::new_with_refreshed_list()),
            components: Mutex::new(Components::new_with_refreshed_list()),
            cache: Mutex::new(None),
        }
    }

    fn cpu_temp(&self) -> Option<f64> {
        if let Some(t) = thermal_zone_temp() {
            return Some(t);
        }
        let mut components = lock(&self.components);
        components.refresh(false);
        best_cpu_temp(&components).map(|t| round_to(t as f64, 1))
    }

    fn read_fresh(&self) -> Result<Readings, ProviderError> {
        let (cpu_percent, mem_total, mem_used) = {
            let mut gauge = lock(&self.cpu);
            let cpu = gauge.usage();
            gauge.sys.refresh_memory();
            let total = gauge.sys.total_memory();
            (cpu, total, total.saturating_sub(gauge.sys.available_memory()))
        };

        let (disk_total, disk_used) = {
            let mut disks = lock(&self.disks);
            disks.refresh(false);
            // Prefer the root filesystem; fall back to the first listed disk.
            let disk = disks
                .iter()
                .find(|d| d.mount_point() == Path::new("/"))
                .or_else(|| disks.iter().next())
                .ok_or_else(|| ProviderError::Unavailable("no disks reported".into()))?;
            let total = disk.total_space();
            (total, total.saturating_sub(disk.available_space()))
        };

        Ok(Readings {
            cpu_percent,
            ram_percent: percent(mem_used, mem_total),
            ram_used_gb: gib(mem_used),
            ram_total_gb: gib(mem_total),
            disk_percent: percent(disk_used, disk_total),
            disk_used_gb: gib(disk_used),
            disk_total_gb: gib(disk_total),
            cpu_temp: self.cpu_temp(),
            uptime_seconds: System::uptime(),
        })
    }
}

/// Static host description. Blocking; run it on the blocking pool.
pub fn host_info() -> HostInfo {
    let sys = System::new_with_specifics(RefreshKind::nothing().with_cpu(CpuRefreshKind::nothing()));
    let processor = sys
        .cpus()
        .first()
        .map(|c| c.brand().trim().to_string())
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| "Unknown".to_string());
    let boot_time = i64::try_from(System::boot_time())
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .unwrap_or_default();

    HostInfo {
        hostname: System::host_name().unwrap_or_else(|| "unknown".to_string()),
        platform: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
        platform_version: System::kernel_version().unwrap_or_default(),
        architecture: System::cpu_arch(),
        processor,
        boot_time,
    }
}

/// Lock a handle, recovering from a poisoned Mutex if necessary.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// Raspberry Pi and most SBCs expose the SoC temperature here, in millidegrees.
fn thermal_zone_temp() -> Option<f64> {
    let raw = std::fs::read_to_string("/sys/class/thermal/thermal_zone0/temp").ok()?;
    let milli: f64 = raw.trim().parse().ok()?;
    Some(round_to(milli / 1000.0, 1))
}

fn best_cpu_temp(components: &Components) -> Option<f32> {
    components
        .iter()
        .filter(|c| {
            let label = c.label().to_lowercase();
            label.contains("cpu")
                || label.contains("package")
                || label.contains("tctl")
                || label.contains("tdie")
        })
        .filter_map(|c| c.temperature())
        .max_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
}

impl MetricsProvider for SysinfoProvider {
    fn read(&self) -> Result<Readings, ProviderError> {
        if let Some((at, r)) = lock(&self.cache).as_ref() {
            if at.elapsed() < READINGS_TTL {
                return Ok(r.clone());
            }
        }
        let r = self.read_fresh()?;
        *lock(&self.cache) = Some((Instant::now(), r.clone()));
        Ok(r)
    }
}
