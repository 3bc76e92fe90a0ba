#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hostpulse_agent::config::Config;
use hostpulse_agent::error::ProviderError;
use hostpulse_agent::metrics::MetricsProvider;
use hostpulse_agent::types::Readings;

pub fn readings() -> Readings {
    Readings {
        cpu_percent: 37.5,
        ram_percent: 61.2,
        ram_used_gb: 2.38,
        ram_total_gb: 3.88,
        disk_percent: 44.0,
        disk_used_gb: 12.8,
        disk_total_gb: 29.1,
        cpu_temp: Some(51.3),
        uptime_seconds: 86_461,
    }
}

/// Always returns the same readings and counts calls.
#[derive(Default)]
pub struct FixedProvider {
    pub calls: AtomicUsize,
}

impl MetricsProvider for FixedProvider {
    fn read(&self) -> Result<Readings, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(readings())
    }
}

/// Fails every other call, starting with the first.
#[derive(Default)]
pub struct FlakyProvider {
    calls: AtomicUsize,
}

impl MetricsProvider for FlakyProvider {
    fn read(&self) -> Result<Readings, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n % 2 == 0 {
            Err(ProviderError::Unavailable(format!("flaky read #{n}")))
        } else {
            Ok(readings())
        }
    }
}

/// Hangs on its first call, then answers immediately.
#[derive(Default)]
pub struct StallOnceProvider {
    pub calls: AtomicUsize,
}

impl MetricsProvider for StallOnceProvider {
    fn read(&self) -> Result<Readings, ProviderError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            std::thread::sleep(Duration::from_secs(2));
        }
        Ok(readings())
    }
}

pub fn config(interval: Duration) -> Arc<Config> {
    Arc::new(Config {
        collection_interval: interval,
        heartbeat_interval: Duration::from_secs(1),
        shutdown_grace: Duration::from_secs(2),
        ..Config::default()
    })
}
