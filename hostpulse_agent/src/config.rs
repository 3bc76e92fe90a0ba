//! Process configuration, read once at startup and shared as `Arc<Config>`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_PORT: u16 = 8000;

/// Alert thresholds. Percentages for CPU/RAM/disk, °C for temperature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub cpu_percent: f64,
    pub ram_percent: f64,
    pub disk_percent: f64,
    pub temp_celsius: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_percent: 80.0,
            ram_percent: 80.0,
            disk_percent: 90.0,
            temp_celsius: 70.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub database_path: PathBuf,
    pub collection_interval: Duration,
    pub retention: Duration,
    pub cleanup_interval: Duration,
    pub heartbeat_interval: Duration,
    pub shutdown_grace: Duration,
    pub thresholds: Thresholds,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            database_path: PathBuf::from("./data/metrics.db"),
            collection_interval: Duration::from_secs(2),
            retention: Duration::from_secs(24 * 3600),
            cleanup_interval: Duration::from_secs(3600),
            heartbeat_interval: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(5),
            thresholds: Thresholds::default(),
        }
    }
}

/// What the command line asked for.
#[derive(Debug, PartialEq)]
pub enum Invocation {
    Run(Config),
    Help(String),
}

fn env_value<T: FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match env(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| ConfigError::Invalid {
                key: key.to_string(),
                value: raw,
            }),
    }
}

fn env_secs(
    env: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: Duration,
    scale: u64,
) -> Result<Duration, ConfigError> {
    match env_value::<u64>(env, key)? {
        None => Ok(default),
        Some(0) => Err(ConfigError::Zero(key)),
        Some(n) => Ok(Duration::from_secs(n.saturating_mul(scale))),
    }
}

impl Config {
    /// Build from the process environment and `std::env::args()`.
    pub fn from_env_and_args() -> Result<Invocation, ConfigError> {
        Self::load(std::env::args(), |k| std::env::var(k).ok())
    }

    /// Environment first, then flags on top. `args` includes the program name.
    pub fn load<I, F>(args: I, env: F) -> Result<Invocation, ConfigError>
    where
        I: IntoIterator<Item = String>,
        F: Fn(&str) -> Option<String>,
    {
        let d = Config::default();
        let mut cfg = Config {
            port: env_value(&env, "HOSTPULSE_PORT")?.unwrap_or(d.port),
            database_path: env("HOSTPULSE_DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or(d.database_path),
            collection_interval: env_secs(
                &env,
                "HOSTPULSE_COLLECTION_INTERVAL",
                d.collection_interval,
                1,
            )?,
            retention: env_secs(&env, "HOSTPULSE_RETENTION_HOURS", d.retention, 3600)?,
            cleanup_interval: env_secs(&env, "HOSTPULSE_CLEANUP_INTERVAL", d.cleanup_interval, 1)?,
            heartbeat_interval: env_secs(
                &env,
                "HOSTPULSE_WS_HEARTBEAT_INTERVAL",
                d.heartbeat_interval,
                1,
            )?,
            shutdown_grace: env_secs(&env, "HOSTPULSE_SHUTDOWN_GRACE", d.shutdown_grace, 1)?,
            thresholds: Thresholds {
                cpu_percent: env_value(&env, "HOSTPULSE_CPU_ALERT_THRESHOLD")?
                    .unwrap_or(d.thresholds.cpu_percent),
                ram_percent: env_value(&env, "HOSTPULSE_RAM_ALERT_THRESHOLD")?
                    .unwrap_or(d.thresholds.ram_percent),
                disk_percent: env_value(&env, "HOSTPULSE_DISK_ALERT_THRESHOLD")?
                    .unwrap_or(d.thresholds.disk_percent),
                temp_celsius: env_value(&env, "HOSTPULSE_TEMP_ALERT_THRESHOLD")?
                    .unwrap_or(d.thresholds.temp_celsius),
            },
        };

        let mut it = args.into_iter();
        let prog = it.next().unwrap_or_else(|| "hostpulse_agent".into());
        while let Some(arg) = it.next() {
            match arg.as_str() {
                "-h" | "--help" => {
                    return Ok(Invocation::Help(format!(
                        "Usage: {prog} [--port PORT|-p PORT] [--db PATH]"
                    )));
                }
                "--port" | "-p" => {
                    let v = it.next().ok_or_else(|| ConfigError::MissingValue {
                        flag: arg.clone(),
                    })?;
                    cfg.port = parse_port(&v)?;
                }
                "--db" => {
                    let v = it.next().ok_or_else(|| ConfigError::MissingValue {
                        flag: arg.clone(),
                    })?;
                    cfg.database_path = PathBuf::from(v);
                }
                _ if arg.starts_with("--port=") => {
                    if let Some((_, v)) = arg.split_once('=') {
                        cfg.port = parse_port(v)?;
                    }
                }
                _ if arg.starts_with("--db=") => {
                    if let Some((_, v)) = arg.split_once('=') {
                        cfg.database_path = PathBuf::from(v);
                    }
                }
                _ => return Err(ConfigError::UnexpectedArg(arg)),
            }
        }
        Ok(Invocation::Run(cfg))
    }
}

fn parse_port(v: &str) -> Result<u16, ConfigError> {
    v.parse::<u16>().map_err(|_| ConfigError::Invalid {
        key: "--port".into(),
        value: v.to_string(),
    })
}
