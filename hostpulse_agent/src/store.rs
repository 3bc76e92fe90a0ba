//! Sample history in SQLite.
//!
//! `rusqlite` is synchronous, so every statement runs on tokio's blocking pool
//! behind one connection mutex. SQLite gives per-statement atomicity; callers
//! need no extra locking.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{StoreError, StoreResult};
use crate::types::{round_to, CpuStats, RamStats, Readings, Sample, TempStats, WindowStats};

pub(crate) const SAMPLES_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS samples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp INTEGER NOT NULL,
    cpu_percent REAL NOT NULL,
    ram_percent REAL NOT NULL,
    ram_used_gb REAL NOT NULL,
    ram_total_gb REAL NOT NULL,
    disk_percent REAL NOT NULL,
    disk_used_gb REAL NOT NULL,
    disk_total_gb REAL NOT NULL,
    cpu_temp REAL,
    uptime_seconds INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_samples_time ON samples(timestamp);
";

const SELECT_COLUMNS: &str = "id, timestamp, cpu_percent, ram_percent, ram_used_gb, ram_total_gb, \
     disk_percent, disk_used_gb, disk_total_gb, cpu_temp, uptime_seconds";

/// Source of insertion timestamps. Swappable so tests can age rows.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

struct Inner {
    conn: Connection,
    // Highest timestamp handed out so far (unix ms); keeps timestamps monotonic
    // even if the wall clock steps backwards.
    last_ms: i64,
}

#[derive(Clone)]
pub struct SampleStore {
    inner: Arc<Mutex<Inner>>,
    clock: Clock,
}

impl SampleStore {
    /// Open (creating if needed) the database file and its parent directory.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn, Arc::new(Utc::now))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Self::from_connection(Connection::open_in_memory()?, Arc::new(Utc::now))
    }

    pub fn with_clock(self, clock: Clock) -> Self {
        Self { clock, ..self }
    }

    fn from_connection(conn: Connection, clock: Clock) -> StoreResult<Self> {
        conn.execute_batch(SAMPLES_SCHEMA)?;
        let last_ms: Option<i64> =
            conn.query_row("SELECT MAX(timestamp) FROM samples", [], |r| r.get(0))?;
        tracing::info!(last_ms = ?last_ms, "Sample store ready");
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner {
                conn,
                last_ms: last_ms.unwrap_or(i64::MIN),
            })),
            clock,
        })
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<F, R>(&self, f: F) -> StoreResult<R>
    where
        F: FnOnce(&mut Inner) -> StoreResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut guard = lock(&inner);
            f(&mut guard)
        })
        .await?
    }

    /// Append one sample; id and timestamp are assigned here.
    pub async fn insert(&self, readings: Readings) -> StoreResult<Sample> {
        let now_ms = self.now().timestamp_millis();
        let r = sanitize(readings);
        self.run(move |inner| {
            let ts = now_ms.max(inner.last_ms);
            inner.conn.execute(
                "INSERT INTO samples (timestamp, cpu_percent, ram_percent, ram_used_gb, ram_total_gb,
                    disk_percent, disk_used_gb, disk_total_gb, cpu_temp, uptime_seconds)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    ts,
                    r.cpu_percent,
                    r.ram_percent,
                    r.ram_used_gb,
                    r.ram_total_gb,
                    r.disk_percent,
                    r.disk_used_gb,
                    r.disk_total_gb,
                    r.cpu_temp,
                    i64::try_from(r.uptime_seconds).unwrap_or(i64::MAX),
                ],
            )?;
            inner.last_ms = ts;
            let id = inner.conn.last_insert_rowid();
            Ok(Sample {
                id,
                timestamp: to_datetime(ts)?,
                readings: r,
            })
        })
        .await
    }

    /// Delete every sample strictly older than `cutoff`. Returns rows removed.
    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let cutoff_ms = cutoff.timestamp_millis();
        self.run(move |inner| {
            Ok(inner
                .conn
                .execute("DELETE FROM samples WHERE timestamp < ?1", params![cutoff_ms])?)
        })
        .await
    }

    /// Samples at or after `since`, newest first, at most `limit`.
    pub async fn history(&self, since: DateTime<Utc>, limit: u32) -> StoreResult<Vec<Sample>> {
        let since_ms = since.timestamp_millis();
        self.run(move |inner| {
            let mut stmt = inner.conn.prepare_cached(&format!(
                "SELECT {SELECT_COLUMNS} FROM samples WHERE timestamp >= ?1
                 ORDER BY timestamp DESC, id DESC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![since_ms, limit], raw_row)?;
            let mut out = Vec::new();
            for row in rows {
                out.push(into_sample(row?)?);
            }
            Ok(out)
        })
        .await
    }

    pub async fn latest(&self) -> StoreResult<Option<Sample>> {
        self.run(|inner| {
            let raw = inner
                .conn
                .query_row(
                    &format!(
                        "SELECT {SELECT_COLUMNS} FROM samples ORDER BY timestamp DESC, id DESC LIMIT 1"
                    ),
                    [],
                    raw_row,
                )
                .optional()?;
            raw.map(into_sample).transpose()
        })
        .await
    }

    /// Aggregates over samples at or after `since`.
    pub async fn stats(&self, since: DateTime<Utc>, period_hours: u32) -> StoreResult<WindowStats> {
        let since_ms = since.timestamp_millis();
        self.run(move |inner| {
            let stats = inner.conn.query_row(
                "SELECT COUNT(id), AVG(cpu_percent), MAX(cpu_percent), MIN(cpu_percent),
                        AVG(ram_percent), MAX(ram_percent), AVG(cpu_temp), MAX(cpu_temp)
                 FROM samples WHERE timestamp >= ?1",
                params![since_ms],
                |r| {
                    let one = |v: Option<f64>| v.map(|x| round_to(x, 1));
                    let zero = |v: Option<f64>| one(v).unwrap_or(0.0);
                    Ok(WindowStats {
                        period_hours,
                        sample_count: r.get::<_, i64>(0)?.max(0) as u64,
                        cpu: CpuStats {
                            avg: zero(r.get(1)?),
                            max: zero(r.get(2)?),
                            min: zero(r.get(3)?),
                        },
                        ram: RamStats {
                            avg: zero(r.get(4)?),
                            max: zero(r.get(5)?),
                        },
                        temperature: TempStats {
                            avg: one(r.get(6)?),
                            max: one(r.get(7)?),
                        },
                    })
                },
            )?;
            Ok(stats)
        })
        .await
    }

    #[cfg(test)]
    pub(crate) async fn execute_batch(&self, sql: &'static str) -> StoreResult<()> {
        self.run(move |inner| Ok(inner.conn.execute_batch(sql)?)).await
    }

    pub async fn count(&self) -> StoreResult<u64> {
        self.run(|inner| {
            let n: i64 = inner
                .conn
                .query_row("SELECT COUNT(*) FROM samples", [], |r| r.get(0))?;
            Ok(n.max(0) as u64)
        })
        .await
    }
}

/// Lock the connection, recovering from a poisoned Mutex if necessary.
fn lock(m: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// Stored figures are never negative; NaN collapses to zero as well.
fn sanitize(r: Readings) -> Readings {
    Readings {
        cpu_percent: r.cpu_percent.max(0.0),
        ram_percent: r.ram_percent.max(0.0),
        ram_used_gb: r.ram_used_gb.max(0.0),
        ram_total_gb: r.ram_total_gb.max(0.0),
        disk_percent: r.disk_percent.max(0.0),
        disk_used_gb: r.disk_used_gb.max(0.0),
        disk_total_gb: r.disk_total_gb.max(0.0),
        cpu_temp: r.cpu_temp.map(|t| t.max(0.0)),
        uptime_seconds: r.uptime_seconds,
    }
}

fn to_datetime(ms: i64) -> StoreResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(StoreError::BadTimestamp(ms))
}

fn raw_row(r: &Row<'_>) -> rusqlite::Result<(i64, i64, Readings)> {
    Ok((
        r.get(0)?,
        r.get(1)?,
        Readings {
            cpu_percent: r.get(2)?,
            ram_percent: r.get(3)?,
            ram_used_gb: r.get(4)?,
            ram_total_gb: r.get(5)?,
            disk_percent: r.get(6)?,
            disk_used_gb: r.get(7)?,
            disk_total_gb: r.get(8)?,
            cpu_temp: r.get(9)?,
            uptime_seconds: r.get::<_, i64>(10)?.max(0) as u64,
        },
    ))
}

fn into_sample((id, ms, readings): (i64, i64, Readings)) -> StoreResult<Sample> {
    Ok(Sample {
        id,
        timestamp: to_datetime(ms)?,
        readings,
    })
}
