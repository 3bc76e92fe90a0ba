//! Start/stop coordination for the background tasks.
//!
//! `Stopped → Starting → Running → Stopping → Stopped`. Both tasks share one
//! cancellation token; stopping cancels it and waits for each task to leave
//! its loop, aborting a task only if it overruns the shutdown grace period.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::{JoinError, JoinHandle};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{LifecycleError, StoreError};
use crate::metrics::SharedProvider;
use crate::registry::ConnectionRegistry;
use crate::retention::run_sweeper;
use crate::sampler::run_sampler;
use crate::state::AppState;
use crate::store::SampleStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

struct BackgroundTasks {
    cancel: CancellationToken,
    sampler: JoinHandle<()>,
    sweeper: JoinHandle<()>,
}

pub struct Lifecycle {
    config: Arc<Config>,
    state: LifecycleState,
    tasks: Option<BackgroundTasks>,
}

impl Lifecycle {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            state: LifecycleState::Stopped,
            tasks: None,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Open the store at the configured path and launch the background tasks.
    pub async fn start(
        &mut self,
        provider: SharedProvider,
        registry: Arc<ConnectionRegistry>,
    ) -> Result<AppState, LifecycleError> {
        self.expect_state(LifecycleState::Stopped, "start")?;
        self.state = LifecycleState::Starting;

        let path = self.config.database_path.clone();
        let opened = tokio::task::spawn_blocking(move || SampleStore::open(&path))
            .await
            .map_err(StoreError::from)
            .and_then(|r| r);
        let store = match opened {
            Ok(store) => store,
            Err(e) => {
                self.state = LifecycleState::Stopped;
                return Err(LifecycleError::StoreInit(e));
            }
        };
        tracing::info!(path = %self.config.database_path.display(), "Database initialized");

        Ok(self.launch(store, provider, registry))
    }

    /// Launch the background tasks against an already opened store.
    pub fn start_with_store(
        &mut self,
        store: SampleStore,
        provider: SharedProvider,
        registry: Arc<ConnectionRegistry>,
    ) -> Result<AppState, LifecycleError> {
        self.expect_state(LifecycleState::Stopped, "start")?;
        self.state = LifecycleState::Starting;
        Ok(self.launch(store, provider, registry))
    }

    fn launch(
        &mut self,
        store: SampleStore,
        provider: SharedProvider,
        registry: Arc<ConnectionRegistry>,
    ) -> AppState {
        let state = AppState::new(Arc::clone(&self.config), provider, store, registry);
        let cancel = CancellationToken::new();
        let sampler = tokio::spawn(run_sampler(state.clone(), cancel.clone()));
        let sweeper = tokio::spawn(run_sweeper(
            state.store.clone(),
            self.config.retention,
            self.config.cleanup_interval,
            cancel.clone(),
        ));

        self.tasks = Some(BackgroundTasks {
            cancel,
            sampler,
            sweeper,
        });
        self.state = LifecycleState::Running;
        tracing::info!("Background tasks running");
        state
    }

    /// Cancel both tasks and wait for them to finish.
    pub async fn stop(&mut self) -> Result<(), LifecycleError> {
        self.expect_state(LifecycleState::Running, "stop")?;
        self.state = LifecycleState::Stopping;
        tracing::info!("Shutting down background tasks");

        if let Some(tasks) = self.tasks.take() {
            tasks.cancel.cancel();
            let grace = self.config.shutdown_grace;
            tokio::join!(
                join_task("sampler", tasks.sampler, grace),
                join_task("sweeper", tasks.sweeper, grace),
            );
        }

        self.state = LifecycleState::Stopped;
        tracing::info!("Background tasks stopped");
        Ok(())
    }

    fn expect_state(&self, want: LifecycleState, op: &'static str) -> Result<(), LifecycleError> {
        if self.state == want {
            Ok(())
        } else {
            Err(LifecycleError::InvalidState {
                op,
                state: self.state,
            })
        }
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        // Never leave loops running behind a dropped orchestrator.
        if let Some(tasks) = self.tasks.take() {
            tasks.cancel.cancel();
        }
    }
}

async fn join_task(name: &'static str, mut handle: JoinHandle<()>, grace: Duration) {
    match timeout(grace, &mut handle).await {
        Ok(res) => log_exit(name, res),
        Err(_) => {
            tracing::warn!(
                task = name,
                grace_ms = grace.as_millis() as u64,
                "Task overran shutdown grace, aborting"
            );
            handle.abort();
            log_exit(name, handle.await);
        }
    }
}

fn log_exit(name: &'static str, res: Result<(), JoinError>) {
    match res {
        Ok(()) => tracing::debug!(task = name, "Task exited"),
        // expected after abort
        Err(e) if e.is_cancelled() => tracing::debug!(task = name, "Task cancelled"),
        Err(e) => tracing::error!(task = name, error = %e, "Task panicked"),
    }
}
