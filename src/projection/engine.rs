//! Projection workers.
//!
//! One runner per projection. A runner applies batches of events past its
//! cursor; concurrent callers (workers, `catch_up`, `rebuild`) serialize on
//! the runner's lock so a batch is never applied twice.

use std::sync::Arc;

use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::Projection;
use crate::config::ProjectionsConfig;
use crate::error::{Error, Result};
use crate::model::AggregateType;
use crate::storage::{EventFilter, EventStore, PositionStore};
use crate::utils::metrics::MetricsSink;

struct ProjectionRunner {
    projection: Arc<dyn Projection>,
    lock: Mutex<()>,
}

/// Drives a set of projections from the event log.
pub struct ProjectionEngine {
    events: Arc<dyn EventStore>,
    positions: Arc<dyn PositionStore>,
    runners: Vec<Arc<ProjectionRunner>>,
    metrics: Arc<dyn MetricsSink>,
    config: ProjectionsConfig,
}

/// Handle to running projection workers.
pub struct ProjectionHandle {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ProjectionHandle {
    /// Signal all workers to stop and wait for them.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Projection worker ended abnormally");
            }
        }
    }
}

impl ProjectionEngine {
    pub fn new(
        events: Arc<dyn EventStore>,
        positions: Arc<dyn PositionStore>,
        projections: Vec<Arc<dyn Projection>>,
        metrics: Arc<dyn MetricsSink>,
        config: ProjectionsConfig,
    ) -> Self {
        let runners = projections
            .into_iter()
            .map(|projection| {
                Arc::new(ProjectionRunner {
                    projection,
                    lock: Mutex::new(()),
                })
            })
            .collect();
        Self {
            events,
            positions,
            runners,
            metrics,
            config,
        }
    }

    /// Prepare for a fresh process.
    ///
    /// Views live in memory, so stored positions from an earlier process no
    /// longer describe them. All positions are reset and views rebuilt from
    /// the log on the next catch-up.
    pub async fn init(&self) -> Result<()> {
        for runner in &self.runners {
            let _guard = runner.lock.lock().await;
            runner.projection.reset().await;
            self.positions.reset(runner.projection.name()).await?;
        }
        info!(projections = self.runners.len(), "Projections initialized");
        Ok(())
    }

    /// Aggregate types consumed by a projection, if registered.
    pub fn aggregate_types(&self, projection: &str) -> Option<&'static [AggregateType]> {
        self.runner(projection).map(|r| r.projection.aggregate_types())
    }

    pub fn projection_names(&self) -> Vec<&'static str> {
        self.runners.iter().map(|r| r.projection.name()).collect()
    }

    fn runner(&self, projection: &str) -> Option<&Arc<ProjectionRunner>> {
        self.runners
            .iter()
            .find(|r| r.projection.name() == projection)
    }

    /// Apply every committed event to every projection.
    pub async fn catch_up(&self) -> Result<()> {
        for runner in &self.runners {
            self.drain(runner).await?;
        }
        Ok(())
    }

    /// Reset one projection and replay the log into it.
    pub async fn rebuild(&self, projection: &str) -> Result<()> {
        let runner = self
            .runner(projection)
            .ok_or_else(|| Error::NotFound(format!("projection {projection}")))?;
        {
            let _guard = runner.lock.lock().await;
            runner.projection.reset().await;
            self.positions.reset(projection).await?;
        }
        info!(projection, "Rebuilding projection");
        self.drain(runner).await
    }

    async fn drain(&self, runner: &ProjectionRunner) -> Result<()> {
        while self.run_once(runner).await? >= self.config.batch_size {}
        Ok(())
    }

    /// Apply one batch. Returns the number of events applied.
    async fn run_once(&self, runner: &ProjectionRunner) -> Result<usize> {
        let _guard = runner.lock.lock().await;
        let projection = &runner.projection;
        let name = projection.name();

        let cursor = self.positions.get_cursor(name).await?;
        let latest = self.events.latest_position().await?;
        if latest <= cursor {
            return Ok(0);
        }

        let filter = EventFilter::new()
            .aggregate_types(projection.aggregate_types().iter().copied())
            .position_greater(cursor)
            .limit(self.config.batch_size)
            .await_open_transactions();
        let batch = self.events.query(&filter).await?;

        let mut last = cursor;
        for event in &batch {
            projection.reduce(event).await?;
            self.positions
                .put(name, event.aggregate_type, &event.aggregate_id, event.sequence)
                .await?;
            last = event.position;
        }

        // A short batch saw everything committed up to `latest` that this
        // projection consumes.
        let next = if batch.len() < self.config.batch_size {
            latest.max(last)
        } else {
            last
        };
        self.positions.put_cursor(name, next).await?;

        if !batch.is_empty() {
            debug!(projection = name, events = batch.len(), cursor = next, "Applied batch");
            self.metrics.events_applied(name, batch.len() as u64);
            projection.report(self.metrics.as_ref()).await;
        }
        Ok(batch.len())
    }

    /// Spawn one worker per projection.
    ///
    /// Workers wake on append notifications and on the poll interval.
    pub fn start(self: &Arc<Self>) -> ProjectionHandle {
        let (shutdown, rx) = watch::channel(false);
        let tasks = self
            .runners
            .iter()
            .map(|runner| {
                let engine = Arc::clone(self);
                let runner = Arc::clone(runner);
                let shutdown = rx.clone();
                tokio::spawn(async move { engine.work(runner, shutdown).await })
            })
            .collect();
        info!(workers = self.runners.len(), "Projection workers started");
        ProjectionHandle { shutdown, tasks }
    }

    async fn work(&self, runner: Arc<ProjectionRunner>, mut shutdown: watch::Receiver<bool>) {
        let name = runner.projection.name();
        let mut notifications = self.events.subscribe();
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if let Err(e) = self.drain(&runner).await {
                error!(projection = name, error = %e, "Projection batch failed");
            }

            tokio::select! {
                _ = shutdown.changed() => break,
                received = notifications.recv() => match received {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => {
                        warn!(projection = name, "Append notifications closed");
                        break;
                    }
                },
                _ = ticker.tick() => {}
            }
        }
        debug!(projection = name, "Projection worker stopped");
    }
}
