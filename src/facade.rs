//! Palisade facade for in-process usage.
//!
//! Wires storage, the command processor, projections and the consistency
//! coordinator together behind two entry points, `execute` and `query`.
//!
//! # Example
//!
//! ```ignore
//! use palisade::{Command, Config, Palisade, PermissionContext, Query};
//!
//! let palisade = Palisade::builder(Config::in_memory()).build().await?;
//! let workers = palisade.start_projections();
//!
//! let ctx = PermissionContext::new("org1", "user1");
//! let receipt = palisade.execute(&ctx, command).await?;
//! let group = palisade
//!     .query(&ctx, Query::GetGroup { group_id }, Some(&receipt))
//!     .await?;
//!
//! workers.stop().await;
//! ```

use std::sync::Arc;

use tracing::info;

use crate::authz::PermissionContext;
use crate::cascade::CascadeResolver;
use crate::command::{Command, CommandProcessor};
use crate::config::{Config, ConfigError};
use crate::consistency::{CancelSignal, Clock, Coordinator, TokioClock};
use crate::error::{Error, Result};
use crate::model::{ChangeReceipt, Event};
use crate::projection::{self, ProjectionEngine, ProjectionHandle, ReadModel};
use crate::query::{Query, QueryProcessor, QueryResult};
use crate::repository::{SnapshotRepository, WriteModelRepository};
use crate::storage::{init_storage, EventFilter, Stores};
use crate::utils::metrics::{MetricsSink, NoopMetricsSink};

/// Errors while assembling a [`Palisade`].
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage setup failed: {0}")]
    Storage(Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Core(#[from] Error),
}

/// Builder for [`Palisade`].
pub struct PalisadeBuilder {
    config: Config,
    stores: Option<Stores>,
    metrics: Arc<dyn MetricsSink>,
    clock: Arc<dyn Clock>,
}

impl PalisadeBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            stores: None,
            metrics: Arc::new(NoopMetricsSink),
            clock: Arc::new(TokioClock::default()),
        }
    }

    /// Use existing stores instead of opening the configured ones.
    pub fn with_stores(mut self, stores: Stores) -> Self {
        self.stores = Some(stores);
        self
    }

    pub fn with_metrics(mut self, metrics: impl MetricsSink + 'static) -> Self {
        self.metrics = Arc::new(metrics);
        self
    }

    /// Clock used by the consistency coordinator.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub async fn build(self) -> std::result::Result<Palisade, SetupError> {
        self.config.validate()?;
        let stores = match self.stores {
            Some(stores) => stores,
            None => init_storage(&self.config.storage)
                .await
                .map_err(SetupError::Storage)?,
        };

        let snapshots = &self.config.storage.snapshots;
        let repository = Arc::new(WriteModelRepository::new(
            stores.events.clone(),
            SnapshotRepository::with_config(
                stores.snapshots.clone(),
                snapshots.read,
                snapshots.write,
            ),
            snapshots.interval,
        ));

        let view = ReadModel::new();
        let engine = Arc::new(ProjectionEngine::new(
            stores.events.clone(),
            stores.positions.clone(),
            projection::standard(&view),
            self.metrics,
            self.config.projections.clone(),
        ));
        engine.init().await?;

        let cascade = CascadeResolver::new(repository.clone(), engine.clone(), view.clone());
        let commands = CommandProcessor::new(repository, cascade, self.config.instance_id.clone());
        let coordinator = Coordinator::new(
            stores.positions.clone(),
            self.clock,
            &self.config.consistency,
        );

        info!(
            instance_id = %self.config.instance_id,
            projections = ?engine.projection_names(),
            "Palisade ready"
        );

        Ok(Palisade {
            stores,
            commands,
            queries: QueryProcessor::new(view),
            engine,
            coordinator,
        })
    }
}

/// The core, assembled.
pub struct Palisade {
    stores: Stores,
    commands: CommandProcessor,
    queries: QueryProcessor,
    engine: Arc<ProjectionEngine>,
    coordinator: Coordinator,
}

impl Palisade {
    pub fn builder(config: Config) -> PalisadeBuilder {
        PalisadeBuilder::new(config)
    }

    /// Build with default metrics and clock.
    pub async fn from_config(config: Config) -> std::result::Result<Self, SetupError> {
        PalisadeBuilder::new(config).build().await
    }

    /// Execute a command and return the receipt of its primary aggregate.
    pub async fn execute(&self, ctx: &PermissionContext, command: Command) -> Result<ChangeReceipt> {
        self.commands.execute(ctx, command).await
    }

    /// Run a query. With a receipt, waits until the projection serving the
    /// query reflects it.
    pub async fn query(
        &self,
        ctx: &PermissionContext,
        query: Query,
        consistency: Option<&ChangeReceipt>,
    ) -> Result<QueryResult> {
        self.query_cancellable(ctx, query, consistency, &CancelSignal::never())
            .await
    }

    /// [`query`](Self::query) that gives up with `Cancelled` when `cancel`
    /// fires while waiting.
    pub async fn query_cancellable(
        &self,
        ctx: &PermissionContext,
        query: Query,
        consistency: Option<&ChangeReceipt>,
        cancel: &CancelSignal,
    ) -> Result<QueryResult> {
        if let Some(receipt) = consistency {
            let projection = query.projection();
            let tracks = self.engine.aggregate_types(projection).unwrap_or(&[]);
            self.coordinator
                .wait(projection, tracks, receipt, cancel)
                .await?;
        }
        self.queries.execute(ctx, query).await
    }

    /// Events matching `filter`. Callers without instance-wide permission
    /// only see events owned by their org.
    pub async fn events(&self, ctx: &PermissionContext, filter: EventFilter) -> Result<Vec<Event>> {
        let filter = if ctx.global {
            filter
        } else {
            filter.resource_owner(ctx.org_id.clone())
        };
        Ok(self.stores.events.query(&filter).await?)
    }

    /// Spawn the projection workers.
    pub fn start_projections(&self) -> ProjectionHandle {
        self.engine.start()
    }

    /// Apply every committed event to every projection now.
    pub async fn catch_up(&self) -> Result<()> {
        self.engine.catch_up().await
    }

    /// Replay the log into one projection from scratch.
    pub async fn rebuild(&self, projection: &str) -> Result<()> {
        self.engine.rebuild(projection).await
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }
}
