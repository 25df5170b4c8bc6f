//! The top-level handle over an ordered record store.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::info;

use crate::Result;
use crate::backend::BackendImpl;
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, ConfigError};
use crate::diagnostics::{DiagnosticReport, diagnose_group};
use crate::hooks::{MoveHookCollection, MoveObserver};
use crate::mover::{MoveOutcome, MoveRequest, Mover};
use crate::position::PositionAlgebra;
use crate::rebalance::{GapRebalancer, GapStatistics};
use crate::record::{Record, RecordId};

struct BoardInner {
    backend: Arc<dyn BackendImpl>,
    config: Config,
    clock: Arc<dyn Clock>,
    algebra: PositionAlgebra,
    rebalancer: GapRebalancer,
    mover: Mover,
    hooks: Arc<MoveHookCollection>,
}

/// Groups of ordered records over a storage backend.
///
/// Board is a cheap-to-clone handle; clones share the backend, the
/// configuration and the registered observers.
///
/// ## Example
///
/// ```
/// # use ordinal::{backend::database::InMemory, Board, MoveRequest};
/// # #[tokio::main]
/// # async fn main() -> ordinal::Result<()> {
/// let board = Board::open(Box::new(InMemory::new()));
///
/// let first = board.create_record("todo", serde_json::json!({"title": "a"})).await?;
/// let second = board.create_record("todo", serde_json::json!({"title": "b"})).await?;
///
/// // Drag the second card to the top of the column.
/// let request = MoveRequest::new(second.id.clone(), "todo").before(first.id.clone());
/// board.move_record(&request).await?;
///
/// let order: Vec<_> = board.list_group("todo").await?.into_iter().map(|r| r.id).collect();
/// assert_eq!(order, vec![second.id, first.id]);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Board {
    inner: Arc<BoardInner>,
}

impl std::fmt::Debug for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Board")
            .field("config", &self.inner.config)
            .field("driver", &self.inner.backend.driver())
            .finish_non_exhaustive()
    }
}

impl Board {
    /// Open a board with the default configuration.
    pub fn open(backend: Box<dyn BackendImpl>) -> Self {
        Self::build(Arc::from(backend), Config::default(), Arc::new(SystemClock))
    }

    /// Open a board with an explicit configuration.
    ///
    /// Fails if the configuration does not validate, or asks for more
    /// fractional digits than the backend stores.
    pub fn open_with_config(backend: Box<dyn BackendImpl>, config: Config) -> Result<Self> {
        check_config(backend.as_ref(), &config)?;
        Ok(Self::build(Arc::from(backend), config, Arc::new(SystemClock)))
    }

    /// Open a board with a custom clock for controllable timestamps.
    ///
    /// Only available with the `testing` feature or in test builds.
    #[cfg(any(test, feature = "testing"))]
    pub fn open_with_clock(
        backend: Box<dyn BackendImpl>,
        config: Config,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        check_config(backend.as_ref(), &config)?;
        Ok(Self::build(Arc::from(backend), config, clock))
    }

    fn build(backend: Arc<dyn BackendImpl>, config: Config, clock: Arc<dyn Clock>) -> Self {
        let algebra = PositionAlgebra::new(config.position.clone());
        let rebalancer =
            GapRebalancer::new(backend.clone(), algebra.clone(), config.moves.max_retries);
        let hooks = Arc::new(MoveHookCollection::new());
        let mover = Mover::new(
            backend.clone(),
            rebalancer.clone(),
            config.moves.clone(),
            hooks.clone(),
            clock.clone(),
        );
        Self {
            inner: Arc::new(BoardInner {
                backend,
                config,
                clock,
                algebra,
                rebalancer,
                mover,
                hooks,
            }),
        }
    }

    /// The storage backend.
    pub fn backend(&self) -> &Arc<dyn BackendImpl> {
        &self.inner.backend
    }

    /// The configuration in use.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The position algebra configured for this board.
    pub fn algebra(&self) -> &PositionAlgebra {
        &self.inner.algebra
    }

    /// Register an observer for completed moves.
    pub fn add_observer(&self, observer: Arc<dyn MoveObserver>) {
        self.inner.hooks.add_hook(observer);
    }

    /// Create a record at the end of `group`.
    pub async fn create_record(&self, group: &str, payload: serde_json::Value) -> Result<Record> {
        self.inner.mover.append(group, payload).await
    }

    /// Create records between two neighbours, in order.
    ///
    /// See [`Mover::insert_between`].
    pub async fn insert_between(
        &self,
        group: &str,
        after: Option<&RecordId>,
        before: Option<&RecordId>,
        payloads: Vec<serde_json::Value>,
    ) -> Result<Vec<Record>> {
        self.inner
            .mover
            .insert_between(group, after, before, payloads)
            .await
    }

    /// Store a record without a position.
    ///
    /// It sorts after every positioned record of the group and receives a
    /// position the next time the group is rebalanced.
    pub async fn import_unpositioned(
        &self,
        group: &str,
        payload: serde_json::Value,
    ) -> Result<Record> {
        let record = Record {
            id: RecordId::generate(),
            group: group.to_string(),
            position: None,
            payload,
            created_at: self.inner.clock.now_millis(),
        };
        self.inner.backend.insert(record.clone()).await?;
        info!(record_id = %record.id, group, "Imported unpositioned record");
        Ok(record)
    }

    /// Move a record. See [`Mover::move_record`].
    pub async fn move_record(&self, request: &MoveRequest) -> Result<MoveOutcome> {
        self.inner.mover.move_record(request).await
    }

    /// Fetch a record.
    pub async fn get_record(&self, id: &RecordId) -> Result<Record> {
        self.inner.backend.get(id).await
    }

    /// Records of a group in display order.
    pub async fn list_group(&self, group: &str) -> Result<Vec<Record>> {
        self.inner.backend.list_group(group).await
    }

    /// Every group holding at least one record, sorted.
    pub async fn groups(&self) -> Result<Vec<String>> {
        self.inner.backend.groups().await
    }

    /// Delete a record, freeing its position.
    pub async fn delete_record(&self, id: &RecordId) -> Result<()> {
        self.inner.backend.delete(id).await?;
        info!(record_id = %id, "Deleted record");
        Ok(())
    }

    /// Re-space one group. Returns the number of records rewritten.
    pub async fn rebalance_column(&self, group: &str) -> Result<usize> {
        self.inner.rebalancer.rebalance_column(group).await
    }

    /// Re-space every group that needs it.
    pub async fn rebalance_all(&self) -> Result<BTreeMap<String, usize>> {
        self.inner.rebalancer.rebalance_all().await
    }

    /// Whether `group` needs rebalancing.
    pub async fn needs_rebalancing(&self, group: &str) -> Result<bool> {
        self.inner.rebalancer.needs_rebalancing(group).await
    }

    /// Groups that need rebalancing.
    pub async fn find_groups_needing_rebalancing(&self) -> Result<Vec<String>> {
        self.inner.rebalancer.find_groups_needing_rebalancing().await
    }

    /// Gap statistics for one group.
    pub async fn gap_statistics(&self, group: &str) -> Result<GapStatistics> {
        self.inner.rebalancer.gap_statistics(group).await
    }

    /// Build a diagnostic report for one group, or for all groups.
    pub async fn diagnostics(&self, group: Option<&str>) -> Result<DiagnosticReport> {
        let groups = match group {
            Some(group) => vec![group.to_string()],
            None => self.groups().await?,
        };

        let mut reports = Vec::with_capacity(groups.len());
        for group in &groups {
            let records = self.list_group(group).await?;
            reports.push(diagnose_group(&self.inner.algebra, group, &records));
        }

        Ok(DiagnosticReport {
            generated_at: self.inner.clock.now_rfc3339(),
            groups: reports,
        })
    }
}

fn check_config(backend: &dyn BackendImpl, config: &Config) -> Result<()> {
    config.validate()?;
    let scale = config.position.scale;
    if let Some(supported) = backend.limits().max_scale
        && scale > supported
    {
        return Err(ConfigError::UnsupportedScale { scale, supported }.into());
    }
    Ok(())
}
