//! Concurrent table loading
//!
//! Loads several staged tables at once with a fixed number of workers.
//! Workers pull jobs from a shared queue and each one opens its own
//! connector, so no connection is ever shared between tables in flight.
//! A failed table is recorded and the remaining tables keep loading.

use anyhow::Result;
use futures::future::try_join_all;
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::error::LoadError;
use crate::loader::{BulkLoader, Connector, LoadOptions};
use crate::models::{Config, LoadResult, StagedTable};

/// Configuration for concurrent loading
#[derive(Debug, Clone)]
pub struct ConcurrentLoadConfig {
    pub num_workers: usize,
    pub options: LoadOptions,
}

impl From<&Config> for ConcurrentLoadConfig {
    fn from(config: &Config) -> Self {
        Self {
            num_workers: config.load_workers.max(1),
            options: LoadOptions::from(config),
        }
    }
}

/// Per-table outcome of a concurrent run, in job order
#[derive(Debug, Default)]
pub struct ConcurrentLoadResult {
    pub results: IndexMap<String, LoadResult>,
    /// Table -> error for every table whose load did not finish
    pub failures: IndexMap<String, String>,
}

impl ConcurrentLoadResult {
    pub fn total_inserted(&self) -> usize {
        self.results.values().map(|r| r.inserted).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.results.values().map(|r| r.skipped).sum()
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

type Queue = Arc<Mutex<VecDeque<StagedTable>>>;
type Outcomes = Arc<Mutex<ConcurrentLoadResult>>;

/// Load every job, `config.num_workers` tables at a time. Jobs are expected
/// to target distinct tables. `connect` is called once per worker, and again
/// after a connection-level failure.
pub async fn load_tables_concurrently<C, F, Fut>(
    jobs: Vec<StagedTable>,
    config: ConcurrentLoadConfig,
    connect: F,
) -> Result<ConcurrentLoadResult>
where
    C: Connector + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<C, LoadError>> + Send + 'static,
{
    let order: Vec<String> = jobs.iter().map(|job| job.table.to_string()).collect();
    let num_workers = config.num_workers.clamp(1, jobs.len().max(1));
    info!("🚀 Loading {} tables with {} workers", jobs.len(), num_workers);

    let queue: Queue = Arc::new(Mutex::new(jobs.into_iter().collect()));
    let outcomes: Outcomes = Arc::new(Mutex::new(ConcurrentLoadResult::default()));
    let connect = Arc::new(connect);

    let mut handles = Vec::new();
    for worker_id in 0..num_workers {
        let queue = Arc::clone(&queue);
        let outcomes = Arc::clone(&outcomes);
        let connect = Arc::clone(&connect);
        let options = config.options;

        handles.push(tokio::spawn(async move {
            worker(worker_id, queue, outcomes, connect, options).await
        }));
    }

    let mut connect_error = None;
    for outcome in try_join_all(handles).await? {
        if let Err(e) = outcome {
            connect_error = Some(e.to_string());
        }
    }

    // Jobs still queued were never picked up because no worker could connect
    let leftover: Vec<StagedTable> = queue.lock().await.drain(..).collect();
    let mut outcomes = std::mem::take(&mut *outcomes.lock().await);
    for job in leftover {
        let reason = connect_error
            .clone()
            .unwrap_or_else(|| "no worker available".to_string());
        outcomes.failures.insert(job.table.to_string(), reason);
    }

    let position = |table: &String| order.iter().position(|t| t == table).unwrap_or(usize::MAX);
    outcomes.results.sort_by(|a, _, b, _| position(a).cmp(&position(b)));
    outcomes.failures.sort_by(|a, _, b, _| position(a).cmp(&position(b)));

    info!("✅ Concurrent load completed");
    info!(
        "📊 Results: {} tables loaded, {} failed, {} rows inserted, {} skipped",
        outcomes.results.len(),
        outcomes.failures.len(),
        outcomes.total_inserted(),
        outcomes.total_skipped()
    );
    Ok(outcomes)
}

/// Worker loop. Returns an error only when it cannot obtain a connector.
async fn worker<C, F, Fut>(
    worker_id: usize,
    queue: Queue,
    outcomes: Outcomes,
    connect: Arc<F>,
    options: LoadOptions,
) -> Result<(), LoadError>
where
    C: Connector,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<C, LoadError>>,
{
    let mut connector = match connect().await {
        Ok(connector) => connector,
        Err(e) => {
            error!("❌ Worker {}: could not connect - {}", worker_id, e);
            return Err(e);
        }
    };

    loop {
        let job = match queue.lock().await.pop_front() {
            Some(job) => job,
            None => break,
        };
        let table = job.table.to_string();
        info!("🔄 Worker {}: loading {} ({} rows)", worker_id, table, job.len());

        let outcome = BulkLoader::new(&connector, options).load(&job).await;
        match outcome {
            Ok(result) => {
                info!(
                    "✅ Worker {}: {} done ({} inserted, {} skipped)",
                    worker_id, table, result.inserted, result.skipped
                );
                outcomes.lock().await.results.insert(table, result);
            }
            Err(e) => {
                error!("❌ Worker {}: {} failed - {}", worker_id, table, e);
                let reconnect = e.is_connection();
                outcomes.lock().await.failures.insert(table, e.to_string());

                if reconnect {
                    warn!("🔌 Worker {}: reconnecting after connection failure", worker_id);
                    connector = match connect().await {
                        Ok(connector) => connector,
                        Err(e) => {
                            error!("❌ Worker {}: reconnect failed - {}", worker_id, e);
                            return Err(e);
                        }
                    };
                }
            }
        }
    }

    Ok(())
}
