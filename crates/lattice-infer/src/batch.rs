//! Batched inference execution
//!
//! Jobs group by edge type: one type's jobs run in submission order, while
//! unrelated types proceed concurrently under a shared parallelism bound.
//! A failing job fills only its own result slot.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use lattice_core::{Error, NodeId, Result};

use crate::engine::{
    HierarchicalOptions, HierarchicalResult, InferenceEngine, TransitiveOptions, TransitiveResult,
};

#[derive(Debug, Clone)]
pub enum InferenceJob {
    Transitive {
        start: NodeId,
        edge_type: String,
        options: TransitiveOptions,
    },
    Hierarchical {
        node: NodeId,
        edge_type: String,
        options: HierarchicalOptions,
    },
}

impl InferenceJob {
    fn edge_type(&self) -> &str {
        match self {
            InferenceJob::Transitive { edge_type, .. } => edge_type,
            InferenceJob::Hierarchical { edge_type, .. } => edge_type,
        }
    }
}

#[derive(Debug)]
pub enum JobOutcome {
    Transitive(TransitiveResult),
    Hierarchical(HierarchicalResult),
}

/// One result slot per submitted job, in submission order.
#[derive(Debug)]
pub struct JobResult {
    pub index: usize,
    pub outcome: Result<JobOutcome>,
}

pub async fn run_batch(
    engine: Arc<InferenceEngine>,
    jobs: Vec<InferenceJob>,
    parallelism: usize,
    cancel: CancellationToken,
) -> Vec<JobResult> {
    // Per-type queues preserve submission order inside each edge type.
    let mut queues: BTreeMap<String, Vec<(usize, InferenceJob)>> = BTreeMap::new();
    for (index, job) in jobs.into_iter().enumerate() {
        queues.entry(job.edge_type().to_string()).or_default().push((index, job));
    }

    let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
    let mut join_set = JoinSet::new();

    for (edge_type, queue) in queues {
        let engine = Arc::clone(&engine);
        let semaphore = Arc::clone(&semaphore);
        let cancel = cancel.clone();
        join_set.spawn(async move {
            let mut results = Vec::with_capacity(queue.len());
            for (index, job) in queue {
                if cancel.is_cancelled() {
                    results.push(JobResult {
                        index,
                        outcome: Err(Error::Cancelled),
                    });
                    continue;
                }
                let permit = semaphore.clone().acquire_owned().await;
                let engine = Arc::clone(&engine);
                let job_for_task = job.clone();
                let outcome = tokio::task::spawn_blocking(move || {
                    let _permit = permit;
                    run_job(&engine, &job_for_task)
                })
                .await
                .unwrap_or_else(|e| {
                    Err(Error::InferenceBudgetExceeded(format!("job panicked: {e}")))
                });

                if let Err(err) = &outcome {
                    tracing::warn!(edge_type = %job.edge_type(), error = %err, "inference job failed");
                }
                results.push(JobResult { index, outcome });
            }
            results
        });
    }

    let mut all = Vec::new();
    while let Some(joined) = join_set.join_next().await {
        if let Ok(results) = joined {
            all.extend(results);
        }
    }
    all.sort_by_key(|r| r.index);
    all
}

fn run_job(engine: &InferenceEngine, job: &InferenceJob) -> Result<JobOutcome> {
    match job {
        InferenceJob::Transitive {
            start,
            edge_type,
            options,
        } => engine
            .query_transitive(*start, edge_type, *options)
            .map(JobOutcome::Transitive),
        InferenceJob::Hierarchical {
            node,
            edge_type,
            options,
        } => engine
            .query_hierarchical(*node, edge_type, *options)
            .map(JobOutcome::Hierarchical),
    }
}
