// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Batch orchestrator: a fixed pool of workers draining a shared queue, with
// results gathered into index-addressed slots.
//
// Guarantees:
// - exactly one result per input, in input order, whatever the completion
//   order and however many items fail;
// - at most `concurrency_limit` items run at once;
// - each item is attempted once, with no retries;
// - once cancelled (by the caller or the deadline) no further items are
//   dequeued, and anything not finished is reported as `Cancelled`;
// - dropping the `run` future cancels the batch and aborts its workers.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use scanmaster_core::config::BatchSettings;
use scanmaster_core::error::{ProcessingError, Result};
use scanmaster_core::types::BatchId;
use scanmaster_document::Checkpoint;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

/// One unit of work, tagged with its submission position.
#[derive(Debug, Clone)]
pub struct BatchItem<T> {
    pub index: usize,
    pub input: T,
}

/// The outcome for the item submitted at `index`.
#[derive(Debug)]
pub struct BatchResult<O> {
    pub index: usize,
    pub outcome: Result<O>,
}

impl<O> BatchResult<O> {
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn error(&self) -> Option<&ProcessingError> {
        self.outcome.as_ref().err()
    }
}

/// A completed batch. `results[i].index == i` for every `i`.
#[derive(Debug)]
pub struct BatchReport<O> {
    pub batch_id: BatchId,
    pub results: Vec<BatchResult<O>>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl<O> BatchReport<O> {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    pub fn cancelled(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.error().is_some_and(ProcessingError::is_cancelled))
            .count()
    }

    pub fn into_results(self) -> Vec<BatchResult<O>> {
        self.results
    }
}

/// [`Checkpoint`] backed by a cancellation token.
#[derive(Debug, Clone)]
pub struct CancellationCheckpoint(CancellationToken);

impl CancellationCheckpoint {
    pub fn new(token: CancellationToken) -> Self {
        Self(token)
    }
}

impl Checkpoint for CancellationCheckpoint {
    fn check(&self) -> Result<()> {
        if self.0.is_cancelled() {
            Err(ProcessingError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Runs a per-item operation over many inputs with bounded parallelism.
///
/// Operations are synchronous and CPU-bound; each one runs on the blocking
/// pool and receives a [`Checkpoint`] it may consult between stages.
#[derive(Debug, Clone)]
pub struct BatchOrchestrator {
    concurrency_limit: usize,
    deadline: Option<Duration>,
}

impl Default for BatchOrchestrator {
    fn default() -> Self {
        Self::from_settings(&BatchSettings::default())
    }
}

impl BatchOrchestrator {
    /// A limit of zero is treated as one.
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            concurrency_limit: concurrency_limit.max(1),
            deadline: None,
        }
    }

    pub fn from_settings(settings: &BatchSettings) -> Self {
        let orchestrator = Self::new(settings.concurrency_limit);
        match settings.deadline_ms {
            Some(ms) => orchestrator.with_deadline(Duration::from_millis(ms)),
            None => orchestrator,
        }
    }

    /// Cancel the whole batch once `deadline` has elapsed from the start.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub async fn run<T, O, F>(&self, inputs: Vec<T>, op: F) -> BatchReport<O>
    where
        T: Send + 'static,
        O: Send + 'static,
        F: Fn(T, &dyn Checkpoint) -> Result<O> + Send + Sync + 'static,
    {
        self.run_with_cancel(inputs, op, CancellationToken::new()).await
    }

    /// Run the batch; cancelling `cancel` abandons it cooperatively.
    pub async fn run_with_cancel<T, O, F>(
        &self,
        inputs: Vec<T>,
        op: F,
        cancel: CancellationToken,
    ) -> BatchReport<O>
    where
        T: Send + 'static,
        O: Send + 'static,
        F: Fn(T, &dyn Checkpoint) -> Result<O> + Send + Sync + 'static,
    {
        let batch_id = BatchId::new();
        let started_at = Utc::now();
        let total = inputs.len();
        let workers = self.concurrency_limit.min(total);
        info!(%batch_id, items = total, workers, "Batch started");

        // A child token lets the deadline cancel this batch without touching
        // the caller's token.
        let token = cancel.child_token();
        let _cancel_on_drop = token.clone().drop_guard();
        let timer = self.deadline.map(|deadline| spawn_deadline(deadline, token.clone()));

        let queue: Arc<Mutex<VecDeque<BatchItem<T>>>> = Arc::new(Mutex::new(
            inputs
                .into_iter()
                .enumerate()
                .map(|(index, input)| BatchItem { index, input })
                .collect(),
        ));
        let op = Arc::new(op);

        // Workers live in a JoinSet so an abandoned batch aborts them.
        let mut pool: JoinSet<Vec<BatchResult<O>>> = JoinSet::new();
        for worker in 0..workers {
            let span = info_span!("batch_worker", %batch_id, worker);
            pool.spawn(
                drain_queue(Arc::clone(&queue), Arc::clone(&op), token.clone()).instrument(span),
            );
        }

        // Fan-in: every worker hands back the results it produced; each lands
        // in the slot named by its index.
        let mut slots: Vec<Option<BatchResult<O>>> = (0..total).map(|_| None).collect();
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(results) => {
                    for result in results {
                        if let Some(slot) = slots.get_mut(result.index) {
                            *slot = Some(result);
                        }
                    }
                }
                Err(err) => warn!(%batch_id, error = %err, "Batch worker terminated abnormally"),
            }
        }
        if let Some(timer) = timer {
            timer.abort();
        }

        let results: Vec<BatchResult<O>> = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.unwrap_or_else(|| BatchResult {
                    index,
                    outcome: Err(ProcessingError::Cancelled),
                })
            })
            .collect();

        let report = BatchReport {
            batch_id,
            results,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            %batch_id,
            succeeded = report.succeeded(),
            failed = report.failed(),
            cancelled = report.cancelled(),
            elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
            "Batch finished"
        );
        report
    }
}

/// One worker: dequeue, run on the blocking pool, repeat until the queue is
/// empty or the batch is cancelled.
async fn drain_queue<T, O, F>(
    queue: Arc<Mutex<VecDeque<BatchItem<T>>>>,
    op: Arc<F>,
    token: CancellationToken,
) -> Vec<BatchResult<O>>
where
    T: Send + 'static,
    O: Send + 'static,
    F: Fn(T, &dyn Checkpoint) -> Result<O> + Send + Sync + 'static,
{
    let mut completed = Vec::new();
    loop {
        if token.is_cancelled() {
            debug!("Cancelled, no further items dequeued");
            break;
        }
        let next = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        let Some(BatchItem { index, input }) = next else {
            break;
        };

        let op = Arc::clone(&op);
        let checkpoint = CancellationCheckpoint::new(token.clone());
        let mut task = tokio::task::spawn_blocking(move || op(input, &checkpoint));

        let outcome = tokio::select! {
            biased;
            joined = &mut task => match joined {
                Ok(outcome) => outcome,
                Err(err) => {
                    warn!(index, error = %err, "Batch item panicked");
                    Err(ProcessingError::WorkerPanicked(err.to_string()))
                }
            },
            _ = token.cancelled() => {
                // The blocking task is detached; its result is discarded.
                debug!(index, "In-flight item abandoned");
                Err(ProcessingError::Cancelled)
            }
        };
        if let Err(err) = &outcome {
            debug!(index, kind = ?err.kind(), "Batch item failed");
        }
        completed.push(BatchResult { index, outcome });
    }
    completed
}

fn spawn_deadline(deadline: Duration, token: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(deadline) => {
                warn!(deadline_ms = deadline.as_millis() as u64, "Batch deadline reached, cancelling");
                token.cancel();
            }
            _ = token.cancelled() => {}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn every_input_gets_a_result_in_order() {
        let inputs: Vec<usize> = (0..6).collect();
        let report = BatchOrchestrator::new(3)
            .run(inputs, |i: usize, _: &dyn Checkpoint| {
                if i % 3 == 0 {
                    Err(ProcessingError::Decode(format!("item {i}")))
                } else {
                    Ok(i * 10)
                }
            })
            .await;

        assert_eq!(report.len(), 6);
        assert_eq!(report.failed(), 2);
        for (i, result) in report.results.iter().enumerate() {
            assert_eq!(result.index, i);
            match &result.outcome {
                Ok(v) => assert_eq!(*v, i * 10),
                Err(err) => assert_eq!(err.kind(), scanmaster_core::ErrorKind::DecodeError),
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn slow_early_items_do_not_reorder_output() {
        let inputs: Vec<u64> = (0..5).collect();
        let report = BatchOrchestrator::new(5)
            .run(inputs, |i: u64, _: &dyn Checkpoint| {
                std::thread::sleep(Duration::from_millis((5 - i) * 15));
                Ok(i)
            })
            .await;
        let values: Vec<u64> = report
            .into_results()
            .into_iter()
            .map(|r| r.outcome.unwrap())
            .collect();
        assert_eq!(values, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_more_than_limit_in_flight() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (current, max) = (Arc::clone(&in_flight), Arc::clone(&peak));

        let report = BatchOrchestrator::new(2)
            .run((0..5).collect::<Vec<u32>>(), move |i: u32, _: &dyn Checkpoint| {
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                max.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(30));
                current.fetch_sub(1, Ordering::SeqCst);
                Ok(i)
            })
            .await;

        assert_eq!(report.succeeded(), 5);
        let observed = peak.load(Ordering::SeqCst);
        assert!((1..=2).contains(&observed), "peak in flight was {observed}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn deadline_reports_unfinished_items_as_cancelled() {
        let orchestrator = BatchOrchestrator::new(1).with_deadline(Duration::from_millis(300));
        let report = orchestrator
            .run((0..4).collect::<Vec<u32>>(), |i: u32, checkpoint: &dyn Checkpoint| {
                if i == 0 {
                    return Ok(i);
                }
                // Long item that yields at regular checkpoints.
                for _ in 0..200 {
                    std::thread::sleep(Duration::from_millis(10));
                    checkpoint.check()?;
                }
                Ok(i)
            })
            .await;

        assert_eq!(report.len(), 4);
        assert_eq!(report.results[0].outcome.as_ref().ok(), Some(&0));
        assert_eq!(report.cancelled(), 3);
        assert!(report.results[1..].iter().all(|r| r.error().is_some_and(|e| e.is_cancelled())));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn pre_cancelled_batch_runs_nothing() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = BatchOrchestrator::new(2)
            .run_with_cancel(
                vec![1, 2, 3],
                move |i: i32, _: &dyn Checkpoint| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(i)
                },
                cancel,
            )
            .await;

        assert_eq!(report.len(), 3);
        assert_eq!(report.cancelled(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_item_is_isolated() {
        let report = BatchOrchestrator::new(2)
            .run(vec![0, 1, 2], |i: i32, _: &dyn Checkpoint| {
                if i == 1 {
                    panic!("corrupt buffer");
                }
                Ok(i)
            })
            .await;

        assert_eq!(report.succeeded(), 2);
        assert!(matches!(
            report.results[1].outcome,
            Err(ProcessingError::WorkerPanicked(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dropped_batch_stops_starting_items() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let orchestrator = BatchOrchestrator::new(1);
        let batch = orchestrator.run((0..10).collect::<Vec<u32>>(), move |i: u32, _: &dyn Checkpoint| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            Ok(i)
        });

        let abandoned = tokio::time::timeout(Duration::from_millis(75), batch).await;
        assert!(abandoned.is_err());
        let at_drop = calls.load(Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(400)).await;
        let later = calls.load(Ordering::SeqCst);
        // Only the item already on the blocking pool may still have started.
        assert!(later <= at_drop + 1, "{at_drop} started before the drop, {later} after");
        assert!(later < 10);
    }

    #[tokio::test]
    async fn empty_batch_is_empty_report() {
        let report = BatchOrchestrator::default()
            .run(Vec::<u8>::new(), |i: u8, _: &dyn Checkpoint| Ok(i))
            .await;
        assert!(report.is_empty());
    }

    #[test]
    fn settings_translate_to_limits() {
        let orchestrator = BatchOrchestrator::from_settings(&BatchSettings {
            concurrency_limit: 0,
            deadline_ms: Some(1500),
        });
        assert_eq!(orchestrator.concurrency_limit(), 1);
        assert_eq!(orchestrator.deadline(), Some(Duration::from_millis(1500)));
    }
}
