//! Fixed-size batches over a bounded worker pool
//!
//! Accounts are cut into batches of `batch_size`. At most `workers` batches
//! run at once; inside a batch accounts go one at a time with a pacing delay
//! between them. When a batch finishes and more are waiting, the coordinator
//! pauses for the inter-batch delay before dispatching the next one.
//!
//! Workers stream each result back over a channel as soon as it exists, so a
//! batch that panics halfway still contributes what it finished. Accounts it
//! never reached get an aborted result, which means the output always has
//! exactly one entry per input account. Only the coordinator touches the
//! aggregate and calls the progress callback.

use crate::config::{BatchConfig, DelayRange};
use crate::core_types::{Account, OperationResult};
use crate::retry::{Pause, TokioPause};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{self, JoinSet};

/// Per-account output of a batch operation.
pub trait BatchOutput: Send + 'static {
    fn identifier(&self) -> &str;

    /// Stand-in for an account whose batch died before reaching it.
    fn aborted(account: &Account, reason: &str) -> Self;
}

impl BatchOutput for OperationResult {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn aborted(account: &Account, reason: &str) -> Self {
        OperationResult::failure(&account.identifier, reason, 0)
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub batch_size: usize,
    pub workers: usize,
    pub account_delay: DelayRange,
    pub batch_delay: DelayRange,
}

impl From<&BatchConfig> for SchedulerSettings {
    fn from(config: &BatchConfig) -> Self {
        Self {
            batch_size: config.size,
            workers: config.workers,
            account_delay: config.account_delay_ms,
            batch_delay: config.batch_delay_ms,
        }
    }
}

/// Handed to the progress callback after each batch.
pub struct BatchProgress<'a, R> {
    pub batch_index: usize,
    pub batch_count: usize,
    pub results: &'a [R],
    pub completed: usize,
    pub total: usize,
    pub aborted: bool,
}

pub struct BatchScheduler {
    settings: SchedulerSettings,
    pause: Arc<dyn Pause>,
}

impl BatchScheduler {
    pub fn new(settings: SchedulerSettings) -> Self {
        Self {
            settings,
            pause: Arc::new(TokioPause),
        }
    }

    pub fn with_pause(mut self, pause: Arc<dyn Pause>) -> Self {
        self.pause = pause;
        self
    }

    pub fn batch_count(&self, accounts: usize) -> usize {
        accounts.div_ceil(self.settings.batch_size.max(1))
    }

    /// Run `op` for every account. Results come back in completion order.
    pub async fn run<R, F, Fut, P>(&self, accounts: Vec<Account>, op: F, mut on_batch: P) -> Vec<R>
    where
        R: BatchOutput,
        F: Fn(Account) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        P: FnMut(BatchProgress<'_, R>),
    {
        let total = accounts.len();
        if total == 0 {
            log::info!("No accounts to process");
            return Vec::new();
        }

        let batches: Vec<Vec<Account>> = accounts
            .chunks(self.settings.batch_size.max(1))
            .map(<[Account]>::to_vec)
            .collect();
        let batch_count = batches.len();
        let workers = self.settings.workers.max(1);
        log::info!(
            "Processing {} account(s) in {} batch(es) of up to {}, {} worker(s)",
            total,
            batch_count,
            self.settings.batch_size,
            workers
        );

        let op = Arc::new(op);
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, R)>();
        let mut received: HashMap<usize, Vec<R>> = HashMap::new();
        let mut finalized = vec![false; batch_count];
        let mut collected: Vec<R> = Vec::with_capacity(total);

        let mut queue = batches.iter().cloned().enumerate();
        let mut in_flight = JoinSet::new();
        let mut task_batches: HashMap<task::Id, usize> = HashMap::new();
        for _ in 0..workers {
            if let Some((index, batch)) = queue.next() {
                let id = self.spawn_batch(&mut in_flight, index, batch, op.clone(), tx.clone());
                task_batches.insert(id, index);
            }
        }

        while let Some(joined) = in_flight.join_next_with_id().await {
            let (id, completed) = match joined {
                Ok((id, ())) => (id, true),
                Err(e) => {
                    if !e.is_panic() {
                        log::error!("Batch task failed to join: {}", e);
                    }
                    (e.id(), false)
                }
            };

            while let Ok((batch_index, result)) = rx.try_recv() {
                received.entry(batch_index).or_default().push(result);
            }

            if let Some(index) = task_batches.remove(&id) {
                let mut results = received.remove(&index).unwrap_or_default();
                if !completed {
                    log::error!(
                        "Batch {}/{} aborted after {} of {} account(s); keeping partial results",
                        index + 1,
                        batch_count,
                        results.len(),
                        batches[index].len()
                    );
                }
                fill_missing(&mut results, &batches[index]);
                finalized[index] = true;

                on_batch(BatchProgress {
                    batch_index: index,
                    batch_count,
                    results: &results,
                    completed: collected.len() + results.len(),
                    total,
                    aborted: !completed,
                });
                collected.append(&mut results);
            }

            // A failed join frees its worker slot like any other.
            if let Some((next_index, batch)) = queue.next() {
                let delay = self.settings.batch_delay.sample();
                log::info!(
                    "{}/{} batch(es) done, next batch in {:.1}s",
                    finalized.iter().filter(|done| **done).count(),
                    batch_count,
                    delay.as_secs_f64()
                );
                self.pause.pause(delay).await;
                let id = self.spawn_batch(&mut in_flight, next_index, batch, op.clone(), tx.clone());
                task_batches.insert(id, next_index);
            }
        }

        drop(tx);
        while let Ok((batch_index, result)) = rx.try_recv() {
            received.entry(batch_index).or_default().push(result);
        }
        for (index, batch) in batches.iter().enumerate() {
            if finalized[index] {
                continue;
            }
            let mut results = received.remove(&index).unwrap_or_default();
            fill_missing(&mut results, batch);
            collected.append(&mut results);
        }

        collected
    }

    /// A panic inside `op` ends the task; the results it already sent stay
    /// in the channel and the join error marks the batch aborted.
    fn spawn_batch<R, F, Fut>(
        &self,
        set: &mut JoinSet<()>,
        index: usize,
        batch: Vec<Account>,
        op: Arc<F>,
        tx: mpsc::UnboundedSender<(usize, R)>,
    ) -> task::Id
    where
        R: BatchOutput,
        F: Fn(Account) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let pause = self.pause.clone();
        let account_delay = self.settings.account_delay;

        set.spawn(async move {
            let len = batch.len();
            for (position, account) in batch.into_iter().enumerate() {
                let result = op(account).await;
                if tx.send((index, result)).is_err() {
                    break;
                }
                if position + 1 < len {
                    pause.pause(account_delay.sample()).await;
                }
            }
        })
        .id()
    }
}

/// Accounts are processed in order, so the first `results.len()` are done
/// and the rest were never reached.
fn fill_missing<R: BatchOutput>(results: &mut Vec<R>, batch: &[Account]) {
    for account in batch.iter().skip(results.len()) {
        log::warn!("{}: not processed, batch aborted", account.identifier);
        results.push(R::aborted(account, "batch aborted before this account was processed"));
    }
}
