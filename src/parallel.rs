//! Processing strategies for the dialogue aggregation pipeline.
//!
//! All strategies use only std threading primitives:
//! - Sequential (baseline fold on the calling thread)
//! - Batch-parallel (std::thread on chunks of records)
//! - Channel-pipeline (producer-consumer with mpsc channels)
//!
//! Every worker folds its records into a private [`Aggregates`] and the
//! partials merge at the end, so no aggregate is shared mutably between
//! threads and the final snapshot matches the sequential reference result
//! for any worker count or scheduling.

use crate::{Aggregates, PipelineError};

use log::{debug, trace};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Configuration for parallel processing
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of worker threads
    pub num_workers: usize,
    /// Batch size for batch-parallel processing
    pub batch_size: usize,
    /// Channel buffer size for pipeline processing
    pub channel_buffer: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let cpus = thread::available_parallelism().map(|p| p.get()).unwrap_or(4);
        Self {
            num_workers: cpus,
            batch_size: 1000,
            channel_buffer: 10000,
        }
    }
}

/// Processing strategy for one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Sequential processing (reference baseline)
    Sequential,
    /// Batch-parallel processing with a thread pool per batch
    BatchParallel,
    /// Channel-based pipeline processing
    ChannelPipeline,
}

/// Run one full pipeline pass over `records` and return the finalized
/// snapshot, or an error if a worker failed. A failed run never returns
/// partial aggregates.
pub fn run<I>(
    records: I,
    strategy: Strategy,
    config: &PipelineConfig,
    cancel: &Arc<AtomicBool>,
) -> Result<Aggregates, PipelineError>
where
    I: IntoIterator<Item = String>,
{
    let aggregates = match strategy {
        Strategy::Sequential => run_sequential(records, cancel),
        Strategy::BatchParallel => {
            run_batch_parallel(records.into_iter().collect(), config, cancel)?
        }
        Strategy::ChannelPipeline => run_channel_pipeline(records, config, cancel)?,
    };
    Ok(aggregates.finalize())
}

/// Run with the default configuration and no external cancellation.
pub fn analyze<I>(records: I) -> Result<Aggregates, PipelineError>
where
    I: IntoIterator<Item = String>,
{
    run(
        records,
        Strategy::ChannelPipeline,
        &PipelineConfig::default(),
        &Arc::new(AtomicBool::new(false)),
    )
}

/// Strategy 1: sequential fold, the reference the parallel strategies must
/// reproduce exactly.
fn run_sequential<I>(records: I, cancel: &AtomicBool) -> Aggregates
where
    I: IntoIterator<Item = String>,
{
    let mut aggregates = Aggregates::default();
    let mut folded = 0usize;
    for raw in records {
        // Cooperative cancellation: checked between records, so every
        // accepted record is folded all-or-nothing.
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        if aggregates.observe_raw(&raw) {
            folded += 1;
        }
    }
    debug!("sequential pass folded {} records", folded);
    aggregates
}

/// Strategy 2: batch-parallel processing using std::thread.
/// Collects records into batches, splits each batch across worker threads,
/// and merges the per-worker partial aggregates.
fn run_batch_parallel(
    records: Vec<String>,
    config: &PipelineConfig,
    cancel: &Arc<AtomicBool>,
) -> Result<Aggregates, PipelineError> {
    let mut combined = Aggregates::default();

    for batch in records.chunks(config.batch_size.max(1)) {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        for partial in fold_batch_threaded(batch, config.num_workers, cancel)? {
            combined.merge(partial);
        }
        trace!("merged batch of {} records", batch.len());
    }

    debug!(
        "batch-parallel pass over {} records with {} workers",
        records.len(),
        config.num_workers
    );
    Ok(combined)
}

/// Fold one batch across worker threads, returning one partial aggregate
/// per thread.
fn fold_batch_threaded(
    batch: &[String],
    num_workers: usize,
    cancel: &Arc<AtomicBool>,
) -> Result<Vec<Aggregates>, PipelineError> {
    if batch.is_empty() {
        return Ok(vec![]);
    }

    let num_workers = num_workers.min(batch.len()).max(1);
    let chunk_size = (batch.len() + num_workers - 1) / num_workers;

    let handles: Vec<JoinHandle<Aggregates>> = batch
        .chunks(chunk_size)
        .map(|chunk| {
            let chunk: Vec<String> = chunk.to_vec();
            let cancel = Arc::clone(cancel);
            thread::spawn(move || {
                let mut partial = Aggregates::default();
                for raw in chunk {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    partial.observe_raw(&raw);
                }
                partial
            })
        })
        .collect();

    handles
        .into_iter()
        .map(|handle| handle.join().map_err(|_| PipelineError::WorkerPanicked))
        .collect()
}

/// Strategy 3: channel-pipeline processing using std::sync::mpsc.
/// The calling thread feeds records into a bounded channel; worker threads
/// share the receiver, fold private partials, and hand them back through
/// their join handles for the final merge.
fn run_channel_pipeline<I>(
    records: I,
    config: &PipelineConfig,
    cancel: &Arc<AtomicBool>,
) -> Result<Aggregates, PipelineError>
where
    I: IntoIterator<Item = String>,
{
    let (tx, rx): (SyncSender<String>, Receiver<String>) = sync_channel(config.channel_buffer.max(1));
    let rx = Arc::new(Mutex::new(rx));

    let num_workers = config.num_workers.max(1);
    let handles: Vec<JoinHandle<Aggregates>> = (0..num_workers)
        .map(|_| {
            let rx = Arc::clone(&rx);
            let cancel = Arc::clone(cancel);
            thread::spawn(move || fold_from_channel(rx, &cancel))
        })
        .collect();
    // The workers hold the only receiver clones from here on. When the last
    // worker exits (cancellation or panic), the receiver dies and a blocked
    // producer send errors out instead of hanging forever.
    drop(rx);

    let mut sent = 0usize;
    for raw in records {
        if cancel.load(Ordering::Relaxed) {
            break;
        }
        // Send fails only once every worker is gone; the join loop below
        // sorts out whether that was cancellation or a panic.
        if tx.send(raw).is_err() {
            break;
        }
        sent += 1;
    }
    // Close the channel so idle workers drain out
    drop(tx);

    let mut combined = Aggregates::default();
    let mut panicked = false;
    for handle in handles {
        match handle.join() {
            Ok(partial) => combined.merge(partial),
            Err(_) => panicked = true,
        }
    }

    if panicked {
        return Err(PipelineError::WorkerPanicked);
    }

    debug!(
        "channel pipeline folded {} records across {} workers",
        sent, num_workers
    );
    Ok(combined)
}

fn fold_from_channel(rx: Arc<Mutex<Receiver<String>>>, cancel: &AtomicBool) -> Aggregates {
    let mut partial = Aggregates::default();
    loop {
        if cancel.load(Ordering::Relaxed) {
            break;
        }

        // Take the next record from the shared receiver
        let raw = {
            let lock = rx.lock().ok();
            lock.and_then(|guard| guard.recv().ok())
        };

        match raw {
            Some(raw) => {
                partial.observe_raw(&raw);
            }
            None => break,
        }
    }
    partial
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
