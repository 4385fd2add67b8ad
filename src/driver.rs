//! Population-wide billing in bounded-size chunks.
//!
//! The building index is cut into order-preserving slices of `chunk_size`
//! entries. Each slice is loaded, priced under every active policy,
//! aggregated, and dropped before the next one is touched, so peak memory is
//! proportional to one chunk rather than the whole population.

use std::ops::Range;
use std::sync::atomic::{AtomicBool, Ordering};

use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::aggregate::{PolicyPrices, aggregate};
use crate::cache::{PriceCache, PriceLoader};
use crate::error::{BillingError, Result};
use crate::model::{BillTable, BuildingIndex, BuildingIndexEntry, RecordBatch};
use crate::pricing::{PolicyKind, PricingPolicy};
use crate::source::{MetadataTable, TimeseriesSource};

/// Bills for one processed chunk.
#[derive(Debug, Clone)]
pub struct ChunkBill {
    /// Zero-based chunk number.
    pub chunk: usize,
    /// Positions of the chunk's entries in the building index.
    pub entries: Range<usize>,
    pub bills: BillTable,
}

/// A chunk that could not be billed.
#[derive(thiserror::Error, Debug)]
#[error("chunk {chunk} (index entries {}..{}) failed: {source}", .entries.start, .entries.end)]
pub struct ChunkFailure {
    pub chunk: usize,
    pub entries: Range<usize>,
    #[source]
    pub source: BillingError,
}

/// Why a run ended before exhausting the index.
#[derive(thiserror::Error, Debug)]
pub enum RunStop {
    /// The stop flag was raised; `next_chunk` is the first chunk not processed.
    #[error("billing cancelled before chunk {next_chunk}")]
    Cancelled { next_chunk: usize },
    #[error(transparent)]
    Failed(ChunkFailure),
}

/// Outcome of a driver run. Bills of completed chunks are always kept.
#[derive(Debug)]
pub struct BillRun {
    pub bills: BillTable,
    pub chunks_processed: usize,
    pub stop: Option<RunStop>,
}

impl BillRun {
    /// `true` when every chunk of the index was billed.
    pub fn is_complete(&self) -> bool {
        self.stop.is_none()
    }
}

/// Sums the named end-use columns into each record's `kwh_total`.
///
/// # Errors
///
/// `MissingColumn` when a named column is not part of the batch.
pub fn fill_kwh_total(batch: &mut RecordBatch, end_use_columns: &[String]) -> Result<()> {
    let idx = end_use_columns
        .iter()
        .map(|col| {
            batch.column_index(col).ok_or_else(|| BillingError::MissingColumn {
                column: col.clone(),
                context: "timeseries batch".to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;
    for record in &mut batch.records {
        record.kwh_total = idx.iter().map(|&i| record.end_uses[i]).sum();
    }
    Ok(())
}

/// Builds a rayon pool with exactly `threads` workers.
///
/// # Errors
///
/// `WorkerPool` when the pool cannot be created.
pub fn worker_pool(threads: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build()
        .map_err(|e| BillingError::WorkerPool(e.to_string()))
}

/// Orchestrates source, policies, cache and aggregator over a building index.
pub struct BillDriver<'a, S, L> {
    source: &'a S,
    policies: &'a [PricingPolicy],
    cache: &'a PriceCache<L>,
    metadata: Option<&'a MetadataTable>,
}

impl<'a, S: TimeseriesSource, L: PriceLoader> BillDriver<'a, S, L> {
    pub fn new(source: &'a S, policies: &'a [PricingPolicy], cache: &'a PriceCache<L>) -> Self {
        Self {
            source,
            policies,
            cache,
            metadata: None,
        }
    }

    /// Passes building metadata to every policy call.
    pub fn with_metadata(mut self, metadata: Option<&'a MetadataTable>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Policy columns of every table this driver produces.
    pub fn policy_kinds(&self) -> Vec<PolicyKind> {
        self.policies.iter().map(PricingPolicy::kind).collect()
    }

    /// Loads, prices and aggregates exactly `entries`.
    ///
    /// # Errors
    ///
    /// Fails when the source cannot load an entry, an end-use column is
    /// missing, or a policy's price source cannot be loaded.
    pub fn bill_entries(&self, entries: &[BuildingIndexEntry], end_use_columns: &[String]) -> Result<BillTable> {
        let mut batch = self.source.load(entries)?;
        if batch.is_empty() {
            return Ok(BillTable::empty(self.policy_kinds()));
        }
        fill_kwh_total(&mut batch, end_use_columns)?;

        let series = self
            .policies
            .iter()
            .map(|policy| {
                let prices = policy.price(&batch, self.metadata, self.cache)?;
                Ok::<_, BillingError>(PolicyPrices {
                    kind: policy.kind(),
                    prices,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(aggregate(&batch, &series))
    }

    fn bill_chunk(
        &self,
        chunk: usize,
        entries: Range<usize>,
        slice: &[BuildingIndexEntry],
        end_use_columns: &[String],
        total: usize,
    ) -> std::result::Result<ChunkBill, ChunkFailure> {
        info!(
            chunk,
            first = entries.start,
            last = entries.end.saturating_sub(1),
            total,
            "billing chunk"
        );
        match self.bill_entries(slice, end_use_columns) {
            Ok(bills) => {
                if bills.is_empty() {
                    debug!(chunk, "chunk produced no records");
                }
                Ok(ChunkBill { chunk, entries, bills })
            }
            Err(source) => Err(ChunkFailure { chunk, entries, source }),
        }
    }

    /// Lazily bills `index` one chunk at a time.
    ///
    /// Nothing is loaded until the iterator is advanced; dropping it stops
    /// processing at a chunk boundary.
    pub fn chunks<'b>(
        &'b self,
        index: &'b BuildingIndex,
        end_use_columns: &'b [String],
        chunk_size: usize,
    ) -> ChunkBills<'b, S, L> {
        let chunk_size = chunk_size.max(1);
        ChunkBills {
            driver: self,
            entries: index.entries(),
            end_use_columns,
            chunk_size,
            next_chunk: 0,
        }
    }

    /// Bills the whole index sequentially.
    pub fn run(&self, index: &BuildingIndex, end_use_columns: &[String], chunk_size: usize) -> BillRun {
        self.run_until(index, end_use_columns, chunk_size, &AtomicBool::new(false))
    }

    /// Bills the index sequentially, checking `stop` before each chunk.
    ///
    /// Halts at the first failing chunk; bills from earlier chunks are kept.
    pub fn run_until(
        &self,
        index: &BuildingIndex,
        end_use_columns: &[String],
        chunk_size: usize,
        stop: &AtomicBool,
    ) -> BillRun {
        let mut bills = BillTable::empty(self.policy_kinds());
        let mut chunks_processed = 0;
        let mut chunks = self.chunks(index, end_use_columns, chunk_size);

        let run_stop = loop {
            if stop.load(Ordering::Relaxed) && chunks.remaining() > 0 {
                warn!(next_chunk = chunks.next_chunk, "billing cancelled");
                break Some(RunStop::Cancelled {
                    next_chunk: chunks.next_chunk,
                });
            }
            match chunks.next() {
                None => break None,
                Some(Ok(chunk)) => {
                    bills.append(chunk.bills);
                    chunks_processed += 1;
                }
                Some(Err(failure)) => {
                    error!(error = %failure, "billing halted");
                    break Some(RunStop::Failed(failure));
                }
            }
        };

        info!(buildings = bills.len(), chunks = chunks_processed, "billing finished");
        BillRun {
            bills,
            chunks_processed,
            stop: run_stop,
        }
    }

    /// Bills chunks concurrently on `pool`, concatenating in chunk order.
    ///
    /// Every price source is loaded once before fan-out. Chunks not yet
    /// started when `stop` is raised are skipped. The first failed or skipped
    /// chunk (in chunk order) ends the run; results of later chunks are
    /// discarded.
    pub fn run_parallel(
        &self,
        index: &BuildingIndex,
        end_use_columns: &[String],
        chunk_size: usize,
        pool: &rayon::ThreadPool,
        stop: &AtomicBool,
    ) -> BillRun {
        let chunk_size = chunk_size.max(1);
        let total = index.len();
        let mut bills = BillTable::empty(self.policy_kinds());

        for source_id in self.policies.iter().filter_map(PricingPolicy::price_source) {
            if let Err(source) = self.cache.get(source_id) {
                let failure = ChunkFailure {
                    chunk: 0,
                    entries: 0..chunk_size.min(total),
                    source,
                };
                error!(error = %failure, "price cache warm-up failed");
                return BillRun {
                    bills,
                    chunks_processed: 0,
                    stop: Some(RunStop::Failed(failure)),
                };
            }
        }

        let results: Vec<Option<std::result::Result<ChunkBill, ChunkFailure>>> = pool.install(|| {
            index
                .entries()
                .par_chunks(chunk_size)
                .enumerate()
                .map(|(chunk, slice)| {
                    if stop.load(Ordering::Relaxed) {
                        return None;
                    }
                    let start = chunk * chunk_size;
                    Some(self.bill_chunk(chunk, start..start + slice.len(), slice, end_use_columns, total))
                })
                .collect()
        });

        let mut chunks_processed = 0;
        let mut run_stop = None;
        for (chunk, result) in results.into_iter().enumerate() {
            match result {
                Some(Ok(chunk_bill)) if run_stop.is_none() => {
                    bills.append(chunk_bill.bills);
                    chunks_processed += 1;
                }
                Some(Ok(_)) => debug!(chunk, "discarding chunk after earlier stop"),
                Some(Err(failure)) if run_stop.is_none() => {
                    error!(error = %failure, "billing halted");
                    run_stop = Some(RunStop::Failed(failure));
                }
                Some(Err(failure)) => debug!(error = %failure, "ignoring failure after earlier stop"),
                None if run_stop.is_none() => {
                    warn!(next_chunk = chunk, "billing cancelled");
                    run_stop = Some(RunStop::Cancelled { next_chunk: chunk });
                }
                None => {}
            }
        }

        info!(buildings = bills.len(), chunks = chunks_processed, "parallel billing finished");
        BillRun {
            bills,
            chunks_processed,
            stop: run_stop,
        }
    }
}

/// Lazy sequence of per-chunk bills; see [`BillDriver::chunks`].
pub struct ChunkBills<'b, S, L> {
    driver: &'b BillDriver<'b, S, L>,
    entries: &'b [BuildingIndexEntry],
    end_use_columns: &'b [String],
    chunk_size: usize,
    next_chunk: usize,
}

impl<S: TimeseriesSource, L: PriceLoader> ChunkBills<'_, S, L> {
    /// Skips ahead so the next item is chunk `chunk`, e.g. to resume a cancelled run.
    pub fn resume_at(mut self, chunk: usize) -> Self {
        self.next_chunk = chunk;
        self
    }

    /// Number of chunks not yet produced.
    pub fn remaining(&self) -> usize {
        let done = self
            .next_chunk
            .checked_mul(self.chunk_size)
            .map_or(self.entries.len(), |start| start.min(self.entries.len()));
        (self.entries.len() - done).div_ceil(self.chunk_size)
    }
}

impl<S: TimeseriesSource, L: PriceLoader> Iterator for ChunkBills<'_, S, L> {
    type Item = std::result::Result<ChunkBill, ChunkFailure>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.next_chunk.checked_mul(self.chunk_size)?;
        if start >= self.entries.len() {
            return None;
        }
        let end = (start + self.chunk_size).min(self.entries.len());
        let chunk = self.next_chunk;
        self.next_chunk += 1;
        Some(self.driver.bill_chunk(
            chunk,
            start..end,
            &self.entries[start..end],
            self.end_use_columns,
            self.entries.len(),
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.remaining();
        (n, Some(n))
    }
}
