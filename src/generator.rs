//! Run generation by replacement selection.

use std::cmp::Ordering;
use std::iter::Peekable;

use log;

use crate::block::BlockWriter;
use crate::heap::BoundedMinHeap;
use crate::record::Record;
use crate::run::{Run, RunCatalog, RunId};
use crate::sort::SortError;

/// Replacement selection run generator.
///
/// The heap backing array is split into an *active* region, the records that still fit the run being
/// written, and a *frozen* region right behind it that collects records smaller than an already emitted
/// one. When the active region runs dry the current run is complete and the frozen records become the
/// active region of the next run. On random input runs are about twice the heap capacity long.
///
/// Records are compared by key and then by id, so a record whose key equals the one just written but whose
/// id is smaller is frozen too. Input with many duplicate keys therefore yields more runs, and more merge
/// passes, than a comparison by key alone would.
pub struct RunGenerator<'a> {
    heap: &'a mut BoundedMinHeap<Record>,
}

impl<'a> RunGenerator<'a> {
    /// Creates a generator using `heap` as its working memory.
    pub fn new(heap: &'a mut BoundedMinHeap<Record>) -> Self {
        RunGenerator { heap }
    }

    /// Fills the heap from the input until the heap is full or the input ends.
    /// Returns `true` if the whole input fits in the heap.
    pub fn preload<I>(&mut self, input: &mut Peekable<I>) -> Result<bool, SortError>
    where
        I: Iterator<Item = Result<Record, SortError>>,
    {
        while !self.heap.is_full() {
            match input.next() {
                Some(record) => self.heap.insert(record?)?,
                None => return Ok(true),
            }
        }

        return Ok(input.peek().is_none());
    }

    /// Writes the preloaded heap and the rest of the input as a sequence of sorted runs.
    /// Returns the catalog of the written runs in output order.
    ///
    /// # Arguments
    /// * `input` - Records not yet loaded into the heap
    /// * `output` - Run file writer, run offsets are taken from its position
    pub fn generate<I>(&mut self, input: &mut I, output: &mut BlockWriter<'_>) -> Result<RunCatalog, SortError>
    where
        I: Iterator<Item = Result<Record, SortError>>,
    {
        let mut catalog = RunCatalog::new();
        let mut run_start = output.position();
        let mut frozen_start = self.heap.len();
        let mut frozen = 0;
        let mut input_done = false;

        while !self.heap.is_empty() {
            let min = *self.heap.peek_min()?;
            output.push(&min).map_err(SortError::IO)?;

            let incoming = if input_done { None } else { input.next().transpose()? };
            match incoming {
                // the incoming record is compared to the one just written, not to the new root
                Some(record) if Record::compare(&record, &min) != Ordering::Less => {
                    self.heap.replace_root(record)?;
                }
                Some(record) => {
                    self.heap.remove_min()?;
                    self.heap.freeze(record)?;
                    frozen_start = self.heap.len();
                    frozen += 1;
                }
                None => {
                    input_done = true;
                    self.heap.remove_min()?;
                }
            }

            if self.heap.is_empty() {
                let run_end = output.position();
                let run = Run::new(catalog.len() as RunId, run_start, run_end);
                log::debug!(
                    "run {} complete (bytes: {}..{}, frozen records: {})",
                    run.id(),
                    run.start(),
                    run.end(),
                    frozen
                );
                catalog.push(run);
                run_start = run_end;

                if frozen > 0 {
                    self.heap.reactivate(frozen_start, frozen)?;
                    frozen_start = self.heap.len();
                    frozen = 0;
                }
            }
        }

        log::info!("generated {} runs", catalog.len());

        return Ok(catalog);
    }
}
