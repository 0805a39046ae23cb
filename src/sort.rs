//! External sorter.

use log;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::path::Path;

use crate::block::{BlockStore, BlockWriter, RecordReader};
use crate::generator::RunGenerator;
use crate::heap::{BoundedMinHeap, HeapError};
use crate::merger::MergeEngine;
use crate::record::{Record, RECORD_SIZE};
use crate::run::{RunCatalog, RunId};

/// Default block size in bytes.
pub const DEFAULT_BLOCK_SIZE: usize = 8192;
/// Default heap size in blocks, which is also the default merge fan-in.
pub const DEFAULT_HEAP_BLOCKS: usize = 8;

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// Temporary directory or file creation error.
    TempDir(io::Error),
    /// Common I/O error.
    IO(io::Error),
    /// Input file is not a whole number of records.
    MalformedInput(String),
    /// Heap insertion beyond its capacity.
    CapacityViolation(usize),
    /// Item requested from an empty heap.
    EmptyHeapUnderflow,
    /// Merge referenced a run missing from the merged group.
    UnknownRun(RunId),
    /// Sorter configuration error.
    InvalidConfig(String),
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::TempDir(err) => Some(err),
            SortError::IO(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::TempDir(err) => write!(f, "temporary directory or file not created: {}", err),
            SortError::IO(err) => write!(f, "I/O operation failed: {}", err),
            SortError::MalformedInput(reason) => write!(f, "malformed input: {}", reason),
            SortError::CapacityViolation(capacity) => write!(f, "heap capacity of {} records exceeded", capacity),
            SortError::EmptyHeapUnderflow => write!(f, "record requested from an empty heap"),
            SortError::UnknownRun(id) => write!(f, "run {} not found", id),
            SortError::InvalidConfig(reason) => write!(f, "invalid sorter configuration: {}", reason),
        }
    }
}

impl From<HeapError> for SortError {
    fn from(err: HeapError) -> Self {
        match err {
            HeapError::CapacityViolation(capacity) => SortError::CapacityViolation(capacity),
            HeapError::EmptyHeapUnderflow => SortError::EmptyHeapUnderflow,
        }
    }
}

/// Sorting outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortSummary {
    /// Number of sorted records.
    pub records: u64,
    /// Number of runs produced by run generation.
    pub runs: usize,
    /// Number of merge passes.
    pub merge_passes: usize,
    /// Whether the file was small enough to be sorted in memory.
    pub in_memory: bool,
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Clone, Debug)]
pub struct ExternalSorterBuilder {
    /// File read/write block size in bytes.
    block_size: usize,
    /// Heap size in blocks.
    heap_blocks: usize,
    /// Directory to be used to store temporary data.
    tmp_dir: Option<Box<Path>>,
    /// Whether files fitting in the heap are sorted without run files.
    in_memory_sort: bool,
}

impl ExternalSorterBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter, SortError> {
        ExternalSorter::new(
            self.block_size,
            self.heap_blocks,
            self.tmp_dir.as_deref(),
            self.in_memory_sort,
        )
    }

    /// Sets block size in bytes. Must be a positive multiple of the record size.
    pub fn with_block_size(mut self, block_size: usize) -> ExternalSorterBuilder {
        self.block_size = block_size;
        return self;
    }

    /// Sets heap size in blocks. The same number is used as merge fan-in.
    pub fn with_heap_blocks(mut self, heap_blocks: usize) -> ExternalSorterBuilder {
        self.heap_blocks = heap_blocks;
        return self;
    }

    /// Sets directory to be used to store temporary data.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Enables or disables sorting of files fitting in the heap without run files.
    pub fn with_in_memory_sort(mut self, enabled: bool) -> ExternalSorterBuilder {
        self.in_memory_sort = enabled;
        return self;
    }
}

impl Default for ExternalSorterBuilder {
    fn default() -> Self {
        ExternalSorterBuilder {
            block_size: DEFAULT_BLOCK_SIZE,
            heap_blocks: DEFAULT_HEAP_BLOCKS,
            tmp_dir: None,
            in_memory_sort: true,
        }
    }
}

/// External sorter of binary record files.
///
/// Sorting uses a heap of `heap_blocks` blocks. Replacement selection turns the file into sorted runs
/// which are then merged `heap_blocks` at a time until one run is left. Memory use is bounded by the heap
/// and a few block buffers whatever the file size.
pub struct ExternalSorter {
    /// Directory to be used to store temporary data.
    tmp_dir: tempfile::TempDir,
    /// File read/write block size in bytes.
    block_size: usize,
    /// Heap size in blocks.
    heap_blocks: usize,
    /// Whether files fitting in the heap are sorted without run files.
    in_memory_sort: bool,
}

impl ExternalSorter {
    /// Creates a new external sorter instance.
    ///
    /// # Arguments
    /// * `block_size` - File read/write block size in bytes, a positive multiple of the record size.
    /// * `heap_blocks` - Heap size in blocks and merge fan-in, at least 2.
    /// * `tmp_path` - Directory to be used to store temporary data. If paramater is [`None`] default OS temporary
    ///   directory will be used.
    /// * `in_memory_sort` - Whether files fitting in the heap are sorted without run files.
    pub fn new(
        block_size: usize,
        heap_blocks: usize,
        tmp_path: Option<&Path>,
        in_memory_sort: bool,
    ) -> Result<Self, SortError> {
        if block_size == 0 || block_size % RECORD_SIZE != 0 {
            return Err(SortError::InvalidConfig(format!(
                "block size {} is not a positive multiple of {}",
                block_size, RECORD_SIZE
            )));
        }
        if heap_blocks < 2 {
            return Err(SortError::InvalidConfig(format!(
                "heap of {} blocks is too small to merge runs",
                heap_blocks
            )));
        }

        return Ok(ExternalSorter {
            block_size,
            heap_blocks,
            in_memory_sort,
            tmp_dir: Self::init_tmp_directory(tmp_path)?,
        });
    }

    fn init_tmp_directory(tmp_path: Option<&Path>) -> Result<tempfile::TempDir, SortError> {
        let tmp_dir = if let Some(tmp_path) = tmp_path {
            tempfile::tempdir_in(tmp_path)
        } else {
            tempfile::tempdir()
        }
        .map_err(|err| SortError::TempDir(err))?;

        log::info!("using {} as a temporary directory", tmp_dir.path().display());

        return Ok(tmp_dir);
    }

    /// Directory holding scratch files while sorting.
    pub fn tmp_dir(&self) -> &Path {
        self.tmp_dir.path()
    }

    /// Heap capacity in records.
    pub fn heap_capacity(&self) -> usize {
        self.heap_blocks * self.block_size / RECORD_SIZE
    }

    /// Sorts the records of the file in place by non-decreasing key.
    ///
    /// A file whose length is not a multiple of the record size is rejected before it is modified.
    ///
    /// # Arguments
    /// * `path` - File to be sorted
    pub fn sort_file(&self, path: &Path) -> Result<SortSummary, SortError> {
        let mut store = BlockStore::open(path).map_err(SortError::IO)?;

        let file_len = store.len().map_err(SortError::IO)?;
        if file_len % RECORD_SIZE as u64 != 0 {
            return Err(SortError::MalformedInput(format!(
                "{} is {} bytes long which is not a multiple of {}",
                path.display(),
                file_len,
                RECORD_SIZE
            )));
        }

        let records = file_len / RECORD_SIZE as u64;
        log::info!("sorting {} (records: {})", path.display(), records);

        if records == 0 {
            return Ok(SortSummary::default());
        }

        let (scratch, catalog) = match self.generate_runs(&mut store)? {
            Some(generated) => generated,
            None => {
                log::info!("sorted in memory");
                return Ok(SortSummary {
                    records,
                    in_memory: true,
                    ..SortSummary::default()
                });
            }
        };

        let store = store.replace_with(scratch).map_err(SortError::IO)?;
        let runs = catalog.len();

        let mut merger = MergeEngine::new(self.heap_blocks, self.block_size, self.tmp_dir.path());
        let (_store, merge_passes) = merger.merge(store, catalog)?;

        return Ok(SortSummary {
            records,
            runs,
            merge_passes,
            in_memory: false,
        });
    }

    /// Loads the heap and either sorts the file in place, if it fits in the heap, or writes sorted runs to a
    /// scratch file. Returns the scratch file with its run catalog in the latter case.
    fn generate_runs(&self, store: &mut BlockStore) -> Result<Option<(BlockStore, RunCatalog)>, SortError> {
        let mut heap = BoundedMinHeap::new(self.heap_capacity(), Record::compare);
        let mut generator = RunGenerator::new(&mut heap);

        let mut input = RecordReader::new(store, self.block_size).peekable();
        let fits = generator.preload(&mut input)?;

        if fits && self.in_memory_sort {
            drop(input);
            self.sort_in_memory(&mut heap, store)?;
            return Ok(None);
        }

        let mut scratch = BlockStore::scratch(self.tmp_dir.path(), "runs").map_err(SortError::TempDir)?;
        let mut output = BlockWriter::new(&mut scratch, self.block_size);
        let catalog = generator.generate(&mut input, &mut output)?;
        output.finish().map_err(SortError::IO)?;

        return Ok(Some((scratch, catalog)));
    }

    fn sort_in_memory(&self, heap: &mut BoundedMinHeap<Record>, store: &mut BlockStore) -> Result<(), SortError> {
        store.rewind().map_err(SortError::IO)?;

        let mut output = BlockWriter::new(store, self.block_size);
        while !heap.is_empty() {
            output.push(&heap.remove_min()?).map_err(SortError::IO)?;
        }
        output.finish().map_err(SortError::IO)?;

        return Ok(());
    }
}
