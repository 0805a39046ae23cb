//! `rs-sort` sorts binary files of fixed-size records that do not fit in memory.
//!
//! A file is a flat sequence of 16-byte records, each an 8-byte big-endian integer id followed by an 8-byte
//! big-endian floating point key. Sorting reorders the records of the file in place by non-decreasing key.
//!
//! External sorting is done in two phases. During the first phase *replacement selection* streams the file
//! through a bounded min-heap and writes sorted runs which are on average twice as long as the heap. During the
//! second phase runs are merged a bounded number at a time, pass after pass, until a single sorted run is left.
//! Memory consumption is fixed by the heap size whatever the file size. Files fitting in the heap are sorted
//! in memory. For more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Example
//!
//! ```no_run
//! use std::path;
//!
//! use env_logger;
//! use log;
//!
//! use rs_sort::{ExternalSorter, ExternalSorterBuilder};
//!
//! fn main() {
//!     env_logger::Builder::new().filter_level(log::LevelFilter::Debug).init();
//!
//!     let sorter: ExternalSorter = ExternalSorterBuilder::new()
//!         .with_tmp_dir(path::Path::new("./"))
//!         .with_block_size(8192)
//!         .with_heap_blocks(8)
//!         .build()
//!         .unwrap();
//!
//!     let summary = sorter.sort_file(path::Path::new("records.bin")).unwrap();
//!     log::info!("{} records sorted in {} merge passes", summary.records, summary.merge_passes);
//! }
//! ```

pub mod block;
pub mod generator;
pub mod heap;
pub mod merger;
pub mod record;
pub mod run;
pub mod sort;

pub use block::{BlockHeads, BlockStore, BlockWriter, RecordReader};
pub use generator::RunGenerator;
pub use heap::{BoundedMinHeap, HeapError};
pub use merger::MergeEngine;
pub use record::{Record, RECORD_SIZE};
pub use run::{Run, RunCatalog, RunId};
pub use sort::{ExternalSorter, ExternalSorterBuilder, SortError, SortSummary};
