//! Bounded fan-in multiway merger.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use log;

use crate::block::{BlockStore, BlockWriter};
use crate::heap::BoundedMinHeap;
use crate::record::{decode_all, Record, RECORD_SIZE};
use crate::run::{Run, RunCatalog, RunId};
use crate::sort::SortError;

/// Merge heap entry. Only the last record of every loaded block carries the run it came from:
/// removing it from the heap is the signal to load the next block of that run.
#[derive(Debug, Clone, Copy)]
struct MergeEntry {
    record: Record,
    origin: Option<RunId>,
}

impl MergeEntry {
    // Tagged entries go after untagged ones with an equal record, so a run's next block is loaded only
    // once its previous block has left the heap entirely.
    fn compare(a: &MergeEntry, b: &MergeEntry) -> Ordering {
        Record::compare(&a.record, &b.record).then(a.origin.is_some().cmp(&b.origin.is_some()))
    }
}

/// Multiway merger combining at most `fan_in` runs at a time.
/// Every pass merges consecutive groups of runs from the current run file into a scratch file which then
/// replaces the run file. Passes are repeated until a single run is left, which takes
/// ⌈log<sub>fan_in</sub>(*runs*)⌉ passes.
pub struct MergeEngine {
    fan_in: usize,
    tmp_dir: PathBuf,
    heap: BoundedMinHeap<MergeEntry>,
    block: Vec<u8>,
}

impl MergeEngine {
    /// Creates a merger.
    ///
    /// # Arguments
    /// * `fan_in` - Maximum number of runs merged together, at least 2
    /// * `block_size` - Block size in bytes, a multiple of the record size
    /// * `tmp_dir` - Directory for merge output scratch files
    pub fn new(fan_in: usize, block_size: usize, tmp_dir: &Path) -> Self {
        let records_per_block = block_size / RECORD_SIZE;

        MergeEngine {
            fan_in,
            tmp_dir: tmp_dir.to_path_buf(),
            heap: BoundedMinHeap::new(fan_in * records_per_block, MergeEntry::compare),
            block: vec![0; block_size],
        }
    }

    pub fn fan_in(&self) -> usize {
        self.fan_in
    }

    /// Merges all runs of `store` into a single one. Returns the store holding the merged file and the
    /// number of passes performed.
    pub fn merge(&mut self, mut store: BlockStore, mut catalog: RunCatalog) -> Result<(BlockStore, usize), SortError> {
        let mut passes = 0;

        while catalog.len() > 1 {
            log::info!(
                "merge pass {} started (runs: {}, fan-in: {})",
                passes + 1,
                catalog.len(),
                self.fan_in
            );

            let mut scratch = BlockStore::scratch(&self.tmp_dir, "merge").map_err(SortError::TempDir)?;
            let mut output = BlockWriter::new(&mut scratch, self.block.len());
            let merged = self.merge_pass(&mut store, catalog, &mut output)?;
            output.finish().map_err(SortError::IO)?;

            store = store.replace_with(scratch).map_err(SortError::IO)?;
            catalog = merged;
            passes += 1;
        }

        log::info!("merge done (passes: {})", passes);

        return Ok((store, passes));
    }

    /// Performs a single merge pass: merges consecutive groups of up to `fan_in` runs of `input` into
    /// `output`. Returns the catalog of the merged runs.
    pub fn merge_pass(
        &mut self,
        input: &mut BlockStore,
        mut catalog: RunCatalog,
        output: &mut BlockWriter<'_>,
    ) -> Result<RunCatalog, SortError> {
        let mut merged = RunCatalog::new();

        while !catalog.is_empty() {
            let group = catalog.take_batch(self.fan_in);
            let run = self.merge_group(input, group, merged.len() as RunId, output)?;
            merged.push(run);
        }

        return Ok(merged);
    }

    fn merge_group(
        &mut self,
        input: &mut BlockStore,
        mut group: RunCatalog,
        id: RunId,
        output: &mut BlockWriter<'_>,
    ) -> Result<Run, SortError> {
        let start = output.position();
        self.heap.clear();

        let ids = Vec::from_iter(group.iter().map(Run::id));
        for run_id in ids {
            self.load_next_block(input, &mut group, run_id)?;
        }

        while !self.heap.is_empty() {
            let entry = self.heap.remove_min()?;
            output.push(&entry.record).map_err(SortError::IO)?;

            if let Some(run_id) = entry.origin {
                self.load_next_block(input, &mut group, run_id)?;
            }
        }

        debug_assert!(group.iter().all(Run::is_exhausted));

        let run = Run::new(id, start, output.position());
        log::debug!(
            "merged {} runs into run {} (bytes: {}..{})",
            group.len(),
            run.id(),
            run.start(),
            run.end()
        );

        return Ok(run);
    }

    /// Loads the next block of a run, or the rest of it if less than a block is left, into the heap.
    fn load_next_block(&mut self, input: &mut BlockStore, group: &mut RunCatalog, id: RunId) -> Result<(), SortError> {
        let run = group.get_mut(id).ok_or(SortError::UnknownRun(id))?;
        if run.is_exhausted() {
            return Ok(());
        }

        let len = run.remaining().min(self.block.len() as u64) as usize;
        let read = input
            .read_at(run.cursor(), &mut self.block[..len])
            .map_err(SortError::IO)?;
        if read != len || len % RECORD_SIZE != 0 {
            return Err(SortError::MalformedInput(format!(
                "run {} truncated at byte {}",
                id,
                run.cursor() + read as u64
            )));
        }
        run.advance(len as u64);

        let last = len / RECORD_SIZE - 1;
        let has_more = !run.is_exhausted();
        for (idx, record) in decode_all(&self.block[..len]).enumerate() {
            let origin = if idx == last && has_more { Some(id) } else { None };
            self.heap.insert(MergeEntry { record, origin })?;
        }

        return Ok(());
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::path::Path;

    use rand::seq::SliceRandom;
    use rstest::*;

    use super::MergeEngine;
    use crate::block::{BlockStore, BlockWriter};
    use crate::record::{decode_all, Record, RECORD_SIZE};
    use crate::run::{Run, RunCatalog, RunId};

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    /// Writes every run sorted, one after another, and returns the run file with its catalog.
    fn write_runs(dir: &Path, runs: Vec<Vec<Record>>) -> (BlockStore, RunCatalog) {
        let path = dir.join("runs.bin");
        fs::write(&path, b"").unwrap();

        let mut store = BlockStore::open(&path).unwrap();
        let mut catalog = RunCatalog::new();
        let mut writer = BlockWriter::new(&mut store, RECORD_SIZE);
        for (id, mut run) in runs.into_iter().enumerate() {
            run.sort_by(Record::compare);
            let start = writer.position();
            for record in &run {
                writer.push(record).unwrap();
            }
            catalog.push(Run::new(id as RunId, start, writer.position()));
        }
        writer.finish().unwrap();

        (store, catalog)
    }

    fn read_records(path: &Path) -> Vec<Record> {
        Vec::from_iter(decode_all(&fs::read(path).unwrap()))
    }

    fn shuffled_runs(run_count: usize, run_len: usize) -> Vec<Vec<Record>> {
        let mut ids = Vec::from_iter(0..(run_count * run_len) as i64);
        ids.shuffle(&mut rand::thread_rng());

        Vec::from_iter(ids.chunks(run_len.max(1)).map(|chunk| {
            Vec::from_iter(chunk.iter().map(|id| Record::new(*id, (*id % 17) as f64 * 0.5)))
        }))
    }

    #[rstest]
    fn test_nine_single_record_runs(tmp_dir: tempfile::TempDir) {
        let runs = Vec::from_iter((0..9).rev().map(|key| vec![Record::new(key, key as f64)]));
        let (mut store, catalog) = write_runs(tmp_dir.path(), runs);

        let mut merger = MergeEngine::new(8, RECORD_SIZE, tmp_dir.path());

        let mut scratch = BlockStore::scratch(tmp_dir.path(), "merge").unwrap();
        let mut output = BlockWriter::new(&mut scratch, RECORD_SIZE);
        let first_pass = merger.merge_pass(&mut store, catalog, &mut output).unwrap();
        output.finish().unwrap();

        assert_eq!(
            Vec::from_iter(first_pass.iter().map(Run::len)),
            vec![8 * RECORD_SIZE as u64, RECORD_SIZE as u64]
        );
        let keys = Vec::from_iter(read_records(scratch.path()).iter().map(|record| record.key));
        assert_eq!(keys, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 0.0]);

        let store = store.replace_with(scratch).unwrap();
        let (store, passes) = merger.merge(store, first_pass).unwrap();

        assert_eq!(passes, 1);
        let keys = Vec::from_iter(read_records(store.path()).iter().map(|record| record.key));
        assert_eq!(keys, Vec::from_iter((0..9).map(|key| key as f64)));
    }

    #[rstest]
    #[case(1, 8, 0)]
    #[case(2, 8, 1)]
    #[case(8, 8, 1)]
    #[case(9, 8, 2)]
    #[case(64, 8, 2)]
    #[case(65, 8, 3)]
    #[case(5, 2, 3)]
    fn test_pass_count(
        tmp_dir: tempfile::TempDir,
        #[case] run_count: usize,
        #[case] fan_in: usize,
        #[case] expected_passes: usize,
    ) {
        let runs = shuffled_runs(run_count, 3);
        let mut expected = Vec::from_iter(runs.iter().flatten().copied());
        expected.sort_by(Record::compare);

        let (store, catalog) = write_runs(tmp_dir.path(), runs);
        let mut merger = MergeEngine::new(fan_in, 2 * RECORD_SIZE, tmp_dir.path());
        let (store, passes) = merger.merge(store, catalog).unwrap();

        assert_eq!(passes, expected_passes);
        assert_eq!(read_records(store.path()), expected);
    }

    #[rstest]
    #[case(1)]
    #[case(3)]
    #[case(16)]
    fn test_merge_with_duplicate_keys(tmp_dir: tempfile::TempDir, #[case] records_per_block: usize) {
        // equal keys across block boundaries must not overflow the merge heap
        let runs = Vec::from_iter((0..8).map(|run| {
            Vec::from_iter((0..20).map(|idx| Record::new(run * 100 + idx, (idx / 7) as f64)))
        }));
        let mut expected = Vec::from_iter(runs.iter().flatten().copied());
        expected.sort_by(Record::compare);

        let (store, catalog) = write_runs(tmp_dir.path(), runs);
        let mut merger = MergeEngine::new(8, records_per_block * RECORD_SIZE, tmp_dir.path());
        let (store, passes) = merger.merge(store, catalog).unwrap();

        assert_eq!(passes, 1);
        assert_eq!(read_records(store.path()), expected);
    }

    #[rstest]
    fn test_single_run_is_not_merged(tmp_dir: tempfile::TempDir) {
        let (store, catalog) = write_runs(tmp_dir.path(), shuffled_runs(1, 10));
        let before = read_records(store.path());

        let mut merger = MergeEngine::new(8, RECORD_SIZE, tmp_dir.path());
        let (store, passes) = merger.merge(store, catalog).unwrap();

        assert_eq!(passes, 0);
        assert_eq!(read_records(store.path()), before);
    }
}
