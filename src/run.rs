//! Sorted runs and run catalog.

use std::collections::VecDeque;

/// Run identity, used for lookup only.
pub type RunId = u32;

/// Maximal sorted sequence of records stored in `[start, end)` bytes of a run file.
/// The read cursor moves from `start` to `end` while the run is being merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Run {
    id: RunId,
    start: u64,
    end: u64,
    cursor: u64,
}

impl Run {
    pub fn new(id: RunId, start: u64, end: u64) -> Self {
        debug_assert!(start <= end);
        Run {
            id,
            start,
            end,
            cursor: start,
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    /// Run length in bytes.
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Bytes left between the cursor and the end of the run.
    pub fn remaining(&self) -> u64 {
        self.end - self.cursor
    }

    pub fn is_exhausted(&self) -> bool {
        self.cursor == self.end
    }

    /// Moves the cursor forward by `bytes`, never past the end of the run.
    pub fn advance(&mut self, bytes: u64) {
        self.cursor = self.end.min(self.cursor + bytes);
    }
}

/// Ordered collection of runs. The order defines merge grouping, not key order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunCatalog {
    runs: VecDeque<Run>,
}

impl RunCatalog {
    pub fn new() -> Self {
        RunCatalog::default()
    }

    /// Appends a run. Run ids must be unique within the catalog.
    pub fn push(&mut self, run: Run) {
        self.runs.push_back(run);
    }

    pub fn get(&self, id: RunId) -> Option<&Run> {
        self.runs.iter().find(|run| run.id() == id)
    }

    pub fn get_mut(&mut self, id: RunId) -> Option<&mut Run> {
        self.runs.iter_mut().find(|run| run.id() == id)
    }

    /// Removes a run keeping the order of the others.
    pub fn remove(&mut self, id: RunId) -> Option<Run> {
        let idx = self.runs.iter().position(|run| run.id() == id)?;
        self.runs.remove(idx)
    }

    /// Splits off up to `size` runs from the front of the catalog.
    pub fn take_batch(&mut self, size: usize) -> RunCatalog {
        let size = size.min(self.runs.len());
        RunCatalog {
            runs: self.runs.drain(..size).collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Run> {
        self.runs.iter()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Total length of all runs in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.runs.iter().map(Run::len).sum()
    }
}

impl FromIterator<Run> for RunCatalog {
    fn from_iter<I: IntoIterator<Item = Run>>(iter: I) -> Self {
        let mut catalog = RunCatalog::new();
        for run in iter {
            catalog.push(run);
        }
        catalog
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::{Run, RunCatalog};

    #[fixture]
    fn catalog() -> RunCatalog {
        RunCatalog::from_iter((0..5).map(|id| Run::new(id, id as u64 * 32, (id as u64 + 1) * 32)))
    }

    #[test]
    fn test_run_cursor() {
        let mut run = Run::new(3, 16, 80);
        assert_eq!(run.len(), 64);
        assert_eq!(run.remaining(), 64);

        run.advance(48);
        assert_eq!(run.cursor(), 64);
        assert!(!run.is_exhausted());

        run.advance(48);
        assert_eq!(run.cursor(), 80);
        assert!(run.is_exhausted());
    }

    #[rstest]
    #[case(2, vec![0, 1], vec![2, 3, 4])]
    #[case(5, vec![0, 1, 2, 3, 4], vec![])]
    #[case(8, vec![0, 1, 2, 3, 4], vec![])]
    fn test_take_batch(
        catalog: RunCatalog,
        #[case] size: usize,
        #[case] expected_batch: Vec<u32>,
        #[case] expected_rest: Vec<u32>,
    ) {
        let mut catalog = catalog;
        let batch = catalog.take_batch(size);

        assert_eq!(Vec::from_iter(batch.iter().map(Run::id)), expected_batch);
        assert_eq!(Vec::from_iter(catalog.iter().map(Run::id)), expected_rest);
    }

    #[test]
    fn test_large_catalog() {
        let count = 200_000u32;
        let mut catalog = RunCatalog::from_iter((0..count).map(|id| Run::new(id, id as u64 * 16, (id as u64 + 1) * 16)));
        assert_eq!(catalog.len(), count as usize);
        assert_eq!(catalog.total_bytes(), count as u64 * 16);

        let mut passes = 0;
        while catalog.len() > 1 {
            let mut merged = RunCatalog::new();
            while !catalog.is_empty() {
                let batch = catalog.take_batch(8);
                let first = batch.iter().next().unwrap();
                merged.push(Run::new(merged.len() as u32, first.start(), first.start() + batch.total_bytes()));
            }
            catalog = merged;
            passes += 1;
        }

        assert_eq!(passes, 6);
        assert_eq!(catalog.get(0), Some(&Run::new(0, 0, count as u64 * 16)));
    }

    #[rstest]
    fn test_lookup_and_remove(catalog: RunCatalog) {
        let mut catalog = catalog;
        assert_eq!(catalog.total_bytes(), 160);

        catalog.get_mut(2).unwrap().advance(16);
        assert_eq!(catalog.get(2).unwrap().cursor(), 80);

        assert_eq!(catalog.remove(2), Some(Run { cursor: 80, ..Run::new(2, 64, 96) }));
        assert!(catalog.get(2).is_none());
        assert_eq!(Vec::from_iter(catalog.iter().map(Run::id)), vec![0, 1, 3, 4]);
        assert_eq!(catalog.remove(2), None);
    }
}
