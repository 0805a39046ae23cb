//! Bounded binary min-heap.

use std::cmp::Ordering;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// Heap invariant breach.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapError {
    /// The heap (or the requested logical size) would exceed the given capacity.
    CapacityViolation(usize),
    /// The heap holds no items.
    EmptyHeapUnderflow,
}

impl Error for HeapError {}

impl Display for HeapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            HeapError::CapacityViolation(capacity) => write!(f, "heap capacity of {} items exceeded", capacity),
            HeapError::EmptyHeapUnderflow => write!(f, "heap is empty"),
        }
    }
}

/// Array-backed binary min-heap with a fixed capacity.
///
/// The heap keeps a *logical size* that can shrink and grow inside the backing array without reallocation.
/// Slots past the logical size keep their contents, which lets a caller park items there (see
/// [`BoundedMinHeap::freeze`]) and later turn them back into a heap (see [`BoundedMinHeap::reactivate`]).
pub struct BoundedMinHeap<T> {
    slots: Vec<T>,
    size: usize,
    capacity: usize,
    compare: fn(&T, &T) -> Ordering,
}

impl<T: Clone> BoundedMinHeap<T> {
    /// Creates an empty heap. The backing array is allocated once for `capacity` items.
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of items the heap can hold
    /// * `compare` - Function used to order items, the smallest item is kept at the root
    pub fn new(capacity: usize, compare: fn(&T, &T) -> Ordering) -> Self {
        BoundedMinHeap {
            slots: Vec::with_capacity(capacity),
            size: 0,
            capacity,
            compare,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the logical size.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn is_full(&self) -> bool {
        self.size == self.capacity
    }

    /// Returns the active region in heap order.
    pub fn as_slice(&self) -> &[T] {
        &self.slots[..self.size]
    }

    /// Inserts an item into the active region.
    pub fn insert(&mut self, item: T) -> Result<(), HeapError> {
        if self.size == self.capacity {
            return Err(HeapError::CapacityViolation(self.capacity));
        }

        self.put(self.size, item);
        self.size += 1;
        self.sift_up(self.size - 1);

        return Ok(());
    }

    /// Returns the smallest item without removing it.
    pub fn peek_min(&self) -> Result<&T, HeapError> {
        if self.size == 0 {
            return Err(HeapError::EmptyHeapUnderflow);
        }
        return Ok(&self.slots[0]);
    }

    /// Removes and returns the smallest item.
    /// The removed item stays in the slot right past the shrunk active region until that slot is reused.
    pub fn remove_min(&mut self) -> Result<T, HeapError> {
        if self.size == 0 {
            return Err(HeapError::EmptyHeapUnderflow);
        }

        self.size -= 1;
        self.slots.swap(0, self.size);
        self.sift_down(0);

        return Ok(self.slots[self.size].clone());
    }

    /// Overwrites the root with `item` and restores the heap order. The logical size is unchanged.
    /// Returns the replaced root.
    pub fn replace_root(&mut self, item: T) -> Result<T, HeapError> {
        if self.size == 0 {
            return Err(HeapError::EmptyHeapUnderflow);
        }

        let root = std::mem::replace(&mut self.slots[0], item);
        self.sift_down(0);

        return Ok(root);
    }

    /// Stores `item` in the first slot past the active region without adding it to the heap.
    pub fn freeze(&mut self, item: T) -> Result<(), HeapError> {
        if self.size == self.capacity {
            return Err(HeapError::CapacityViolation(self.capacity));
        }

        self.put(self.size, item);

        return Ok(());
    }

    /// Resets the logical size to the first `size` slots of the backing array.
    /// The heap order of the new active region is not restored until [`BoundedMinHeap::rebuild`] is called.
    pub fn set_logical_size(&mut self, size: usize) -> Result<(), HeapError> {
        if size > self.slots.len() {
            return Err(HeapError::CapacityViolation(self.slots.len()));
        }

        self.size = size;

        return Ok(());
    }

    /// Restores the heap order over the active region.
    pub fn rebuild(&mut self) {
        for idx in (0..self.size / 2).rev() {
            self.sift_down(idx);
        }
    }

    /// Moves the `count` slots starting at `start` to the front of the backing array and makes them
    /// the new active region.
    pub fn reactivate(&mut self, start: usize, count: usize) -> Result<(), HeapError> {
        if start + count > self.slots.len() {
            return Err(HeapError::CapacityViolation(self.slots.len()));
        }

        self.slots[..start + count].rotate_left(start);
        self.set_logical_size(count)?;
        self.rebuild();

        return Ok(());
    }

    /// Empties the heap keeping the backing allocation.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.size = 0;
    }

    fn put(&mut self, idx: usize, item: T) {
        if idx < self.slots.len() {
            self.slots[idx] = item;
        } else {
            self.slots.push(item);
        }
    }

    fn less(&self, a: usize, b: usize) -> bool {
        (self.compare)(&self.slots[a], &self.slots[b]) == Ordering::Less
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !self.less(idx, parent) {
                break;
            }
            self.slots.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        loop {
            let left = 2 * idx + 1;
            if left >= self.size {
                break;
            }

            let right = left + 1;
            let child = if right < self.size && self.less(right, left) {
                right
            } else {
                left
            };

            if !self.less(child, idx) {
                break;
            }
            self.slots.swap(idx, child);
            idx = child;
        }
    }
}

#[cfg(test)]
mod test {
    use rand::seq::SliceRandom;
    use rstest::*;

    use super::{BoundedMinHeap, HeapError};

    fn heap_of(capacity: usize, items: &[i32]) -> BoundedMinHeap<i32> {
        let mut heap = BoundedMinHeap::new(capacity, i32::cmp);
        for item in items {
            heap.insert(*item).unwrap();
        }
        heap
    }

    fn assert_heap_order(heap: &BoundedMinHeap<i32>) {
        let slots = heap.as_slice();
        for idx in 1..slots.len() {
            assert!(slots[(idx - 1) / 2] <= slots[idx], "heap order broken at {}: {:?}", idx, slots);
        }
    }

    #[test]
    fn test_heap_drains_in_order() {
        let mut items = Vec::from_iter(0..100);
        items.shuffle(&mut rand::thread_rng());

        let mut heap = heap_of(100, &items);
        assert!(heap.is_full());
        assert_heap_order(&heap);

        let mut drained = Vec::new();
        while !heap.is_empty() {
            drained.push(heap.remove_min().unwrap());
            assert_heap_order(&heap);
        }

        assert_eq!(drained, Vec::from_iter(0..100));
    }

    #[test]
    fn test_heap_insert_over_capacity() {
        let mut heap = heap_of(2, &[2, 1]);

        assert_eq!(heap.insert(0), Err(HeapError::CapacityViolation(2)));
        assert_eq!(heap.freeze(0), Err(HeapError::CapacityViolation(2)));
        assert_eq!(heap.len(), 2);
        assert_eq!(heap.peek_min(), Ok(&1));
    }

    #[rstest]
    #[case(heap_of(4, &[]))]
    #[case(BoundedMinHeap::new(0, i32::cmp))]
    fn test_heap_underflow(#[case] heap: BoundedMinHeap<i32>) {
        let mut heap = heap;
        assert_eq!(heap.peek_min(), Err(HeapError::EmptyHeapUnderflow));
        assert_eq!(heap.remove_min(), Err(HeapError::EmptyHeapUnderflow));
        assert_eq!(heap.replace_root(1), Err(HeapError::EmptyHeapUnderflow));
        assert_eq!(heap.len(), 0);
    }

    #[test]
    fn test_heap_replace_root() {
        let mut heap = heap_of(4, &[3, 1, 4, 2]);

        assert_eq!(heap.replace_root(5), Ok(1));
        assert_eq!(heap.len(), 4);
        assert_heap_order(&heap);
        assert_eq!(heap.peek_min(), Ok(&2));
    }

    #[test]
    fn test_heap_freeze_and_reactivate() {
        let mut heap = heap_of(4, &[10, 20, 30, 40]);

        // emit the smallest item and park an incoming one in the vacated slot, twice
        assert_eq!(heap.remove_min(), Ok(10));
        heap.freeze(2).unwrap();
        assert_eq!(heap.remove_min(), Ok(20));
        heap.freeze(1).unwrap();
        assert_eq!(heap.len(), 2);

        // the parked region starts right past the active region
        heap.reactivate(2, 2).unwrap();
        assert_eq!(heap.len(), 2);
        assert_heap_order(&heap);
        assert_eq!(heap.remove_min(), Ok(1));
        assert_eq!(heap.remove_min(), Ok(2));
        assert!(heap.is_empty());
    }

    #[test]
    fn test_heap_set_logical_size() {
        let mut heap = heap_of(8, &[5, 6, 7]);

        heap.set_logical_size(1).unwrap();
        assert_eq!(heap.len(), 1);
        heap.set_logical_size(3).unwrap();
        heap.rebuild();
        assert_heap_order(&heap);

        assert_eq!(heap.set_logical_size(4), Err(HeapError::CapacityViolation(3)));
        assert_eq!(heap.reactivate(2, 2), Err(HeapError::CapacityViolation(3)));
    }
}
