use crate::lang::Value;
use log::debug;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeapError {
    #[error("heap exhausted: requested {requested} cells, largest free range holds {largest}")]
    Exhausted { requested: usize, largest: usize },

    #[error("heap reference {reference} is not an allocated block")]
    DoubleFree { reference: usize },

    #[error("address {address} is outside the heap")]
    InvalidAddress { address: usize },
}

// =============================================================================
// FREE RANGES
// =============================================================================

/// Inclusive interval `[start, end]` of unallocated heap cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreeRange {
    pub start: usize,
    pub end: usize,
}

impl FreeRange {
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }
}

/// Larger ranges first; among equal sizes the lower start wins.
impl Ord for FreeRange {
    fn cmp(&self, other: &Self) -> Ordering {
        self.len()
            .cmp(&other.len())
            .then_with(|| other.start.cmp(&self.start))
    }
}

impl PartialOrd for FreeRange {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// =============================================================================
// HEAP ALLOCATOR
// =============================================================================

/// Range allocator for object blocks.
///
/// Always carves from the largest free range; freed blocks are merged back
/// with their neighbours.
#[derive(Debug, Clone)]
pub struct HeapAllocator {
    base: usize,
    size: usize,
    free: BinaryHeap<FreeRange>,
    /// Allocated block start -> inclusive end.
    allocated: HashMap<usize, usize>,
}

impl HeapAllocator {
    pub fn new(base: usize, size: usize) -> Self {
        let mut free = BinaryHeap::new();
        if size > 0 {
            free.push(FreeRange {
                start: base,
                end: base + size - 1,
            });
        }
        HeapAllocator {
            base,
            size,
            free,
            allocated: HashMap::new(),
        }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    pub fn contains(&self, address: usize) -> bool {
        address >= self.base && address < self.base + self.size
    }

    /// Reserve `size` contiguous cells. A zero-sized request still takes one.
    pub fn allocate(&mut self, size: usize) -> Result<usize, HeapError> {
        let size = size.max(1);
        let largest = self.free.peek().map(FreeRange::len).unwrap_or(0);
        if largest < size {
            return Err(HeapError::Exhausted {
                requested: size,
                largest,
            });
        }

        let Some(range) = self.free.pop() else {
            return Err(HeapError::Exhausted {
                requested: size,
                largest,
            });
        };

        let end = range.start + size - 1;
        if range.len() > size {
            self.free.push(FreeRange {
                start: end + 1,
                end: range.end,
            });
        }
        self.allocated.insert(range.start, end);
        debug!("heap: allocated [{}, {}]", range.start, end);
        Ok(range.start)
    }

    /// Return a block to the free pool and coalesce.
    pub fn free(&mut self, reference: usize) -> Result<(), HeapError> {
        let end = self
            .allocated
            .remove(&reference)
            .ok_or(HeapError::DoubleFree { reference })?;
        self.free.push(FreeRange {
            start: reference,
            end,
        });
        self.coalesce();
        debug!("heap: freed [{}, {}]", reference, end);
        Ok(())
    }

    fn coalesce(&mut self) {
        let mut ranges = std::mem::take(&mut self.free).into_vec();
        ranges.sort_by_key(|r| r.start);

        let mut merged: Vec<FreeRange> = Vec::with_capacity(ranges.len());
        for range in ranges {
            match merged.last_mut() {
                Some(last) if range.start <= last.end + 1 => {
                    last.end = last.end.max(range.end);
                }
                _ => merged.push(range),
            }
        }
        self.free = merged.into();
    }

    pub fn is_allocated(&self, reference: usize) -> bool {
        self.allocated.contains_key(&reference)
    }

    /// Inclusive end of the block starting at `reference`.
    pub fn block_end(&self, reference: usize) -> Option<usize> {
        self.allocated.get(&reference).copied()
    }

    /// Total number of free cells.
    pub fn available(&self) -> usize {
        self.free.iter().map(FreeRange::len).sum()
    }

    /// Free ranges ordered by start address.
    pub fn free_ranges(&self) -> Vec<FreeRange> {
        let mut ranges = self.free.clone().into_vec();
        ranges.sort_by_key(|r| r.start);
        ranges
    }
}

// =============================================================================
// HEAP STORAGE
// =============================================================================

/// Runtime object store: cells plus the allocator that manages them.
///
/// Cell addresses continue the virtual address space, so a `Pointer`
/// value can name either a segment slot or a heap cell.
#[derive(Debug, Clone)]
pub struct Heap {
    allocator: HeapAllocator,
    cells: Vec<Option<Value>>,
}

impl Heap {
    pub fn new(base: usize, size: usize) -> Self {
        Heap {
            allocator: HeapAllocator::new(base, size),
            cells: vec![None; size],
        }
    }

    pub fn allocator(&self) -> &HeapAllocator {
        &self.allocator
    }

    pub fn contains(&self, address: usize) -> bool {
        self.allocator.contains(address)
    }

    fn cell_index(&self, address: usize) -> Result<usize, HeapError> {
        if self.contains(address) {
            Ok(address - self.allocator.base())
        } else {
            Err(HeapError::InvalidAddress { address })
        }
    }

    /// Allocate a block of `size` cleared cells.
    pub fn allocate(&mut self, size: usize) -> Result<usize, HeapError> {
        let start = self.allocator.allocate(size)?;
        let end = self.allocator.block_end(start).unwrap_or(start);
        for address in start..=end {
            let index = self.cell_index(address)?;
            self.cells[index] = None;
        }
        Ok(start)
    }

    pub fn read(&self, address: usize) -> Result<Option<&Value>, HeapError> {
        let index = self.cell_index(address)?;
        Ok(self.cells[index].as_ref())
    }

    pub fn write(&mut self, address: usize, value: Value) -> Result<(), HeapError> {
        let index = self.cell_index(address)?;
        self.cells[index] = Some(value);
        Ok(())
    }

    pub fn clear(&mut self, address: usize) -> Result<(), HeapError> {
        let index = self.cell_index(address)?;
        self.cells[index] = None;
        Ok(())
    }

    /// Free the block at `reference` together with every block reachable
    /// through pointer cells. Children are freed before their owners.
    ///
    /// Returns the number of blocks released.
    pub fn release_recursive(&mut self, reference: usize) -> Result<usize, HeapError> {
        if !self.allocator.is_allocated(reference) {
            return Err(HeapError::DoubleFree { reference });
        }

        let mut visited = HashSet::new();
        let mut pending = vec![reference];
        let mut order = Vec::new();

        while let Some(block) = pending.pop() {
            if !visited.insert(block) {
                continue;
            }
            let Some(end) = self.allocator.block_end(block) else {
                continue;
            };
            for address in block..=end {
                if let Some(Value::Pointer(target)) = self.read(address)? {
                    if self.allocator.is_allocated(*target) && !visited.contains(target) {
                        pending.push(*target);
                    }
                }
            }
            order.push(block);
        }

        for block in order.iter().rev() {
            if let Some(end) = self.allocator.block_end(*block) {
                for address in *block..=end {
                    let index = self.cell_index(address)?;
                    self.cells[index] = None;
                }
            }
            self.allocator.free(*block)?;
        }
        Ok(order.len())
    }
}
