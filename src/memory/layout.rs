use crate::lang::{ScalarType, Segment};
use serde::{Deserialize, Serialize};

/// Number of slots reserved for each type inside each segment.
///
/// Indexed as `sizes[segment.index()][ty.index()]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutConfig {
    pub sizes: [[usize; 5]; 4],
}

impl LayoutConfig {
    /// Every segment × type range gets `slots` addresses.
    pub fn uniform(slots: usize) -> Self {
        LayoutConfig {
            sizes: [[slots; 5]; 4],
        }
    }

    pub fn with_size(mut self, segment: Segment, ty: ScalarType, slots: usize) -> Self {
        self.sizes[segment.index()][ty.index()] = slots;
        self
    }

    pub fn size(&self, segment: Segment, ty: ScalarType) -> usize {
        self.sizes[segment.index()][ty.index()]
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        LayoutConfig::uniform(1000)
    }
}

/// One contiguous address range owned by a segment × type pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeRange {
    pub segment: Segment,
    pub ty: ScalarType,
    pub start: usize,
    pub len: usize,
}

impl TypeRange {
    /// One past the last address of the range.
    pub fn limit(&self) -> usize {
        self.start + self.len
    }

    pub fn contains(&self, address: usize) -> bool {
        address >= self.start && address < self.limit()
    }

    pub fn offset(&self, address: usize) -> usize {
        address - self.start
    }
}

/// The full virtual address space.
///
/// Ranges are laid out segment by segment (`Global`, `Local`, `Temporary`,
/// `Constant`), and inside each segment type by type (`Int`, `Float`,
/// `Bool`, `String`, `Pointer`). The heap starts right after the last range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryLayout {
    config: LayoutConfig,
    ranges: Vec<TypeRange>,
    heap_start: usize,
}

impl MemoryLayout {
    pub fn new(config: LayoutConfig) -> Self {
        let mut ranges = Vec::with_capacity(Segment::ALL.len() * ScalarType::ALL.len());
        let mut next = 0;

        for segment in Segment::ALL {
            for ty in ScalarType::ALL {
                let len = config.size(segment, ty);
                ranges.push(TypeRange {
                    segment,
                    ty,
                    start: next,
                    len,
                });
                next += len;
            }
        }

        MemoryLayout {
            config,
            ranges,
            heap_start: next,
        }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    pub fn range(&self, segment: Segment, ty: ScalarType) -> &TypeRange {
        &self.ranges[segment.index() * ScalarType::ALL.len() + ty.index()]
    }

    pub fn ranges(&self) -> &[TypeRange] {
        &self.ranges
    }

    /// Find the range owning `address`. Heap addresses have no range.
    pub fn locate(&self, address: usize) -> Option<&TypeRange> {
        self.ranges.iter().find(|r| r.contains(address))
    }

    pub fn heap_start(&self) -> usize {
        self.heap_start
    }
}

impl Default for MemoryLayout {
    fn default() -> Self {
        MemoryLayout::new(LayoutConfig::default())
    }
}
