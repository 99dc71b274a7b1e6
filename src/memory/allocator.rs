use super::layout::{MemoryLayout, TypeRange};
use crate::lang::{ScalarType, Segment};
use log::trace;
use std::collections::{HashSet, VecDeque};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocError {
    #[error("too many {ty} values in {segment} scope")]
    Exhausted { segment: Segment, ty: ScalarType },

    #[error("address {address} is not currently allocated")]
    NotAllocated { address: usize },

    #[error("address {address} is outside every segment")]
    OutOfRange { address: usize },
}

/// Bookkeeping for one segment × type range.
#[derive(Debug, Clone)]
struct TypeResource {
    range: TypeRange,
    /// Next never-used address.
    pointer: usize,
    free: VecDeque<usize>,
    /// Mirror of `free` for membership checks.
    freed: HashSet<usize>,
    /// Highest number of slots in use since the last reset.
    peak: usize,
}

impl TypeResource {
    fn new(range: TypeRange) -> Self {
        TypeResource {
            range,
            pointer: range.start,
            free: VecDeque::new(),
            freed: HashSet::new(),
            peak: 0,
        }
    }

    fn reset(&mut self) {
        self.pointer = self.range.start;
        self.free.clear();
        self.freed.clear();
    }

    fn bump(&mut self, len: usize) -> Option<usize> {
        if self.pointer + len > self.range.limit() {
            return None;
        }
        let address = self.pointer;
        self.pointer += len;
        self.peak = self.peak.max(self.pointer - self.range.start);
        Some(address)
    }
}

/// Compile-time allocator over the segmented virtual address space.
///
/// Freed addresses are reused first-in first-out before the bump pointer
/// grows. Capacity is fixed; running out is an error, never a resize.
#[derive(Debug, Clone)]
pub struct AddressAllocator {
    layout: MemoryLayout,
    resources: Vec<TypeResource>,
}

impl AddressAllocator {
    pub fn new(layout: MemoryLayout) -> Self {
        let resources = layout.ranges().iter().copied().map(TypeResource::new).collect();
        AddressAllocator { layout, resources }
    }

    pub fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    fn resource_index(segment: Segment, ty: ScalarType) -> usize {
        segment.index() * ScalarType::ALL.len() + ty.index()
    }

    fn resource_mut(&mut self, segment: Segment, ty: ScalarType) -> &mut TypeResource {
        &mut self.resources[Self::resource_index(segment, ty)]
    }

    pub fn allocate(&mut self, ty: ScalarType, segment: Segment) -> Result<usize, AllocError> {
        let resource = self.resource_mut(segment, ty);

        if let Some(address) = resource.free.pop_front() {
            resource.freed.remove(&address);
            trace!("reuse {} {} address {}", segment, ty, address);
            return Ok(address);
        }

        resource
            .bump(1)
            .ok_or(AllocError::Exhausted { segment, ty })
    }

    /// Reserve `len` contiguous fresh addresses and return the first one.
    ///
    /// The free list is never consulted since reclaimed addresses are not
    /// guaranteed to be adjacent.
    pub fn allocate_block(
        &mut self,
        ty: ScalarType,
        segment: Segment,
        len: usize,
    ) -> Result<usize, AllocError> {
        self.resource_mut(segment, ty)
            .bump(len.max(1))
            .ok_or(AllocError::Exhausted { segment, ty })
    }

    /// Return `address` to its owning range.
    ///
    /// Once every handed-out address of the range is free again, the range
    /// is reset so the next allocation starts from its lowest address.
    pub fn release(&mut self, address: usize) -> Result<(), AllocError> {
        let resource = self
            .resources
            .iter_mut()
            .find(|r| r.range.contains(address))
            .ok_or(AllocError::OutOfRange { address })?;

        if address >= resource.pointer || resource.freed.contains(&address) {
            return Err(AllocError::NotAllocated { address });
        }

        resource.free.push_back(address);
        resource.freed.insert(address);

        if resource.free.len() == resource.pointer - resource.range.start {
            resource.reset();
        }
        Ok(())
    }

    /// Free every address of `segment` at once and forget its peak usage.
    pub fn release_all_in_segment(&mut self, segment: Segment) {
        for ty in ScalarType::ALL {
            let resource = self.resource_mut(segment, ty);
            resource.reset();
            resource.peak = 0;
        }
    }

    pub fn segment_of(&self, address: usize) -> Option<Segment> {
        self.layout.locate(address).map(|r| r.segment)
    }

    pub fn type_of(&self, address: usize) -> Option<ScalarType> {
        self.layout.locate(address).map(|r| r.ty)
    }

    pub fn is_segment(&self, address: usize, segment: Segment) -> bool {
        self.segment_of(address) == Some(segment)
    }

    /// Most slots of `ty` simultaneously in use in `segment` since its last
    /// bulk release.
    pub fn peak(&self, segment: Segment, ty: ScalarType) -> usize {
        self.resources[Self::resource_index(segment, ty)].peak
    }
}
