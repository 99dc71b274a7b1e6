use crate::bytecode::SlotCounts;
use crate::lang::{ScalarType, Segment, Value};
use crate::memory::TypeRange;

/// Storage for one activation: a dense vector per scalar type.
///
/// Local slots come first, temporaries follow, so a `Temporary` address
/// maps to `local_count + offset`.
#[derive(Debug, Clone)]
pub struct ContextMemory {
    function: String,
    local_counts: [usize; 5],
    slots: [Vec<Option<Value>>; 5],
}

impl ContextMemory {
    pub fn new(function: &str, counts: &SlotCounts) -> Self {
        let slots = ScalarType::ALL.map(|ty| vec![None; counts.total(ty)]);
        ContextMemory {
            function: function.to_string(),
            local_counts: counts.local,
            slots,
        }
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    fn index(&self, range: &TypeRange, address: usize) -> Option<usize> {
        let offset = range.offset(address);
        let index = match range.segment {
            Segment::Global | Segment::Local => {
                if offset >= self.local_counts[range.ty.index()] {
                    return None;
                }
                offset
            }
            Segment::Temporary => self.local_counts[range.ty.index()] + offset,
            Segment::Constant => return None,
        };
        (index < self.slots[range.ty.index()].len()).then_some(index)
    }

    /// `None` when the address has no slot in this context.
    pub fn get(&self, range: &TypeRange, address: usize) -> Option<&Option<Value>> {
        let index = self.index(range, address)?;
        self.slots[range.ty.index()].get(index)
    }

    /// Returns false when the address has no slot in this context.
    pub fn set(&mut self, range: &TypeRange, address: usize, value: Option<Value>) -> bool {
        match self.index(range, address) {
            Some(index) => {
                self.slots[range.ty.index()][index] = value;
                true
            }
            None => false,
        }
    }
}
