//! Storage management shared by the compiler and the virtual machine.
//!
//! - [`layout`] computes the fixed segment × type address ranges.
//! - [`allocator`] hands out and reclaims virtual addresses at compile time.
//! - [`heap`] manages object blocks at run time.

pub mod allocator;
pub mod heap;
pub mod layout;

pub use allocator::{AddressAllocator, AllocError};
pub use heap::{FreeRange, Heap, HeapAllocator, HeapError};
pub use layout::{LayoutConfig, MemoryLayout, TypeRange};
