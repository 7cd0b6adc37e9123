/*!

Categorized memory accounting for a garbage collector's own native allocations.

The collector owns one `Forge`, initializes it with an `AllocationService` at startup, and passes it by reference to
every subsystem that needs native memory. Each allocation names an `AllocationCategory`; the forge keeps live bytes
and a highwater mark per category and reports them without blocking allocators. See the `core::forge` module for the
details.

*/

pub mod abstractions;
pub mod core;

// We re-export abstractions that are meant to be used publicly.
pub use abstractions::log;

pub use crate::core::{
  forge::{
    AllocationCategory,
    AllocationService,
    CallsiteUsage,
    CategoryStatistics,
    DefaultMonitor,
    Forge,
    ForgeError,
    MemoryStatistics,
    Monitor,
    StatisticsTable,
    SystemAllocationService,
    BLOCK_ALIGN,
    HEADER_SIZE
  },
  Void
};
