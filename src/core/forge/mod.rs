/*!

# The Forge

The forge mediates every native allocation the collector makes for its own use: work packets, remembered sets,
finalization and reference bookkeeping, diagnostics, and the managed heap's own structures. It is not an allocator. It
delegates the bytes to an `AllocationService` and keeps, per `AllocationCategory`, the number of live bytes and the
highest that number has ever been.

There is one forge per collector instance. It is an ordinary value owned by the collector and passed by reference to
whatever needs to allocate; there is no global forge.

## Lifecycle

```
use gc_forge::{AllocationCategory, Forge, SystemAllocationService, callsite};

let service = SystemAllocationService::new();
let mut forge: Forge = Forge::new();
forge.initialize(&service).expect("lock creation failed");

let packet = forge.allocate(4096, AllocationCategory::WorkPackets, callsite!());
assert!(packet.is_some());
assert_eq!(forge.current_statistics()[AllocationCategory::WorkPackets].allocated(), 4096);

unsafe { forge.free(packet.unwrap().as_ptr()) };
forge.tear_down();
```

`initialize` must be called exactly once before `allocate` or `free`, and `tear_down` exactly once after the last of
them. Violations of that contract are not defended against beyond what safe Rust demands: an uninitialized or torn
down forge refuses allocations and ignores frees, logging a critical message.

## Allocation

`allocate` takes the forge's lock, asks the service for the requested bytes plus a hidden `BlockHeader`, and under the
lock adds the request to the category's counters. A request the service cannot satisfy yields `None` and leaves the
counters alone; the forge never retries and never panics on exhaustion. The caller decides whether to abort, collect,
or propagate.

`free` reads the size and category back from the block header, so it needs only the pointer. This is the forge's one
deviation from a bare `allocate(size, category)`/`free(pointer)` pair: every block costs `HEADER_SIZE` extra bytes of
service memory, which is not attributed to any category.

`construct`, `construct_array`, `destroy` and `destroy_array` layer typed construction on top, and the
`forge_construct!`/`forge_destroy!` macros fill in the callsite.

## Concurrency

One lock serializes every counter update and every call into the service made through the forge, across all
categories. A slow service therefore stalls unrelated categories while it holds the lock. Reporting through
`current_statistics` never takes the lock; see the `statistics` module for what a concurrent reader can observe.

*/

mod category;
mod construct;
mod error;
mod header;
mod monitor;
mod service;
mod statistics;

#[cfg(test)]
mod tests;

use std::ptr::NonNull;

use crate::{
  core::Void,
  log::{critical, error, info, warning}
};
#[cfg(feature = "gc_debug")]
use crate::log::trace;

pub use category::AllocationCategory;
pub use error::ForgeError;
pub use header::{BLOCK_ALIGN, HEADER_SIZE};
pub use monitor::{DefaultMonitor, Monitor};
pub use service::{AllocationService, CallsiteUsage, SystemAllocationService};
pub use statistics::{CategoryStatistics, MemoryStatistics, StatisticsTable};

use header::BlockHeader;

const MONITOR_NAME: &str = "gc_forge";

/// The service and lock a forge holds between `initialize` and `tear_down`.
struct Bound<'s, M> {
  service: &'s dyn AllocationService,
  monitor: M,
}

pub struct Forge<'s, M: Monitor = DefaultMonitor> {
  show_statistics: bool, // Do we report statistics at tear down
  bound          : Option<Bound<'s, M>>,
  statistics     : StatisticsTable,
}

impl<'s, M: Monitor> Default for Forge<'s, M> {
  fn default() -> Self {
    Forge::new()
  }
}

impl<'s, M: Monitor> Forge<'s, M> {
  /// Creates an inert forge. It must be initialized before use.
  pub fn new() -> Self {
    Forge {
      show_statistics: false,
      bound          : None,
      statistics     : StatisticsTable::new(),
    }
  }

  /// Whether `tear_down` logs a summary of the statistics. Off by default.
  pub fn set_show_statistics(&mut self, show: bool) {
    self.show_statistics = show;
  }

  #[inline(always)]
  pub fn is_initialized(&self) -> bool {
    self.bound.is_some()
  }

  // region Lifecycle

  /// Creates the lock, zeroes the statistics and binds the allocation service. On failure the forge stays inert and
  /// must not be used for allocation.
  pub fn initialize(&mut self, service: &'s dyn AllocationService) -> Result<(), ForgeError> {
    debug_assert!(self.bound.is_none(), "Forge::initialize called on an initialized forge");

    let monitor = match M::create(MONITOR_NAME) {
      Ok(monitor) => monitor,
      Err(e) => {
        error!(0, "forge initialization failed: {}", e);
        return Err(e);
      }
    };

    self.statistics.reset();
    self.bound = Some(Bound { service, monitor });

    info!(1, "forge initialized");
    Ok(())
  }

  /// Destroys the lock and releases the allocation service. No allocation or free may follow.
  pub fn tear_down(&mut self) {
    debug_assert!(self.bound.is_some(), "Forge::tear_down called on a forge that is not initialized");

    if self.show_statistics {
      self.report_statistics();
    }
    self.bound = None;

    info!(1, "forge torn down");
  }

  // endregion Lifecycle

  // region Allocation

  /// Allocates `bytes_requested` bytes attributed to `category`. The memory is aligned to `BLOCK_ALIGN` and
  /// uninitialized. Returns `None` if the allocation service cannot satisfy the request.
  ///
  /// `callsite` identifies the origin of the request for the service's diagnostics; use `callsite!()`.
  pub fn allocate(
    &self,
    bytes_requested: usize,
    category       : AllocationCategory,
    callsite       : &'static str
  ) -> Option<NonNull<Void>> {
    let Some(bound) = &self.bound else {
      critical!(0, category = category.name(), callsite = callsite; "allocate on a forge that is not initialized");
      return None;
    };

    let block = bytes_requested.checked_add(HEADER_SIZE).and_then(|block_size| {
      let _guard = bound.monitor.enter();
      let block  = bound.service.allocate(block_size, callsite);
      if block.is_some() {
        self.statistics[category].record_allocation(bytes_requested);
      }
      block
    });

    let Some(block) = block else {
      warning!(
        2,
        category = category.name(), bytes = bytes_requested, callsite = callsite;
        "allocation request could not be satisfied"
      );
      return None;
    };

    #[cfg(feature = "gc_debug")]
    trace!(5, category = category.name(), bytes = bytes_requested, callsite = callsite; "allocate");

    // The block is ours alone now, so the header is written outside the lock.
    Some(unsafe { BlockHeader::write(block, bytes_requested, category) })
  }

  /// Like `allocate`, but for a category that arrives as a raw index, e.g. across an FFI boundary.
  ///
  /// # Panics
  /// An index that is not below `AllocationCategory::COUNT` is a programmer error and panics.
  pub fn allocate_by_index(
    &self,
    bytes_requested: usize,
    category_index : usize,
    callsite       : &'static str
  ) -> Option<NonNull<Void>> {
    let category = match AllocationCategory::try_from(category_index) {
      Ok(category) => category,
      Err(e) => {
        critical!(0, callsite = callsite; "{}", e);
        panic!("Forge::allocate_by_index: {}", e);
      }
    };

    self.allocate(bytes_requested, category, callsite)
  }

  /// Returns memory to the allocation service and removes it from its category's live bytes. Null is ignored.
  ///
  /// # Safety
  /// `memory` must be null or have been returned by `allocate` on this forge and not freed since.
  pub unsafe fn free(&self, memory: *mut Void) {
    let Some(memory) = NonNull::new(memory) else {
      return;
    };
    let Some(bound) = &self.bound else {
      critical!(0, "free on a forge that is not initialized: {:p}", memory);
      return;
    };

    let (header, block) = BlockHeader::read(memory);

    {
      let _guard = bound.monitor.enter();
      bound.service.free(block, header.size + HEADER_SIZE);
      self.statistics[header.category].record_free(header.size);
    }

    #[cfg(feature = "gc_debug")]
    trace!(5, category = header.category.name(), bytes = header.size; "free");
  }

  // endregion Allocation

  // region Reporting

  /// The per-category counters, indexable by `AllocationCategory`. The lock is not taken: under concurrent
  /// allocation the entries may be mutually inconsistent, though each one satisfies `highwater >= allocated`.
  #[inline(always)]
  pub fn current_statistics(&self) -> &StatisticsTable {
    &self.statistics
  }

  /// Logs one line per category that has ever held memory.
  pub fn report_statistics(&self) {
    for statistics in self.statistics.snapshot() {
      if statistics.highwater > 0 {
        info!(1, "{}", statistics);
      }
    }
    info!(
      1,
      "total: {} bytes allocated, sum of highwater marks {} bytes",
      self.statistics.total_allocated(),
      self.statistics.total_highwater()
    );
  }

  /// Prints the statistics table.
  #[cfg(feature = "gc_debug")]
  pub fn dump_statistics(&self) {
    eprintln!("╭─────────────────────────────────────────────╮");
    eprintln!("│{:<18} {:>12} {:>13}│", "Category", "Allocated", "Highwater");
    eprintln!("├─────────────────────────────────────────────┤");
    for statistics in self.statistics.snapshot() {
      eprintln!(
        "│{:<18} {:>12} {:>13}│",
        statistics.category.name(),
        statistics.allocated,
        statistics.highwater
      );
    }
    eprintln!("├─────────────────────────────────────────────┤");
    eprintln!(
      "│{:<18} {:>12} {:>13}│",
      "Total",
      self.statistics.total_allocated(),
      self.statistics.total_highwater()
    );
    eprintln!("╰─────────────────────────────────────────────╯");
  }

  // endregion Reporting
}

impl<'s, M: Monitor> Drop for Forge<'s, M> {
  fn drop(&mut self) {
    if self.bound.is_some() {
      warning!(1, "forge dropped without tear_down");
    }
  }
}
