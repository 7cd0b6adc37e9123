/*!

# Allocation Services

The forge does not allocate memory itself. It delegates to an `AllocationService`, a byte-level allocate/free capability
owned by whoever owns the forge. Every request is tagged with a callsite string (see `callsite!`) which the service may
use for leak and usage attribution; the forge never interprets it.

`SystemAllocationService` is the service used when the collector has nothing more specific: it allocates from the
system allocator, optionally within a byte budget, and keeps per-callsite live-byte attribution so that leaks can be
traced back to the code that made them.

*/

use std::{
  alloc::{GlobalAlloc, Layout, System},
  collections::HashMap,
  ptr::NonNull,
  sync::{Mutex, MutexGuard, PoisonError}
};

use crate::{
  core::{
    forge::header::BLOCK_ALIGN,
    Void
  },
  log::{info, warning}
};

/// A byte-level allocator the forge delegates to.
pub trait AllocationService: Send + Sync {
  /// Allocates `bytes` bytes aligned to at least `BLOCK_ALIGN`. Returns `None` when the request cannot be satisfied;
  /// implementations must not panic on exhaustion.
  fn allocate(&self, bytes: usize, callsite: &'static str) -> Option<NonNull<Void>>;

  /// Releases a block.
  ///
  /// # Safety
  /// `memory` must have been returned by `allocate` on this service with the same `bytes`, and not yet freed.
  unsafe fn free(&self, memory: NonNull<Void>, bytes: usize);
}

/// Live usage attributed to one callsite.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CallsiteUsage {
  pub live_bytes       : usize,
  pub live_blocks      : usize,
  /// Every successful allocation from the callsite, freed or not.
  pub total_allocations: usize,
}

#[derive(Copy, Clone)]
struct LiveBlock {
  bytes   : usize,
  callsite: &'static str,
}

#[derive(Default)]
struct ServiceUsage {
  live_bytes : usize,
  peak_bytes : usize,
  failures   : usize,
  live_blocks: HashMap<usize, LiveBlock>,
  callsites  : HashMap<&'static str, CallsiteUsage>,
}

pub struct SystemAllocationService {
  limit: Option<usize>,
  usage: Mutex<ServiceUsage>,
}

impl Default for SystemAllocationService {
  fn default() -> Self {
    SystemAllocationService::new()
  }
}

impl SystemAllocationService {
  /// A service limited only by the system allocator.
  pub fn new() -> Self {
    SystemAllocationService {
      limit: None,
      usage: Mutex::new(ServiceUsage::default()),
    }
  }

  /// A service that reports exhaustion once `limit` bytes are live.
  pub fn with_limit(limit: usize) -> Self {
    SystemAllocationService {
      limit: Some(limit),
      usage: Mutex::new(ServiceUsage::default()),
    }
  }

  pub fn limit(&self) -> Option<usize> {
    self.limit
  }

  pub fn live_bytes(&self) -> usize {
    self.usage().live_bytes
  }

  pub fn peak_bytes(&self) -> usize {
    self.usage().peak_bytes
  }

  pub fn live_blocks(&self) -> usize {
    self.usage().live_blocks.len()
  }

  /// Number of requests refused, by the limit or by the system allocator.
  pub fn failures(&self) -> usize {
    self.usage().failures
  }

  pub fn callsite_usage(&self, callsite: &str) -> CallsiteUsage {
    self.usage().callsites.get(callsite).copied().unwrap_or_default()
  }

  /// Callsites with live memory, largest first.
  pub fn callsite_report(&self) -> Vec<(&'static str, CallsiteUsage)> {
    let mut report: Vec<(&'static str, CallsiteUsage)> =
        self.usage()
            .callsites
            .iter()
            .filter(|(_, usage)| usage.live_blocks > 0)
            .map(|(callsite, usage)| (*callsite, *usage))
            .collect();

    report.sort_by(|a, b| b.1.live_bytes.cmp(&a.1.live_bytes).then(a.0.cmp(b.0)));
    report
  }

  fn usage(&self) -> MutexGuard<'_, ServiceUsage> {
    // The bookkeeping is updated in single statements after the system call, so a panic elsewhere cannot leave it
    // inconsistent.
    self.usage.lock().unwrap_or_else(PoisonError::into_inner)
  }

  #[inline(always)]
  fn layout(bytes: usize) -> Option<Layout> {
    Layout::from_size_align(bytes.max(1), BLOCK_ALIGN).ok()
  }
}

impl AllocationService for SystemAllocationService {
  fn allocate(&self, bytes: usize, callsite: &'static str) -> Option<NonNull<Void>> {
    let mut usage = self.usage();

    if let Some(limit) = self.limit {
      if usage.live_bytes.saturating_add(bytes) > limit {
        usage.failures += 1;
        return None;
      }
    }

    let Some(layout) = Self::layout(bytes) else {
      usage.failures += 1;
      return None;
    };
    let Some(memory) = NonNull::new(unsafe { System.alloc(layout) }) else {
      usage.failures += 1;
      return None;
    };

    usage.live_bytes += bytes;
    usage.peak_bytes  = usage.peak_bytes.max(usage.live_bytes);
    usage.live_blocks.insert(memory.as_ptr() as usize, LiveBlock { bytes, callsite });

    let site = usage.callsites.entry(callsite).or_default();
    site.live_bytes        += bytes;
    site.live_blocks       += 1;
    site.total_allocations += 1;

    Some(memory)
  }

  unsafe fn free(&self, memory: NonNull<Void>, bytes: usize) {
    let mut usage = self.usage();

    let Some(block) = usage.live_blocks.remove(&(memory.as_ptr() as usize)) else {
      debug_assert!(false, "SystemAllocationService::free of a block it does not own: {:p}", memory);
      return;
    };
    debug_assert_eq!(block.bytes, bytes, "block freed with a different size than it was allocated with");

    usage.live_bytes -= block.bytes;
    if let Some(site) = usage.callsites.get_mut(block.callsite) {
      site.live_bytes  -= block.bytes;
      site.live_blocks -= 1;
    }

    if let Some(layout) = Self::layout(block.bytes) {
      System.dealloc(memory.as_ptr(), layout);
    }
  }
}

impl Drop for SystemAllocationService {
  fn drop(&mut self) {
    let leaks = self.callsite_report();
    if leaks.is_empty() {
      return;
    }

    warning!(
      1,
      "allocation service dropped with {} bytes live in {} blocks",
      self.live_bytes(),
      self.live_blocks()
    );
    for (callsite, usage) in leaks {
      info!(
        1,
        callsite = callsite, bytes = usage.live_bytes, blocks = usage.live_blocks;
        "leaked"
      );
    }
  }
}
