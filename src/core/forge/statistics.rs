/*!

Per-category memory counters.

The live counters are atomics so that reporting never has to take the forge's lock. They are only ever *written* while
the lock is held, so writers never race each other and plain load/store pairs suffice; the atomics exist for the
benefit of lock-free readers. Within one category a reader always sees `highwater >= allocated`, because a new
highwater is published before the `allocated` value that produced it. Across categories a reader's view may be torn.

*/

use std::{
  fmt::{Display, Formatter},
  ops::{Deref, Index},
  sync::atomic::{
    AtomicUsize,
    Ordering::{Acquire, Relaxed, Release}
  }
};

use crate::core::forge::category::AllocationCategory;

/// A plain copy of one category's counters.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct MemoryStatistics {
  pub category : AllocationCategory,
  /// Live bytes currently attributed to the category.
  pub allocated: usize,
  /// The largest value `allocated` has reached.
  pub highwater: usize,
}

impl Display for MemoryStatistics {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "{}: {} bytes allocated, highwater {} bytes",
      self.category,
      self.allocated,
      self.highwater
    )
  }
}


/// The live counters of one category, as shared by the forge. Read-only outside the forge.
#[derive(Debug)]
pub struct CategoryStatistics {
  category : AllocationCategory,
  allocated: AtomicUsize,
  highwater: AtomicUsize,
}

impl CategoryStatistics {
  const fn new(category: AllocationCategory) -> Self {
    CategoryStatistics {
      category,
      allocated: AtomicUsize::new(0),
      highwater: AtomicUsize::new(0),
    }
  }

  #[inline(always)]
  pub fn category(&self) -> AllocationCategory {
    self.category
  }

  #[inline(always)]
  pub fn allocated(&self) -> usize {
    self.allocated.load(Acquire)
  }

  #[inline(always)]
  pub fn highwater(&self) -> usize {
    self.highwater.load(Acquire)
  }

  /// Copies the counters. `allocated` is read first, so the copy satisfies `highwater >= allocated`.
  pub fn snapshot(&self) -> MemoryStatistics {
    let allocated = self.allocated();
    let highwater = self.highwater();

    MemoryStatistics {
      category: self.category,
      allocated,
      highwater,
    }
  }

  // The methods below must only be called with the forge's lock held.

  #[inline(always)]
  pub(crate) fn record_allocation(&self, bytes: usize) {
    let allocated = self.allocated.load(Relaxed) + bytes;

    if allocated > self.highwater.load(Relaxed) {
      self.highwater.store(allocated, Release);
    }
    self.allocated.store(allocated, Release);
  }

  #[inline(always)]
  pub(crate) fn record_free(&self, bytes: usize) {
    let allocated = self.allocated.load(Relaxed);
    debug_assert!(bytes <= allocated, "freed {} bytes from {} with only {} allocated", bytes, self.category, allocated);

    self.allocated.store(allocated.saturating_sub(bytes), Release);
  }

  pub(crate) fn reset(&self) {
    self.allocated.store(0, Release);
    self.highwater.store(0, Release);
  }
}


/// One `CategoryStatistics` per category, entry `i` holding category `i`.
///
/// Dereferences to a slice for iteration; index it with an `AllocationCategory`.
#[derive(Debug)]
pub struct StatisticsTable {
  entries: [CategoryStatistics; AllocationCategory::COUNT],
}

impl StatisticsTable {
  pub(crate) fn new() -> Self {
    StatisticsTable {
      entries: AllocationCategory::ALL.map(CategoryStatistics::new),
    }
  }

  pub fn snapshot(&self) -> [MemoryStatistics; AllocationCategory::COUNT] {
    AllocationCategory::ALL.map(|category| self[category].snapshot())
  }

  /// Live bytes across all categories.
  pub fn total_allocated(&self) -> usize {
    self.entries.iter().map(CategoryStatistics::allocated).sum()
  }

  /// The sum of the per-category highwater marks, an upper bound on the forge's peak usage.
  pub fn total_highwater(&self) -> usize {
    self.entries.iter().map(CategoryStatistics::highwater).sum()
  }

  pub(crate) fn reset(&self) {
    for entry in self.entries.iter() {
      entry.reset();
    }
  }
}

impl Index<AllocationCategory> for StatisticsTable {
  type Output = CategoryStatistics;

  #[inline(always)]
  fn index(&self, category: AllocationCategory) -> &Self::Output {
    &self.entries[category.index()]
  }
}

impl Deref for StatisticsTable {
  type Target = [CategoryStatistics];

  fn deref(&self) -> &Self::Target {
    &self.entries
  }
}

impl<'a> IntoIterator for &'a StatisticsTable {
  type Item     = &'a CategoryStatistics;
  type IntoIter = std::slice::Iter<'a, CategoryStatistics>;

  fn into_iter(self) -> Self::IntoIter {
    self.entries.iter()
  }
}
