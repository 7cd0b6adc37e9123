/*!

The closed set of purposes the collector allocates native memory for. Every byte that passes through the forge is
attributed to exactly one category.

*/

use std::fmt::{Display, Formatter};

use crate::core::forge::error::ForgeError;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum AllocationCategory {
  /// A fixed cost of running the collector, e.g. its configuration and extension structures.
  Fixed = 0,
  WorkPackets,
  /// Tracking of soft, weak and phantom references.
  References,
  /// Tracking and finalizing objects.
  Finalize,
  /// Tracking collector behaviour: heap checks, verbose output.
  Diagnostic,
  RememberedSet,
  /// Bookkeeping for the managed heap itself.
  ManagedHeap,
  /// Anything that does not fall into the categories above.
  Other,
}

impl AllocationCategory {
  /// Number of categories, for sizing per-category arrays. Not itself a category.
  pub const COUNT: usize = 8;

  /// Every category, in index order.
  pub const ALL: [AllocationCategory; AllocationCategory::COUNT] = [
    AllocationCategory::Fixed,
    AllocationCategory::WorkPackets,
    AllocationCategory::References,
    AllocationCategory::Finalize,
    AllocationCategory::Diagnostic,
    AllocationCategory::RememberedSet,
    AllocationCategory::ManagedHeap,
    AllocationCategory::Other,
  ];

  #[inline(always)]
  pub const fn index(self) -> usize {
    self as usize
  }

  pub const fn name(self) -> &'static str {
    match self {
      AllocationCategory::Fixed         => "Fixed",
      AllocationCategory::WorkPackets   => "WorkPackets",
      AllocationCategory::References    => "References",
      AllocationCategory::Finalize      => "Finalize",
      AllocationCategory::Diagnostic    => "Diagnostic",
      AllocationCategory::RememberedSet => "RememberedSet",
      AllocationCategory::ManagedHeap   => "ManagedHeap",
      AllocationCategory::Other         => "Other",
    }
  }
}

impl TryFrom<usize> for AllocationCategory {
  type Error = ForgeError;

  fn try_from(index: usize) -> Result<Self, Self::Error> {
    AllocationCategory::ALL
        .get(index)
        .copied()
        .ok_or(ForgeError::InvalidCategory(index))
  }
}

impl Display for AllocationCategory {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.name())
  }
}
