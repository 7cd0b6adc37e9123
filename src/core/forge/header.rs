/*!

Every block handed out by the forge is preceded by a hidden `BlockHeader` recording the caller's requested size and
the block's category, so that `Forge::free` needs nothing but the pointer.

```text
 service block                     returned to caller
 │                                 │
 ▼                                 ▼
 ┌─────────────────────────────────┬──────────────────────────────┐
 │ BlockHeader { size, category }  │ size bytes                   │
 └─────────────────────────────────┴──────────────────────────────┘
   HEADER_SIZE (multiple of BLOCK_ALIGN)
```

*/

use std::ptr::NonNull;

use crate::core::{
  forge::category::AllocationCategory,
  Void
};

/// Alignment the allocation service guarantees for its blocks, and so the alignment of memory returned by the forge.
pub const BLOCK_ALIGN: usize = 16;

/// Bytes the forge requests from the allocation service on top of each caller request.
pub const HEADER_SIZE: usize = size_of::<BlockHeader>();

#[repr(C, align(16))]
#[derive(Copy, Clone, Debug)]
pub(crate) struct BlockHeader {
  pub(crate) size    : usize,
  pub(crate) category: AllocationCategory,
}

// The header must not disturb the alignment of the memory that follows it.
const _: () = assert!(HEADER_SIZE % BLOCK_ALIGN == 0);
const _: () = assert!(align_of::<BlockHeader>() <= BLOCK_ALIGN);

impl BlockHeader {
  /// Writes a header at the start of `block` and returns the caller-visible memory after it.
  ///
  /// # Safety
  /// `block` must be valid for writes of `HEADER_SIZE + size` bytes and aligned to `BLOCK_ALIGN`.
  #[inline(always)]
  pub(crate) unsafe fn write(block: NonNull<Void>, size: usize, category: AllocationCategory) -> NonNull<Void> {
    block.cast::<BlockHeader>().as_ptr().write(BlockHeader { size, category });
    NonNull::new_unchecked(block.as_ptr().add(HEADER_SIZE))
  }

  /// Recovers the header and the start of the service block from memory returned by `BlockHeader::write`.
  ///
  /// # Safety
  /// `memory` must have been returned by `BlockHeader::write` and not yet released.
  #[inline(always)]
  pub(crate) unsafe fn read(memory: NonNull<Void>) -> (BlockHeader, NonNull<Void>) {
    let block  = NonNull::new_unchecked(memory.as_ptr().sub(HEADER_SIZE));
    let header = block.cast::<BlockHeader>().as_ptr().read();

    (header, block)
  }
}
