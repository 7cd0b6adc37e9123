/*!

# Typed Construction Through the Forge

`Forge::construct` moves a value into forge memory and returns a raw pointer to it; `Forge::destroy` drops the value in
place and frees the memory. The array forms do the same for a contiguous run of values. Like `allocate`, construction
never panics on exhaustion: it returns `None`, and the value that was to be moved in is dropped.

```
use gc_forge::{AllocationCategory, Forge, SystemAllocationService, forge_construct, forge_destroy};

struct WorkPacket { slots: [usize; 32], next: Option<std::ptr::NonNull<WorkPacket>> }

let service = SystemAllocationService::new();
let mut forge: Forge = Forge::new();
forge.initialize(&service).unwrap();

if let Some(packet) = forge_construct!(forge, AllocationCategory::WorkPackets, WorkPacket { slots: [0; 32], next: None }) {
  unsafe { forge_destroy!(forge, packet.as_ptr()) };
}
forge.tear_down();
```

The returned pointers carry no lifetime. It is the caller's job to destroy each value exactly once, through the forge
that constructed it, before that forge is torn down.

*/

use std::ptr::{drop_in_place, NonNull};

use crate::{
  core::forge::{
    category::AllocationCategory,
    header::BLOCK_ALIGN,
    monitor::Monitor,
    Forge
  },
  log::warning
};

/// The origin of an allocation request as `"file:line"`, for attributing usage and leaks to the code that made them.
#[macro_export]
macro_rules! callsite {
    () => {
        concat!(file!(), ":", line!())
    };
}

/// Moves a value into memory allocated from a forge, attributing it to the given category and to the current source
/// location. Evaluates to `Option<NonNull<T>>`.
#[macro_export]
macro_rules! forge_construct {
    ($forge:expr, $category:expr, $value:expr) => {
        ($forge).construct($category, $crate::callsite!(), $value)
    };
}

/// Drops a value created by `forge_construct!` and returns its memory to the forge. Must be used inside `unsafe`: the
/// pointer must come from `forge_construct!` on the same forge and must not be used afterward.
#[macro_export]
macro_rules! forge_destroy {
    ($forge:expr, $ptr:expr) => {
        ($forge).destroy($ptr)
    };
}


impl<'s, M: Monitor> Forge<'s, M> {
  /// Allocates memory for a `T` attributed to `category` and moves `value` into it.
  ///
  /// Returns `None`, dropping `value`, if the allocation fails or if `T` needs an alignment greater than
  /// `BLOCK_ALIGN`.
  pub fn construct<T>(&self, category: AllocationCategory, callsite: &'static str, value: T) -> Option<NonNull<T>> {
    if !Self::alignment_supported::<T>(callsite) {
      return None;
    }

    let memory = self.allocate(size_of::<T>(), category, callsite)?.cast::<T>();
    unsafe { memory.as_ptr().write(value) };

    Some(memory)
  }

  /// Allocates memory for `len` values of `T` and initializes element `i` with `init(i)`.
  ///
  /// Returns `None` under the same conditions as `construct`, or if the array's size overflows. If `init` panics,
  /// the elements already built are dropped and the memory is freed before the panic continues.
  pub fn construct_array<T, F>(
    &self,
    category: AllocationCategory,
    callsite: &'static str,
    len     : usize,
    mut init: F
  ) -> Option<NonNull<[T]>>
  where
      F: FnMut(usize) -> T
  {
    if !Self::alignment_supported::<T>(callsite) {
      return None;
    }

    let bytes  = size_of::<T>().checked_mul(len)?;
    let memory = self.allocate(bytes, category, callsite)?.cast::<T>();

    let mut partial = PartialArray { forge: self, memory, initialized: 0 };
    while partial.initialized < len {
      let value = init(partial.initialized);
      unsafe { memory.as_ptr().add(partial.initialized).write(value) };
      partial.initialized += 1;
    }
    std::mem::forget(partial);

    Some(NonNull::slice_from_raw_parts(memory, len))
  }

  /// Drops the value and frees its memory. Null is ignored.
  ///
  /// # Safety
  /// `value` must be null or have been returned by `construct` on this forge, and not destroyed since.
  pub unsafe fn destroy<T>(&self, value: *mut T) {
    if value.is_null() {
      return;
    }

    drop_in_place(value);
    self.free(value.cast());
  }

  /// Drops every element and frees the array's memory. Null is ignored.
  ///
  /// # Safety
  /// `values` must be null or have been returned by `construct_array` on this forge, and not destroyed since.
  pub unsafe fn destroy_array<T>(&self, values: *mut [T]) {
    if values.is_null() {
      return;
    }

    drop_in_place(values);
    self.free(values.cast());
  }

  fn alignment_supported<T>(callsite: &'static str) -> bool {
    if align_of::<T>() <= BLOCK_ALIGN {
      return true;
    }

    warning!(
      0,
      callsite = callsite;
      "cannot construct a type aligned to {} bytes; the forge guarantees {}",
      align_of::<T>(),
      BLOCK_ALIGN
    );
    false
  }
}

/// Owns a partly initialized array while `construct_array` runs the caller's initializer.
struct PartialArray<'f, 's, M: Monitor, T> {
  forge      : &'f Forge<'s, M>,
  memory     : NonNull<T>,
  initialized: usize,
}

impl<'f, 's, M: Monitor, T> Drop for PartialArray<'f, 's, M, T> {
  fn drop(&mut self) {
    unsafe {
      drop_in_place(NonNull::slice_from_raw_parts(self.memory, self.initialized).as_ptr());
      self.forge.free(self.memory.as_ptr().cast());
    }
  }
}
