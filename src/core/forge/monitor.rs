/*!

The lock primitive serializing the forge. Creating it can fail, acquiring it blocks until it is free, releasing it is
dropping the guard, and destroying it is dropping the monitor. The forge never acquires it re-entrantly.

*/

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::core::forge::error::ForgeError;

pub trait Monitor: Send + Sync + Sized {
  type Guard<'a> where Self: 'a;

  fn create(name: &'static str) -> Result<Self, ForgeError>;

  /// Blocks until the monitor is acquired. There is no timeout.
  fn enter(&self) -> Self::Guard<'_>;
}

/// The monitor used unless the owner supplies another.
pub type DefaultMonitor = Mutex<()>;

impl Monitor for Mutex<()> {
  type Guard<'a> = MutexGuard<'a, ()> where Self: 'a;

  fn create(_name: &'static str) -> Result<Self, ForgeError> {
    Ok(Mutex::new(()))
  }

  #[inline(always)]
  fn enter(&self) -> Self::Guard<'_> {
    // The mutex guards no data of its own; the counters it serializes are never left half-updated by a panic.
    self.lock().unwrap_or_else(PoisonError::into_inner)
  }
}
