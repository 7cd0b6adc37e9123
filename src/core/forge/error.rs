/*!

Recoverable failures at the forge's boundaries. Allocation failure is not among them: it is reported as `None` on the
allocation path so that callers decide how to react.

*/

use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

pub enum ForgeError {
  /// The lock primitive could not be created during `Forge::initialize`.
  LockCreation {
    name  : &'static str,
    reason: String
  },
  /// A raw category index was not below `AllocationCategory::COUNT`.
  InvalidCategory(usize),
}

impl Display for ForgeError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {

      ForgeError::LockCreation { name, reason } => {
        write!(f, "the forge could not create its lock \"{}\": {}", name, reason)
      }

      ForgeError::InvalidCategory(index) => {
        write!(f, "{} is not a valid allocation category index", index)
      }

    } // end match on `ForgeError`
  }
}

impl Debug for ForgeError {
  fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
    Display::fmt(self, f)
  }
}

impl Error for ForgeError {}
