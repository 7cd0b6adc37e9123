/*!

The collector-facing machinery. So far this is the forge, through which the collector's subsystems obtain native memory
and which accounts for that memory by category.

*/

pub mod forge;

/// A `*mut Void` is a pointer to a `u8`
pub type Void = u8;
