/*!

Infrastructure that abstracts over the crate backing it. Logging is the only such facility for now: the `log` module
hides the `tracing` machinery behind a small set of threshold-aware macros.

*/

pub mod log;
