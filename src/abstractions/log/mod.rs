/*!

# Overview

The `log` module provides the logging used by the forge and its allocation services. Every message has a level, which
describes what _kind_ of message it is, and a numeric threshold, which describes how _verbose_ the message is. Messages
are emitted through the `tracing` ecosystem; the subscriber is installed lazily the first time any of the macros runs.

```
use gc_forge::log::*;

// Only messages logged at threshold 1 or lower are emitted from here on.
set_global_logging_threshold(1);

critical!(3, "Forge used after tear down"); // Not emitted
warning!(2, "Allocation service exhausted"); // Not emitted
info!(1, "Forge initialized");              // Emitted
trace!(0, "allocate 64 bytes");             // Emitted
```

## Threshold

The global logging threshold is shared by all levels. A message logged at threshold `t` is emitted when
`t <= get_global_logging_threshold()`, so a message with threshold 0 is always emitted. The forge uses these
thresholds:

| Threshold | Used for                                                    |
|:----------|:------------------------------------------------------------|
| 0         | contract violations (use after tear down, bad categories)   |
| 1         | lifecycle: initialize, tear down, statistics summary        |
| 2         | allocation failures reported by the allocation service      |
| 5         | per-operation tracing (`gc_debug` only)                     |

```
use gc_forge::log::{set_global_logging_threshold, get_global_logging_threshold};

set_global_logging_threshold(5);
assert_eq!(get_global_logging_threshold(), 5);
```

A message without a threshold is logged at threshold 0, but only a bare string literal can omit it. A format string
with arguments always needs an explicit threshold, since the first argument is taken as the threshold:

```compile_fail
use gc_forge::log::warning;

warning!("{} bytes refused", 64);
```

## Levels

Critical, Error, Warning, Info, Debug, Trace. A critical message is an `ERROR` event carrying `critical = true`, which
the formatter renders as a `[CRITICAL]` prefix.

## Structured fields

Besides the message, the forge attaches `category`, `bytes` and `callsite` fields to allocation events. The formatter
prints them as `key=value` after the message and never prints the `threshold` field.

*/
mod layer;
mod macros;

use std::sync::atomic::{AtomicU8, Ordering};

use once_cell::sync::Lazy;
use tracing_subscriber::{
  fmt,
  layer::SubscriberExt,
  Registry
};

use layer::{ForgeFieldFormatter, ThresholdFilterLayer};
pub use macros::*;

// The macros expand to `$crate::log::tracing::event!` so downstream crates need no direct dependency.
#[doc(hidden)]
pub use tracing;

/// Default verbosity: lifecycle and failure messages, no per-operation tracing.
pub const DEFAULT_LOGGING_THRESHOLD: u8 = 2;

static GLOBAL_LOGGING_THRESHOLD: AtomicU8 = AtomicU8::new(DEFAULT_LOGGING_THRESHOLD);

static INIT_LOGGER: Lazy<()> = Lazy::new(|| {
  let subscriber = Registry::default()
      .with(ThresholdFilterLayer)
      .with(
        fmt::layer()
            .fmt_fields(ForgeFieldFormatter)
            .with_target(false)
            .with_thread_names(true)
            .without_time()
            .with_writer(std::io::stderr),
      );

  // Another subscriber may already be installed by the embedding collector; theirs wins.
  let _ = tracing::subscriber::set_global_default(subscriber);
});

/// Installs the subscriber. The logging macros call this, so it never needs to be called directly.
pub fn init_logger() {
  Lazy::force(&INIT_LOGGER);
}

/// Sets the global verbosity. Messages logged at a greater threshold are dropped.
pub fn set_global_logging_threshold(new_threshold: u8) {
  GLOBAL_LOGGING_THRESHOLD.store(new_threshold, Ordering::Relaxed);
}

pub fn get_global_logging_threshold() -> u8 {
  GLOBAL_LOGGING_THRESHOLD.load(Ordering::Relaxed)
}


/// Runs `emit` with a thread-local subscriber built like the global one and returns what it wrote.
#[cfg(test)]
pub(crate) fn capture_log(emit: impl FnOnce()) -> String {
  use std::{
    io,
    sync::{Arc, Mutex}
  };

  #[derive(Clone, Default)]
  struct Captured(Arc<Mutex<Vec<u8>>>);

  impl io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
      self.0.lock().unwrap().extend_from_slice(buf);
      Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
      Ok(())
    }
  }

  let captured = Captured::default();
  let writer   = captured.clone();
  let subscriber = Registry::default()
      .with(ThresholdFilterLayer)
      .with(
        fmt::layer()
            .fmt_fields(ForgeFieldFormatter)
            .with_target(false)
            .with_level(false)
            .with_ansi(false)
            .without_time()
            .with_writer(move || writer.clone()),
      );

  tracing::subscriber::with_default(subscriber, emit);

  let bytes = captured.0.lock().unwrap().clone();
  String::from_utf8(bytes).unwrap()
}
