/*!

The two pieces of `tracing-subscriber` machinery behind the log macros: a layer that drops events above the global
threshold, and a field formatter that renders the forge's structured fields.

*/

use std::fmt::Debug;

use tracing::{
  field::{Field, Visit},
  Event,
  Subscriber
};
use tracing_subscriber::{
  field::RecordFields,
  fmt::{format::Writer, FormatFields},
  layer::Context,
  registry::LookupSpan,
  Layer
};

use super::get_global_logging_threshold;

/// Only lets through events whose `threshold` field is at most the global logging threshold. Events without a
/// `threshold` field, such as those emitted by an embedding collector, are always let through.
pub(crate) struct ThresholdFilterLayer;

impl<S> Layer<S> for ThresholdFilterLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
  fn event_enabled(&self, event: &Event<'_>, _ctx: Context<'_, S>) -> bool {
    let mut visitor = ThresholdVisitor { threshold: None };
    event.record(&mut visitor);

    match visitor.threshold {
      Some(threshold) => threshold <= u64::from(get_global_logging_threshold()),
      None            => true
    }
  }
}

struct ThresholdVisitor {
  threshold: Option<u64>,
}

impl Visit for ThresholdVisitor {
  fn record_u64(&mut self, field: &Field, value: u64) {
    if field.name() == "threshold" {
      self.threshold = Some(value);
    }
  }

  fn record_i64(&mut self, field: &Field, value: i64) {
    if field.name() == "threshold" {
      self.threshold = Some(value.max(0) as u64);
    }
  }

  fn record_debug(&mut self, _field: &Field, _value: &dyn Debug) {}
}


/// Writes `[CRITICAL] message key=value ...`, hiding the bookkeeping fields `threshold` and `critical`.
pub(crate) struct ForgeFieldFormatter;

impl<'writer> FormatFields<'writer> for ForgeFieldFormatter {
  fn format_fields<R: RecordFields>(&self, writer: Writer<'writer>, fields: R) -> std::fmt::Result {
    let mut visitor = FieldWriter {
      writer,
      critical: false,
      message : None,
      rest    : String::new(),
    };
    fields.record(&mut visitor);
    visitor.finish()
  }
}

struct FieldWriter<'writer> {
  writer  : Writer<'writer>,
  critical: bool,
  message : Option<String>,
  rest    : String,
}

impl<'writer> FieldWriter<'writer> {
  fn finish(mut self) -> std::fmt::Result {
    if self.critical {
      write!(self.writer, "[CRITICAL] ")?;
    }
    if let Some(message) = &self.message {
      write!(self.writer, "{}", message)?;
    }
    write!(self.writer, "{}", self.rest)
  }
}

impl<'writer> Visit for FieldWriter<'writer> {
  fn record_bool(&mut self, field: &Field, value: bool) {
    match field.name() {
      "critical" => self.critical = value,
      name       => self.rest.push_str(&format!(" {}={}", name, value)),
    }
  }

  fn record_u64(&mut self, field: &Field, value: u64) {
    if field.name() != "threshold" {
      self.rest.push_str(&format!(" {}={}", field.name(), value));
    }
  }

  fn record_i64(&mut self, field: &Field, value: i64) {
    if field.name() != "threshold" {
      self.rest.push_str(&format!(" {}={}", field.name(), value));
    }
  }

  fn record_str(&mut self, field: &Field, value: &str) {
    self.rest.push_str(&format!(" {}={}", field.name(), value));
  }

  fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
    match field.name() {
      "message"   => self.message = Some(format!("{:?}", value)),
      "threshold" => {}
      name        => self.rest.push_str(&format!(" {}={:?}", name, value)),
    }
  }
}


#[cfg(test)]
mod tests {
  use crate::log::{capture_log, critical, info, trace, warning};

  #[test]
  fn events_above_the_global_threshold_are_dropped() {
    let output = capture_log(|| {
      info!(250, "far too verbose");
      info!(0, "always shown");
    });

    assert!(!output.contains("far too verbose"), "{}", output);
    assert!(output.contains("always shown"), "{}", output);
  }

  #[test]
  fn events_without_a_threshold_pass() {
    let output = capture_log(|| {
      tracing::event!(tracing::Level::INFO, "from the embedding collector");
    });

    assert!(output.contains("from the embedding collector"), "{}", output);
  }

  #[test]
  fn critical_events_are_prefixed() {
    let output = capture_log(|| critical!(0, "used after tear down"));
    assert!(output.contains("[CRITICAL] used after tear down"), "{}", output);

    let output = capture_log(|| warning!("allocation service exhausted"));
    assert!(output.contains("allocation service exhausted"), "{}", output);
    assert!(!output.contains("[CRITICAL]"), "{}", output);
  }

  #[test]
  fn bookkeeping_fields_are_hidden() {
    let output = capture_log(|| trace!(0, category = "WorkPackets", bytes = 64usize; "allocate"));

    assert!(output.contains("allocate category=WorkPackets bytes=64"), "{}", output);
    assert!(!output.contains("threshold"), "{}", output);
    assert!(!output.contains("critical"), "{}", output);
  }
}
